use crate::map_db_err;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roost_core::ids::UserId;
use roost_core::model::{Role, User, UserStatus};
use roost_core::repository::{CascadeOutcome, CascadeReasons, UserStore};
use roost_core::{Error, Result};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    name: String,
    role: String,
    status: String,
    status_reason: Option<String>,
    status_updated_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: UserId(row.id),
            email: row.email,
            name: row.name,
            role: Role::parse(&row.role)?,
            status: UserStatus::parse(&row.status)?,
            status_reason: row.status_reason,
            status_updated_at: row.status_updated_at,
            created_at: row.created_at,
        })
    }
}

const SELECT_COLS: &str =
    "id, email, name, role, status, status_reason, status_updated_at, created_at";

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_user(&self, id: UserId, include_inactive: bool) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM users WHERE id = $1 AND (status = 'active' OR $2)"
        ))
        .bind(id.0)
        .bind(include_inactive)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        row.map(User::try_from).transpose()
    }

    async fn set_user_status(&self, id: UserId, status: UserStatus, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users \
             SET status = $2, status_reason = $3, status_updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id.0)
        .bind(status.as_str())
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn deactivate_user_cascade(
        &self,
        id: UserId,
        status: UserStatus,
        reasons: &CascadeReasons,
    ) -> Result<CascadeOutcome> {
        // One transaction around the triggering status write and both
        // dependent sweeps. A failure anywhere rolls everything back, so a
        // partial cascade is never observable.
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        let updated = sqlx::query(
            "UPDATE users \
             SET status = $2, status_reason = $3, status_updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id.0)
        .bind(status.as_str())
        .bind(&reasons.user_reason)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;
        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("user {id}")));
        }

        let places = sqlx::query(
            "UPDATE places \
             SET status = 'inactive', status_reason = $2, status_updated_at = NOW() \
             WHERE owner_id = $1 AND status <> 'inactive'",
        )
        .bind(id.0)
        .bind(&reasons.place_reason)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        let reservations = sqlx::query(
            "UPDATE reservations \
             SET status = 'cancelled', cancellation_reason = $2, cancelled_by = 'system', \
                 updated_at = NOW() \
             WHERE user_id = $1 AND status = 'pending'",
        )
        .bind(id.0)
        .bind(&reasons.reservation_reason)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        tx.commit().await.map_err(map_db_err)?;

        Ok(CascadeOutcome {
            places_deactivated: places.rows_affected(),
            reservations_cancelled: reservations.rows_affected(),
        })
    }
}
