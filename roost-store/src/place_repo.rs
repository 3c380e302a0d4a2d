use crate::map_db_err;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roost_core::ids::{PlaceId, UserId};
use roost_core::model::{Place, PlaceStatus};
use roost_core::repository::PlaceStore;
use roost_core::{Error, Result};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgPlaceStore {
    pool: PgPool,
}

impl PgPlaceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PlaceRow {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    description: Option<String>,
    image_url: Option<String>,
    price: i64,
    guest_capacity: i32,
    status: String,
    status_reason: Option<String>,
    status_updated_at: DateTime<Utc>,
    reservation_count: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<PlaceRow> for Place {
    type Error = Error;

    fn try_from(row: PlaceRow) -> Result<Self> {
        Ok(Place {
            id: PlaceId(row.id),
            owner_id: UserId(row.owner_id),
            title: row.title,
            description: row.description,
            image_url: row.image_url,
            price: row.price,
            guest_capacity: row.guest_capacity,
            status: PlaceStatus::parse(&row.status)?,
            status_reason: row.status_reason,
            status_updated_at: row.status_updated_at,
            reservation_count: row.reservation_count,
            created_at: row.created_at,
        })
    }
}

const SELECT_COLS: &str = "id, owner_id, title, description, image_url, price, guest_capacity, \
     status, status_reason, status_updated_at, reservation_count, created_at";

#[async_trait]
impl PlaceStore for PgPlaceStore {
    async fn get_place(&self, id: PlaceId, include_inactive: bool) -> Result<Option<Place>> {
        // The visibility filter is an explicit SQL predicate per call, not a
        // global query rewrite.
        let row: Option<PlaceRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM places WHERE id = $1 AND (status = 'active' OR $2)"
        ))
        .bind(id.0)
        .bind(include_inactive)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        row.map(Place::try_from).transpose()
    }

    async fn list_places_by_owner(
        &self,
        owner: UserId,
        include_inactive: bool,
    ) -> Result<Vec<Place>> {
        let rows: Vec<PlaceRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM places \
             WHERE owner_id = $1 AND (status = 'active' OR $2) \
             ORDER BY created_at DESC"
        ))
        .bind(owner.0)
        .bind(include_inactive)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        rows.into_iter().map(Place::try_from).collect()
    }

    async fn set_place_status(
        &self,
        id: PlaceId,
        status: PlaceStatus,
        reason: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE places \
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
}
