use crate::map_db_err;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use roost_core::ids::{PlaceId, ReservationId, UserId};
use roost_core::model::{CancelActor, DateRange, Reservation, ReservationStatus};
use roost_core::repository::ReservationStore;
use roost_core::{Error, Result};
use sqlx::PgPool;
use uuid::Uuid;

pub struct PgReservationStore {
    pool: PgPool,
}

impl PgReservationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    user_id: Uuid,
    place_id: Uuid,
    start_date: NaiveDate,
    end_date: NaiveDate,
    total_price: i64,
    status: String,
    checkout_session_id: Option<String>,
    payment_intent_id: Option<String>,
    invoice_url: Option<String>,
    cancellation_reason: Option<String>,
    cancelled_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_actor(s: &str) -> Result<CancelActor> {
    match s {
        "guest" => Ok(CancelActor::Guest),
        "admin" => Ok(CancelActor::Admin),
        "system" => Ok(CancelActor::System),
        other => Err(Error::Store(format!("unknown cancel actor: {other}"))),
    }
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = Error;

    fn try_from(row: ReservationRow) -> Result<Self> {
        Ok(Reservation {
            id: ReservationId(row.id),
            user_id: UserId(row.user_id),
            place_id: PlaceId(row.place_id),
            range: DateRange::new(row.start_date, row.end_date)?,
            total_price: row.total_price,
            status: ReservationStatus::parse(&row.status)?,
            checkout_session_id: row.checkout_session_id,
            payment_intent_id: row.payment_intent_id,
            invoice_url: row.invoice_url,
            cancellation_reason: row.cancellation_reason,
            cancelled_by: row.cancelled_by.as_deref().map(parse_actor).transpose()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_COLS: &str = "id, user_id, place_id, start_date, end_date, total_price, status, \
     checkout_session_id, payment_intent_id, invoice_url, cancellation_reason, cancelled_by, \
     created_at, updated_at";

#[async_trait]
impl ReservationStore for PgReservationStore {
    async fn insert_pending(&self, reservation: &Reservation) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        // Early conflict check for a clean error message. The exclusion
        // constraint on the table is the actual backstop for writers that
        // race past this point; its violation also maps to Conflict.
        let conflict: (bool,) = sqlx::query_as(
            "SELECT EXISTS( \
                SELECT 1 FROM reservations \
                WHERE place_id = $1 AND status IN ('pending', 'paid') \
                  AND start_date <= $3 AND end_date >= $2)",
        )
        .bind(reservation.place_id.0)
        .bind(reservation.range.start())
        .bind(reservation.range.end())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_err)?;
        if conflict.0 {
            return Err(Error::Conflict(
                "an overlapping reservation already exists".to_string(),
            ));
        }

        sqlx::query(
            "INSERT INTO reservations \
                (id, user_id, place_id, start_date, end_date, total_price, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(reservation.id.0)
        .bind(reservation.user_id.0)
        .bind(reservation.place_id.0)
        .bind(reservation.range.start())
        .bind(reservation.range.end())
        .bind(reservation.total_price)
        .bind(reservation.status.as_str())
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        sqlx::query(
            "UPDATE places SET reservation_count = reservation_count + 1 WHERE id = $1",
        )
        .bind(reservation.place_id.0)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        tx.commit().await.map_err(map_db_err)
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM reservations WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        row.map(Reservation::try_from).transpose()
    }

    async fn get_by_session(&self, session_id: &str) -> Result<Option<Reservation>> {
        let row: Option<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM reservations WHERE checkout_session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;
        row.map(Reservation::try_from).transpose()
    }

    async fn blocking_for_place(&self, place_id: PlaceId) -> Result<Vec<Reservation>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM reservations \
             WHERE place_id = $1 AND status IN ('pending', 'paid')"
        ))
        .bind(place_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        rows.into_iter().map(Reservation::try_from).collect()
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Reservation>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM reservations \
             WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        rows.into_iter().map(Reservation::try_from).collect()
    }

    async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Reservation>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLS} FROM reservations \
             WHERE place_id IN (SELECT id FROM places WHERE owner_id = $1) \
             ORDER BY created_at DESC"
        ))
        .bind(owner.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        rows.into_iter().map(Reservation::try_from).collect()
    }

    async fn attach_session(&self, id: ReservationId, session_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reservations SET checkout_session_id = $2, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id.0)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_paid(
        &self,
        id: ReservationId,
        payment_intent_id: &str,
        invoice_url: &str,
    ) -> Result<bool> {
        // Compare-and-swap: the WHERE clause is the transition rule. Zero
        // rows means the reservation was not pending.
        let result = sqlx::query(
            "UPDATE reservations \
             SET status = 'paid', payment_intent_id = $2, invoice_url = $3, updated_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id.0)
        .bind(payment_intent_id)
        .bind(invoice_url)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn cancel(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        actor: CancelActor,
        reason: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE reservations \
             SET status = 'cancelled', cancellation_reason = $3, cancelled_by = $4, updated_at = NOW() \
             WHERE id = $1 AND status = $2",
        )
        .bind(id.0)
        .bind(from.as_str())
        .bind(reason)
        .bind(actor.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<ReservationId>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM reservations WHERE status = 'pending' AND created_at < $1",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(rows.into_iter().map(|(id,)| ReservationId(id)).collect())
    }
}
