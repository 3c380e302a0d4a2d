use crate::ids::{PlaceId, ReservationId, UserId};
use crate::model::{
    CancelActor, Place, PlaceStatus, Reservation, ReservationStatus, User, UserStatus,
};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Outcome of a user-deactivation cascade, reported for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub places_deactivated: u64,
    pub reservations_cancelled: u64,
}

/// Reasons applied to the dependents touched by a cascade.
#[derive(Debug, Clone)]
pub struct CascadeReasons {
    pub user_reason: String,
    pub place_reason: String,
    pub reservation_reason: String,
}

#[async_trait]
pub trait PlaceStore: Send + Sync {
    /// Reads filter to `active` unless `include_inactive` is passed. The
    /// filter is an explicit parameter at every call site; there is no
    /// implicit global query rewriting.
    async fn get_place(&self, id: PlaceId, include_inactive: bool) -> Result<Option<Place>>;

    async fn list_places_by_owner(&self, owner: UserId, include_inactive: bool)
        -> Result<Vec<Place>>;

    /// Unconditional admin status write. Returns false when the place does
    /// not exist.
    async fn set_place_status(
        &self,
        id: PlaceId,
        status: PlaceStatus,
        reason: &str,
    ) -> Result<bool>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: UserId, include_inactive: bool) -> Result<Option<User>>;

    async fn set_user_status(&self, id: UserId, status: UserStatus, reason: &str) -> Result<bool>;

    /// Atomic cascade: the user status write, the deactivation of every place
    /// the user owns, and the cancellation of the user's *pending*
    /// reservations commit together or not at all. Paid and cancelled
    /// reservations are financial history and are never touched.
    async fn deactivate_user_cascade(
        &self,
        id: UserId,
        status: UserStatus,
        reasons: &CascadeReasons,
    ) -> Result<CascadeOutcome>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Insert a pending reservation and bump the place's reservation counter
    /// in one transaction. The store re-enforces the overlap invariant at
    /// commit time (conditional insert / exclusion constraint), so a racing
    /// writer loses with `Error::Conflict` even though the caller's
    /// availability check already passed.
    async fn insert_pending(&self, reservation: &Reservation) -> Result<()>;

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>>;

    async fn get_by_session(&self, session_id: &str) -> Result<Option<Reservation>>;

    /// Reservations that currently block availability for a place
    /// (status in {pending, paid}).
    async fn blocking_for_place(&self, place_id: PlaceId) -> Result<Vec<Reservation>>;

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Reservation>>;

    /// Reservations made against any place owned by `owner`.
    async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Reservation>>;

    /// Persist the provider session id on a still-pending reservation.
    async fn attach_session(&self, id: ReservationId, session_id: &str) -> Result<bool>;

    /// Compare-and-swap transition pending -> paid. Returns false when the
    /// reservation was not in `pending` (caller decides whether that is an
    /// idempotent redelivery or a misuse).
    async fn mark_paid(
        &self,
        id: ReservationId,
        payment_intent_id: &str,
        invoice_url: &str,
    ) -> Result<bool>;

    /// Compare-and-swap transition `from` -> cancelled.
    async fn cancel(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        actor: CancelActor,
        reason: &str,
    ) -> Result<bool>;

    /// Pending reservations created before `cutoff`, for the expiry janitor.
    async fn stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<ReservationId>>;
}
