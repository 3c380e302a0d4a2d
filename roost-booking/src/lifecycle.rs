use crate::availability::AvailabilityEngine;
use roost_core::ids::{PlaceId, ReservationId, UserId};
use roost_core::model::{CancelActor, DateRange, Place, PlaceStatus, Reservation, ReservationStatus};
use roost_core::repository::{PlaceStore, ReservationStore};
use roost_core::{Error, Result};
use std::sync::Arc;

/// Owns the reservation state machine: pending -> paid | cancelled, and
/// paid -> cancelled only through the refund path. Every transition is a
/// compare-and-swap in the store; the store additionally re-enforces the
/// overlap invariant at insert commit time, which closes the check-then-act
/// race between two concurrent creates.
pub struct Reservations {
    places: Arc<dyn PlaceStore>,
    store: Arc<dyn ReservationStore>,
    availability: AvailabilityEngine,
}

impl Reservations {
    pub fn new(places: Arc<dyn PlaceStore>, store: Arc<dyn ReservationStore>) -> Self {
        let availability = AvailabilityEngine::new(store.clone());
        Self {
            places,
            store,
            availability,
        }
    }

    pub fn availability(&self) -> &AvailabilityEngine {
        &self.availability
    }

    /// Create a pending reservation. The place must exist, be active, and
    /// the range must be free. Total price is computed here as
    /// `price * nights` and never recomputed after capture.
    pub async fn create(
        &self,
        user_id: UserId,
        place_id: PlaceId,
        range: DateRange,
    ) -> Result<(Reservation, Place)> {
        let place = self
            .places
            .get_place(place_id, true)
            .await?
            .ok_or_else(|| Error::NotFound(format!("place {place_id}")))?;

        if place.status != PlaceStatus::Active {
            return Err(Error::InvalidState(format!(
                "place {place_id} is {} and cannot be booked",
                place.status.as_str()
            )));
        }

        if !self
            .availability
            .is_range_available(place_id, range)
            .await?
        {
            return Err(Error::Conflict(
                "the requested dates are no longer available".to_string(),
            ));
        }

        let reservation = Reservation::new_pending(user_id, &place, range);
        self.store.insert_pending(&reservation).await?;
        tracing::info!(
            reservation_id = %reservation.id,
            place_id = %place_id,
            nights = range.nights(),
            "reservation created"
        );
        Ok((reservation, place))
    }

    /// Transition pending -> paid. Repeat deliveries against an
    /// already-paid reservation are a no-op success; the provider redelivers
    /// webhooks and must not see an error for that.
    pub async fn mark_paid(
        &self,
        id: ReservationId,
        payment_intent_id: &str,
        invoice_url: &str,
    ) -> Result<Reservation> {
        if self
            .store
            .mark_paid(id, payment_intent_id, invoice_url)
            .await?
        {
            tracing::info!(reservation_id = %id, "reservation marked paid");
            return self.require(id).await;
        }

        let current = self.require(id).await?;
        match current.status {
            ReservationStatus::Paid => {
                tracing::debug!(reservation_id = %id, "mark_paid redelivered, no-op");
                Ok(current)
            }
            status => Err(Error::InvalidTransition {
                from: status.as_str().to_string(),
                to: "paid".to_string(),
            }),
        }
    }

    /// Cancel a pending reservation. No capture occurred, so no refund is
    /// needed and the date range frees immediately (cancelled reservations
    /// never block availability). Cancelling an already-cancelled
    /// reservation is a no-op.
    pub async fn cancel_pending(
        &self,
        id: ReservationId,
        actor: CancelActor,
        reason: &str,
    ) -> Result<Reservation> {
        if self
            .store
            .cancel(id, ReservationStatus::Pending, actor, reason)
            .await?
        {
            tracing::info!(reservation_id = %id, reason, "pending reservation cancelled");
            return self.require(id).await;
        }

        let current = self.require(id).await?;
        match current.status {
            ReservationStatus::Cancelled => Ok(current),
            status => Err(Error::InvalidTransition {
                from: status.as_str().to_string(),
                to: "cancelled".to_string(),
            }),
        }
    }

    /// Transition paid -> cancelled. Callers must have already secured the
    /// refund: the payment coordination layer issues the refund first and
    /// only then flips state, so "cancelled with money unrefunded" can never
    /// be observed.
    pub async fn finish_refund_cancellation(
        &self,
        id: ReservationId,
        actor: CancelActor,
        reason: &str,
    ) -> Result<Reservation> {
        if self
            .store
            .cancel(id, ReservationStatus::Paid, actor, reason)
            .await?
        {
            tracing::info!(reservation_id = %id, reason, "paid reservation cancelled after refund");
            return self.require(id).await;
        }

        let current = self.require(id).await?;
        match current.status {
            ReservationStatus::Cancelled => Ok(current),
            status => Err(Error::InvalidTransition {
                from: status.as_str().to_string(),
                to: "cancelled".to_string(),
            }),
        }
    }

    pub async fn get(&self, id: ReservationId) -> Result<Option<Reservation>> {
        self.store.get_reservation(id).await
    }

    async fn require(&self, id: ReservationId) -> Result<Reservation> {
        self.store
            .get_reservation(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("reservation {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{date, place, user};
    use roost_core::model::Role;
    use roost_store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        lifecycle: Reservations,
        guest: UserId,
        place_id: PlaceId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let guest = user(Role::User);
        let host = user(Role::User);
        let p = place(host.id, 100);
        let place_id = p.id;
        let guest_id = guest.id;
        store.upsert_user(guest);
        store.upsert_user(host);
        store.upsert_place(p);

        let lifecycle = Reservations::new(
            store.clone() as Arc<dyn PlaceStore>,
            store.clone() as Arc<dyn ReservationStore>,
        );
        Fixture {
            store,
            lifecycle,
            guest: guest_id,
            place_id,
        }
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(date(start), date(end)).unwrap()
    }

    #[tokio::test]
    async fn create_computes_price_and_starts_pending() {
        let f = fixture();
        let (reservation, _) = f
            .lifecycle
            .create(f.guest, f.place_id, range("2026-06-01", "2026-06-05"))
            .await
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(reservation.total_price, 500);
    }

    #[tokio::test]
    async fn overlapping_create_is_rejected_with_conflict() {
        let f = fixture();
        f.lifecycle
            .create(f.guest, f.place_id, range("2026-06-01", "2026-06-05"))
            .await
            .unwrap();
        let err = f
            .lifecycle
            .create(f.guest, f.place_id, range("2026-06-03", "2026-06-04"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn create_requires_active_place() {
        let f = fixture();
        f.store
            .set_place_status(f.place_id, PlaceStatus::Inactive, "owner paused listing")
            .await
            .unwrap();
        let err = f
            .lifecycle
            .create(f.guest, f.place_id, range("2026-06-01", "2026-06-05"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn missing_place_is_not_found() {
        let f = fixture();
        let err = f
            .lifecycle
            .create(f.guest, PlaceId::new(), range("2026-06-01", "2026-06-05"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn mark_paid_is_idempotent_on_redelivery() {
        let f = fixture();
        let (reservation, _) = f
            .lifecycle
            .create(f.guest, f.place_id, range("2026-06-01", "2026-06-05"))
            .await
            .unwrap();

        let first = f
            .lifecycle
            .mark_paid(reservation.id, "pi_1", "https://inv/1")
            .await
            .unwrap();
        assert_eq!(first.status, ReservationStatus::Paid);

        // Redelivery: same outcome, no error.
        let second = f
            .lifecycle
            .mark_paid(reservation.id, "pi_1", "https://inv/1")
            .await
            .unwrap();
        assert_eq!(second.status, ReservationStatus::Paid);
        assert_eq!(second.invoice_url.as_deref(), Some("https://inv/1"));
    }

    #[tokio::test]
    async fn mark_paid_after_cancellation_is_invalid() {
        let f = fixture();
        let (reservation, _) = f
            .lifecycle
            .create(f.guest, f.place_id, range("2026-06-01", "2026-06-05"))
            .await
            .unwrap();
        f.lifecycle
            .cancel_pending(reservation.id, CancelActor::Guest, "changed plans")
            .await
            .unwrap();
        let err = f
            .lifecycle
            .mark_paid(reservation.id, "pi_1", "https://inv/1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn cancelling_pending_frees_the_range() {
        let f = fixture();
        let (reservation, _) = f
            .lifecycle
            .create(f.guest, f.place_id, range("2026-06-01", "2026-06-05"))
            .await
            .unwrap();
        f.lifecycle
            .cancel_pending(reservation.id, CancelActor::Guest, "changed plans")
            .await
            .unwrap();

        // The same dates can be booked again.
        let (again, _) = f
            .lifecycle
            .create(f.guest, f.place_id, range("2026-06-01", "2026-06-05"))
            .await
            .unwrap();
        assert_eq!(again.status, ReservationStatus::Pending);
    }

    #[tokio::test]
    async fn paid_cannot_be_cancelled_through_the_pending_path() {
        let f = fixture();
        let (reservation, _) = f
            .lifecycle
            .create(f.guest, f.place_id, range("2026-06-01", "2026-06-05"))
            .await
            .unwrap();
        f.lifecycle
            .mark_paid(reservation.id, "pi_1", "https://inv/1")
            .await
            .unwrap();
        let err = f
            .lifecycle
            .cancel_pending(reservation.id, CancelActor::Guest, "changed plans")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn concurrent_submissions_for_the_same_range_admit_exactly_one() {
        let f = fixture();
        let rival = user(Role::User);
        let rival_id = rival.id;
        f.store.upsert_user(rival);

        let range_a = range("2026-06-01", "2026-06-05");
        let range_b = range("2026-06-04", "2026-06-08");
        let (first, second) = tokio::join!(
            f.lifecycle.create(f.guest, f.place_id, range_a),
            f.lifecycle.create(rival_id, f.place_id, range_b),
        );

        let winners = [first.is_ok(), second.is_ok()]
            .iter()
            .filter(|ok| **ok)
            .count();
        assert_eq!(winners, 1);
        for outcome in [first, second] {
            if let Err(err) = outcome {
                assert!(matches!(err, Error::Conflict(_)));
            }
        }
        assert_eq!(
            f.store.blocking_for_place(f.place_id).await.unwrap().len(),
            1
        );
    }
}
