use chrono::NaiveDate;
use roost_core::ids::PlaceId;
use roost_core::model::{DateRange, Reservation};
use roost_core::repository::ReservationStore;
use roost_core::Result;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Decides whether a place is free for a date range, and expands conflicting
/// reservations into blocked calendar days for UI disabling.
///
/// The overlap policy is inclusive on both ends (no same-day turnover); see
/// `DateRange::overlaps`. Only reservations in {pending, paid} block; the
/// engine always reads the latest committed state, never a cache.
pub struct AvailabilityEngine {
    reservations: Arc<dyn ReservationStore>,
}

impl AvailabilityEngine {
    pub fn new(reservations: Arc<dyn ReservationStore>) -> Self {
        Self { reservations }
    }

    pub async fn is_range_available(&self, place_id: PlaceId, range: DateRange) -> Result<bool> {
        let blocking = self.reservations.blocking_for_place(place_id).await?;
        Ok(!conflicts(&blocking, range))
    }

    /// Every calendar day covered by a blocking reservation, deduplicated and
    /// sorted. Expansion is day-by-day and lazy per range; only the collected
    /// set is materialized.
    pub async fn blocked_dates(&self, place_id: PlaceId) -> Result<BTreeSet<NaiveDate>> {
        let blocking = self.reservations.blocking_for_place(place_id).await?;
        Ok(blocked_days(&blocking).collect())
    }
}

/// Pure conflict check over an already-loaded set of blocking reservations.
pub fn conflicts(blocking: &[Reservation], candidate: DateRange) -> bool {
    blocking
        .iter()
        .any(|existing| existing.range.overlaps(&candidate))
}

/// Lazy expansion of blocking reservations into individual days.
pub fn blocked_days(blocking: &[Reservation]) -> impl Iterator<Item = NaiveDate> + '_ {
    blocking.iter().flat_map(|r| r.range.iter_days())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{date, place, user};
    use roost_core::model::{CancelActor, ReservationStatus, Role};
    use roost_store::MemoryStore;

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(date(start), date(end)).unwrap()
    }

    async fn engine_with_booking(
        status_paid: bool,
    ) -> (AvailabilityEngine, Arc<MemoryStore>, PlaceId) {
        let store = Arc::new(MemoryStore::new());
        let guest = user(Role::User);
        let host = user(Role::User);
        let p = place(host.id, 100);
        let place_id = p.id;
        store.upsert_user(guest.clone());
        store.upsert_user(host);
        store.upsert_place(p.clone());

        let reservation = roost_core::model::Reservation::new_pending(
            guest.id,
            &p,
            range("2026-06-01", "2026-06-05"),
        );
        let id = reservation.id;
        store.insert_pending(&reservation).await.unwrap();
        if status_paid {
            store.mark_paid(id, "pi_1", "https://inv").await.unwrap();
        }

        let engine = AvailabilityEngine::new(store.clone() as Arc<dyn ReservationStore>);
        (engine, store, place_id)
    }

    #[tokio::test]
    async fn pending_reservation_blocks_overlapping_range() {
        let (engine, _store, place_id) = engine_with_booking(false).await;
        assert!(!engine
            .is_range_available(place_id, range("2026-06-03", "2026-06-04"))
            .await
            .unwrap());
        assert!(engine
            .is_range_available(place_id, range("2026-06-06", "2026-06-08"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn shared_boundary_day_conflicts() {
        // No same-day turnover: checkout day equals next check-in day.
        let (engine, _store, place_id) = engine_with_booking(true).await;
        assert!(!engine
            .is_range_available(place_id, range("2026-06-05", "2026-06-07"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn cancelled_reservation_never_blocks() {
        let (engine, store, place_id) = engine_with_booking(false).await;
        let blocking = store.blocking_for_place(place_id).await.unwrap();
        store
            .cancel(
                blocking[0].id,
                ReservationStatus::Pending,
                CancelActor::Guest,
                "changed plans",
            )
            .await
            .unwrap();
        assert!(engine
            .is_range_available(place_id, range("2026-06-03", "2026-06-04"))
            .await
            .unwrap());
        assert!(engine.blocked_dates(place_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blocked_dates_expand_to_individual_days() {
        let (engine, _store, place_id) = engine_with_booking(true).await;
        let days = engine.blocked_dates(place_id).await.unwrap();
        assert_eq!(days.len(), 5);
        assert!(days.contains(&date("2026-06-01")));
        assert!(days.contains(&date("2026-06-05")));
        assert!(!days.contains(&date("2026-06-06")));
    }
}
