use chrono::{Duration as ChronoDuration, Utc};
use roost_core::model::{CancelActor, ReservationStatus};
use roost_core::repository::ReservationStore;
use roost_core::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info};

/// Reclaims pending reservations whose checkout window has lapsed. Without
/// this sweep a reservation that never reaches payment would hold its date
/// range forever.
pub struct Janitor {
    store: Arc<dyn ReservationStore>,
    checkout_window: ChronoDuration,
}

impl Janitor {
    pub fn new(store: Arc<dyn ReservationStore>, checkout_window: ChronoDuration) -> Self {
        Self {
            store,
            checkout_window,
        }
    }

    /// One sweep: cancel every pending reservation older than the checkout
    /// window. Each cancellation is a compare-and-swap, so a reservation
    /// that got paid between the listing and the sweep is skipped, not
    /// clobbered.
    pub async fn sweep(&self) -> Result<u64> {
        let cutoff = Utc::now() - self.checkout_window;
        let stale = self.store.stale_pending(cutoff).await?;
        let mut reclaimed = 0;
        for id in stale {
            if self
                .store
                .cancel(id, ReservationStatus::Pending, CancelActor::System, "expired")
                .await?
            {
                info!(reservation_id = %id, "stale pending reservation reclaimed");
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    /// Background loop for the API binary.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        info!(
            interval_secs = interval.as_secs(),
            "reservation janitor started"
        );
        loop {
            sleep(interval).await;
            match self.sweep().await {
                Ok(0) => {}
                Ok(n) => info!(reclaimed = n, "janitor sweep reclaimed reservations"),
                Err(e) => error!("janitor sweep failed: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{date, place, user};
    use roost_core::model::{DateRange, Reservation, Role};
    use roost_store::MemoryStore;

    #[tokio::test]
    async fn sweep_reclaims_only_stale_pending() {
        let store = Arc::new(MemoryStore::new());
        let guest = user(Role::User);
        let host = user(Role::User);
        let p = place(host.id, 100);
        store.upsert_user(guest.clone());
        store.upsert_user(host);
        store.upsert_place(p.clone());

        let range_a = DateRange::new(date("2026-06-01"), date("2026-06-05")).unwrap();
        let range_b = DateRange::new(date("2026-07-01"), date("2026-07-05")).unwrap();
        let range_c = DateRange::new(date("2026-08-01"), date("2026-08-05")).unwrap();

        // Stale pending: created an hour ago.
        let mut stale = Reservation::new_pending(guest.id, &p, range_a);
        stale.created_at = Utc::now() - ChronoDuration::hours(1);
        store.insert_pending(&stale).await.unwrap();

        // Fresh pending: inside the window.
        let fresh = Reservation::new_pending(guest.id, &p, range_b);
        store.insert_pending(&fresh).await.unwrap();

        // Old but paid: never reclaimed.
        let mut old_paid = Reservation::new_pending(guest.id, &p, range_c);
        old_paid.created_at = Utc::now() - ChronoDuration::hours(2);
        store.insert_pending(&old_paid).await.unwrap();
        store
            .mark_paid(old_paid.id, "pi_1", "https://inv/1")
            .await
            .unwrap();

        let janitor = Janitor::new(
            store.clone() as Arc<dyn ReservationStore>,
            ChronoDuration::minutes(30),
        );
        let reclaimed = janitor.sweep().await.unwrap();
        assert_eq!(reclaimed, 1);

        let reclaimed_res = store.get_reservation(stale.id).await.unwrap().unwrap();
        assert_eq!(reclaimed_res.status, ReservationStatus::Cancelled);
        assert_eq!(reclaimed_res.cancellation_reason.as_deref(), Some("expired"));
        assert_eq!(reclaimed_res.cancelled_by, Some(CancelActor::System));

        let fresh_res = store.get_reservation(fresh.id).await.unwrap().unwrap();
        assert_eq!(fresh_res.status, ReservationStatus::Pending);
        let paid_res = store.get_reservation(old_paid.id).await.unwrap().unwrap();
        assert_eq!(paid_res.status, ReservationStatus::Paid);
    }
}
