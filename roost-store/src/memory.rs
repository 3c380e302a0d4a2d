use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roost_core::ids::{PlaceId, ReservationId, UserId};
use roost_core::model::{
    CancelActor, Place, PlaceStatus, Reservation, ReservationStatus, User, UserStatus,
};
use roost_core::repository::{
    CascadeOutcome, CascadeReasons, PlaceStore, ReservationStore, UserStore,
};
use roost_core::{Error, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// In-memory store backing unit and integration tests. A single mutex around
/// the whole dataset gives every multi-aggregate operation the same
/// all-or-nothing visibility the Postgres store gets from transactions.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    places: HashMap<PlaceId, Place>,
    users: HashMap<UserId, User>,
    reservations: HashMap<ReservationId, Reservation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| Error::Store("memory store mutex poisoned".to_string()))
    }

    /// Listing/profile CRUD lives outside this core; fixtures seed through
    /// these.
    pub fn upsert_place(&self, place: Place) {
        if let Ok(mut inner) = self.lock() {
            inner.places.insert(place.id, place);
        }
    }

    pub fn upsert_user(&self, user: User) {
        if let Ok(mut inner) = self.lock() {
            inner.users.insert(user.id, user);
        }
    }
}

#[async_trait]
impl PlaceStore for MemoryStore {
    async fn get_place(&self, id: PlaceId, include_inactive: bool) -> Result<Option<Place>> {
        let inner = self.lock()?;
        Ok(inner
            .places
            .get(&id)
            .filter(|p| include_inactive || p.status == PlaceStatus::Active)
            .cloned())
    }

    async fn list_places_by_owner(
        &self,
        owner: UserId,
        include_inactive: bool,
    ) -> Result<Vec<Place>> {
        let inner = self.lock()?;
        Ok(inner
            .places
            .values()
            .filter(|p| p.owner_id == owner)
            .filter(|p| include_inactive || p.status == PlaceStatus::Active)
            .cloned()
            .collect())
    }

    async fn set_place_status(
        &self,
        id: PlaceId,
        status: PlaceStatus,
        reason: &str,
    ) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.places.get_mut(&id) {
            Some(place) => {
                place.status = status;
                place.status_reason = Some(reason.to_string());
                place.status_updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, id: UserId, include_inactive: bool) -> Result<Option<User>> {
        let inner = self.lock()?;
        Ok(inner
            .users
            .get(&id)
            .filter(|u| include_inactive || u.status == UserStatus::Active)
            .cloned())
    }

    async fn set_user_status(&self, id: UserId, status: UserStatus, reason: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.users.get_mut(&id) {
            Some(user) => {
                user.status = status;
                user.status_reason = Some(reason.to_string());
                user.status_updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate_user_cascade(
        &self,
        id: UserId,
        status: UserStatus,
        reasons: &CascadeReasons,
    ) -> Result<CascadeOutcome> {
        let mut inner = self.lock()?;
        let now = Utc::now();

        let user = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("user {id}")))?;
        user.status = status;
        user.status_reason = Some(reasons.user_reason.clone());
        user.status_updated_at = now;

        let mut places_deactivated = 0;
        for place in inner.places.values_mut().filter(|p| p.owner_id == id) {
            if place.status != PlaceStatus::Inactive {
                place.status = PlaceStatus::Inactive;
                place.status_reason = Some(reasons.place_reason.clone());
                place.status_updated_at = now;
                places_deactivated += 1;
            }
        }

        let mut reservations_cancelled = 0;
        for reservation in inner
            .reservations
            .values_mut()
            .filter(|r| r.user_id == id && r.status == ReservationStatus::Pending)
        {
            reservation.status = ReservationStatus::Cancelled;
            reservation.cancellation_reason = Some(reasons.reservation_reason.clone());
            reservation.cancelled_by = Some(CancelActor::System);
            reservation.updated_at = now;
            reservations_cancelled += 1;
        }

        Ok(CascadeOutcome {
            places_deactivated,
            reservations_cancelled,
        })
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn insert_pending(&self, reservation: &Reservation) -> Result<()> {
        let mut inner = self.lock()?;

        // Commit-time overlap guard: the availability check the caller ran is
        // not atomic with this insert, so the invariant is re-enforced here
        // under the store lock.
        let conflict = inner.reservations.values().any(|existing| {
            existing.place_id == reservation.place_id
                && existing.status.blocks_availability()
                && existing.range.overlaps(&reservation.range)
        });
        if conflict {
            return Err(Error::Conflict(
                "an overlapping reservation already exists".to_string(),
            ));
        }

        if let Some(place) = inner.places.get_mut(&reservation.place_id) {
            place.reservation_count += 1;
        }
        inner
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let inner = self.lock()?;
        Ok(inner.reservations.get(&id).cloned())
    }

    async fn get_by_session(&self, session_id: &str) -> Result<Option<Reservation>> {
        let inner = self.lock()?;
        Ok(inner
            .reservations
            .values()
            .find(|r| r.checkout_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn blocking_for_place(&self, place_id: PlaceId) -> Result<Vec<Reservation>> {
        let inner = self.lock()?;
        Ok(inner
            .reservations
            .values()
            .filter(|r| r.place_id == place_id && r.status.blocks_availability())
            .cloned()
            .collect())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Reservation>> {
        let inner = self.lock()?;
        let mut out: Vec<Reservation> = inner
            .reservations
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Reservation>> {
        let inner = self.lock()?;
        let owned: Vec<PlaceId> = inner
            .places
            .values()
            .filter(|p| p.owner_id == owner)
            .map(|p| p.id)
            .collect();
        let mut out: Vec<Reservation> = inner
            .reservations
            .values()
            .filter(|r| owned.contains(&r.place_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn attach_session(&self, id: ReservationId, session_id: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.reservations.get_mut(&id) {
            Some(r) if r.status == ReservationStatus::Pending => {
                r.checkout_session_id = Some(session_id.to_string());
                r.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_paid(
        &self,
        id: ReservationId,
        payment_intent_id: &str,
        invoice_url: &str,
    ) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.reservations.get_mut(&id) {
            Some(r) if r.status == ReservationStatus::Pending => {
                r.status = ReservationStatus::Paid;
                r.payment_intent_id = Some(payment_intent_id.to_string());
                r.invoice_url = Some(invoice_url.to_string());
                r.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel(
        &self,
        id: ReservationId,
        from: ReservationStatus,
        actor: CancelActor,
        reason: &str,
    ) -> Result<bool> {
        let mut inner = self.lock()?;
        match inner.reservations.get_mut(&id) {
            Some(r) if r.status == from => {
                r.status = ReservationStatus::Cancelled;
                r.cancellation_reason = Some(reason.to_string());
                r.cancelled_by = Some(actor);
                r.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn stale_pending(&self, cutoff: DateTime<Utc>) -> Result<Vec<ReservationId>> {
        let inner = self.lock()?;
        Ok(inner
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Pending && r.created_at < cutoff)
            .map(|r| r.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use roost_core::model::DateRange;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(date(start), date(end)).unwrap()
    }

    fn seeded_place(store: &MemoryStore) -> Place {
        let place = Place {
            id: PlaceId::new(),
            owner_id: UserId::new(),
            title: "Canal house".to_string(),
            description: None,
            image_url: None,
            price: 120,
            guest_capacity: 2,
            status: PlaceStatus::Active,
            status_reason: None,
            status_updated_at: Utc::now(),
            reservation_count: 0,
            created_at: Utc::now(),
        };
        store.upsert_place(place.clone());
        place
    }

    // The insert itself re-enforces the overlap invariant, independently of
    // any availability check the caller may have run beforehand.
    #[tokio::test]
    async fn insert_pending_rejects_overlap_at_commit_time() {
        let store = MemoryStore::new();
        let place = seeded_place(&store);

        let first = Reservation::new_pending(UserId::new(), &place, range("2026-06-01", "2026-06-05"));
        let second = Reservation::new_pending(UserId::new(), &place, range("2026-06-05", "2026-06-07"));

        store.insert_pending(&first).await.unwrap();
        let err = store.insert_pending(&second).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // Only the winner landed; the counter moved once.
        assert_eq!(store.blocking_for_place(place.id).await.unwrap().len(), 1);
        let place = store.get_place(place.id, true).await.unwrap().unwrap();
        assert_eq!(place.reservation_count, 1);
    }

    #[tokio::test]
    async fn cancelled_rows_do_not_block_insert() {
        let store = MemoryStore::new();
        let place = seeded_place(&store);

        let first = Reservation::new_pending(UserId::new(), &place, range("2026-06-01", "2026-06-05"));
        store.insert_pending(&first).await.unwrap();
        assert!(store
            .cancel(
                first.id,
                ReservationStatus::Pending,
                CancelActor::System,
                "expired",
            )
            .await
            .unwrap());

        let second = Reservation::new_pending(UserId::new(), &place, range("2026-06-03", "2026-06-06"));
        store.insert_pending(&second).await.unwrap();
    }
}
