use crate::lifecycle::Reservations;
use roost_core::ids::{CorrelationKeys, PlaceId, ReservationId, UserId};
use roost_core::model::{CancelActor, DateRange, Reservation, ReservationStatus};
use roost_core::payment::{
    CheckoutLine, CheckoutSession, Invoice, PaymentGateway, RefundOutcome, SessionPaymentStatus,
};
use roost_core::repository::{PlaceStore, ReservationStore, UserStore};
use roost_core::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Bounded retry for provider calls: transient failures are retried a fixed
/// number of times with a fixed backoff, then surfaced. Permanent failures
/// surface immediately.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self { attempts, backoff }
    }
}

async fn retry_provider<T, F, Fut>(policy: &RetryPolicy, op: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(value) => return Ok(value),
            Err(Error::PaymentProvider {
                message,
                transient: true,
            }) if attempt < policy.attempts => {
                tracing::warn!(op, attempt, %message, "transient provider error, retrying");
                tokio::time::sleep(policy.backoff).await;
            }
            Err(err) => {
                tracing::error!(op, attempt, %err, "provider call failed");
                return Err(err);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutBegun {
    pub reservation_id: ReservationId,
    pub checkout_url: String,
}

#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub reservation_id: ReservationId,
    pub status: ReservationStatus,
    pub invoice_url: Option<String>,
}

/// Bridges the reservation state machine to the payment provider: owns
/// exactly one checkout session per reservation and reconciles its
/// resolution. All provider traffic goes through the bounded-retry policy.
pub struct CheckoutCoordinator {
    gateway: Arc<dyn PaymentGateway>,
    lifecycle: Arc<Reservations>,
    store: Arc<dyn ReservationStore>,
    users: Arc<dyn UserStore>,
    places: Arc<dyn PlaceStore>,
    client_url: String,
    retry: RetryPolicy,
}

impl CheckoutCoordinator {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        lifecycle: Arc<Reservations>,
        store: Arc<dyn ReservationStore>,
        users: Arc<dyn UserStore>,
        places: Arc<dyn PlaceStore>,
        client_url: String,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            lifecycle,
            store,
            users,
            places,
            client_url,
            retry,
        }
    }

    /// Create a pending reservation and open a checkout session for it.
    /// If the provider fails after the reservation is created, the
    /// reservation stays pending and checkout can be re-initiated; the
    /// janitor reclaims it if payment never arrives.
    pub async fn begin_checkout(
        &self,
        user_id: UserId,
        place_id: PlaceId,
        range: DateRange,
    ) -> Result<CheckoutBegun> {
        let (reservation, _place) = self.lifecycle.create(user_id, place_id, range).await?;
        self.initiate_checkout(reservation.id).await
    }

    /// Open (or re-open) a checkout session for a pending reservation.
    pub async fn initiate_checkout(&self, id: ReservationId) -> Result<CheckoutBegun> {
        let reservation = self.require(id).await?;
        if reservation.status != ReservationStatus::Pending {
            return Err(Error::InvalidState(format!(
                "reservation {id} is {}, checkout requires pending",
                reservation.status.as_str()
            )));
        }

        let user = self
            .users
            .get_user(reservation.user_id, true)
            .await?
            .ok_or_else(|| Error::NotFound(format!("user {}", reservation.user_id)))?;
        let place = self
            .places
            .get_place(reservation.place_id, true)
            .await?
            .ok_or_else(|| Error::NotFound(format!("place {}", reservation.place_id)))?;

        let keys = CorrelationKeys {
            reservation_id: reservation.id,
            place_id: place.id,
            user_id: user.id,
        };
        let line = CheckoutLine {
            name: place.title.clone(),
            description: place.description.clone(),
            unit_amount: place.price,
            quantity: reservation.range.nights(),
        };
        let success_url = format!(
            "{}/checkout_success?session_id={{CHECKOUT_SESSION_ID}}",
            self.client_url
        );
        let cancel_url = format!(
            "{}/?cancel=true&reservation_id={}",
            self.client_url, reservation.id
        );

        let customer = retry_provider(&self.retry, "create_customer", || {
            self.gateway.create_customer(&user.email, &keys)
        })
        .await?;

        let session = retry_provider(&self.retry, "create_checkout_session", || {
            self.gateway
                .create_checkout_session(&customer, &line, &keys, &success_url, &cancel_url)
        })
        .await?;

        // The session id lands on the reservation before the redirect URL is
        // handed out, so resolve_checkout can always correlate.
        if !self.store.attach_session(reservation.id, &session.id).await? {
            return Err(Error::InvalidState(format!(
                "reservation {id} left pending state during checkout"
            )));
        }

        tracing::info!(
            reservation_id = %reservation.id,
            session_id = %session.id,
            "checkout session opened"
        );
        Ok(CheckoutBegun {
            reservation_id: reservation.id,
            checkout_url: session.url,
        })
    }

    /// Reconcile a provider session. Paid sessions capture the intent, issue
    /// exactly one invoice and mark the reservation paid; unpaid sessions
    /// cancel it and free the hold. Redelivery is a no-op: resolving an
    /// already-settled reservation returns the stored outcome without
    /// touching the provider again.
    pub async fn resolve_checkout(&self, session_id: &str) -> Result<ResolveOutcome> {
        let reservation = self
            .store
            .get_by_session(session_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("checkout session {session_id}")))?;

        match reservation.status {
            ReservationStatus::Paid => {
                tracing::debug!(session_id, "resolve redelivered for paid reservation, no-op");
                return Ok(ResolveOutcome {
                    reservation_id: reservation.id,
                    status: ReservationStatus::Paid,
                    invoice_url: reservation.invoice_url,
                });
            }
            ReservationStatus::Cancelled => {
                return Ok(ResolveOutcome {
                    reservation_id: reservation.id,
                    status: ReservationStatus::Cancelled,
                    invoice_url: None,
                });
            }
            ReservationStatus::Pending => {}
        }

        let session = retry_provider(&self.retry, "retrieve_session", || {
            self.gateway.retrieve_session(session_id)
        })
        .await?;

        match session.payment_status {
            SessionPaymentStatus::Paid => self.settle_paid(&reservation, &session).await,
            SessionPaymentStatus::Unpaid => {
                let cancelled = self
                    .lifecycle
                    .cancel_pending(reservation.id, CancelActor::System, "payment failed")
                    .await?;
                tracing::info!(
                    reservation_id = %reservation.id,
                    "checkout failed, reservation cancelled and hold released"
                );
                Ok(ResolveOutcome {
                    reservation_id: cancelled.id,
                    status: cancelled.status,
                    invoice_url: None,
                })
            }
        }
    }

    async fn settle_paid(
        &self,
        reservation: &Reservation,
        session: &CheckoutSession,
    ) -> Result<ResolveOutcome> {
        let intent = session.payment_intent.clone().ok_or_else(|| {
            Error::provider_permanent("paid session carries no payment intent")
        })?;
        let customer = session
            .customer
            .clone()
            .ok_or_else(|| Error::provider_permanent("paid session carries no customer"))?;

        let place = self
            .places
            .get_place(reservation.place_id, true)
            .await?
            .ok_or_else(|| Error::NotFound(format!("place {}", reservation.place_id)))?;

        let keys = CorrelationKeys {
            reservation_id: reservation.id,
            place_id: place.id,
            user_id: reservation.user_id,
        };
        let line = CheckoutLine {
            name: place.title.clone(),
            description: Some(format!("Reservation for {}", place.title)),
            unit_amount: place.price,
            quantity: reservation.range.nights(),
        };

        let invoice: Invoice = retry_provider(&self.retry, "issue_invoice", || {
            self.gateway.issue_invoice(&customer, &line, &keys)
        })
        .await?;

        let paid = self
            .lifecycle
            .mark_paid(reservation.id, &intent, &invoice.hosted_url)
            .await?;
        Ok(ResolveOutcome {
            reservation_id: paid.id,
            status: paid.status,
            invoice_url: paid.invoice_url,
        })
    }

    /// Cancel a reservation. Pending reservations cancel directly; paid ones
    /// are refunded first, and only a successful (or idempotent
    /// already-refunded) provider outcome lets the state flip. On refund
    /// failure the cancellation aborts and the reservation stays paid.
    pub async fn cancel(
        &self,
        id: ReservationId,
        actor: CancelActor,
        reason: &str,
    ) -> Result<Reservation> {
        let reservation = self.require(id).await?;
        match reservation.status {
            ReservationStatus::Pending => {
                self.lifecycle.cancel_pending(id, actor, reason).await
            }
            ReservationStatus::Cancelled => Ok(reservation),
            ReservationStatus::Paid => {
                let intent = reservation.payment_intent_id.clone().ok_or_else(|| {
                    Error::InvalidState(format!("paid reservation {id} has no payment intent"))
                })?;

                match retry_provider(&self.retry, "create_refund", || {
                    self.gateway.create_refund(&intent)
                })
                .await?
                {
                    RefundOutcome::Refunded(refund_id) => {
                        tracing::info!(reservation_id = %id, refund_id, "refund issued");
                    }
                    RefundOutcome::AlreadyRefunded => {
                        tracing::warn!(reservation_id = %id, "charge was already refunded");
                    }
                }

                self.lifecycle
                    .finish_refund_cancellation(id, actor, reason)
                    .await
            }
        }
    }

    async fn require(&self, id: ReservationId) -> Result<Reservation> {
        self.store
            .get_reservation(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("reservation {id}")))
    }
}

// ============================================================================
// Mock gateway
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct MockState {
    sessions: HashMap<String, CheckoutSession>,
    next_session: u64,
    invoices_issued: u64,
    refunds: Vec<String>,
    customer_failures: u32,
    refund_failures: u32,
    refund_already_refunded: bool,
}

/// Scriptable in-process gateway for tests and local runs: sessions start
/// unpaid until `complete_session` simulates the hosted checkout, and
/// transient failures can be injected per operation.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the payer finishing the hosted checkout page.
    pub fn complete_session(&self, session_id: &str) {
        let mut state = self.state.lock().expect("mock state poisoned");
        if let Some(session) = state.sessions.get_mut(session_id) {
            session.payment_status = SessionPaymentStatus::Paid;
            session.payment_intent = Some(format!("pi_{session_id}"));
        }
    }

    pub fn fail_next_customers(&self, n: u32) {
        self.state.lock().expect("mock state poisoned").customer_failures = n;
    }

    pub fn fail_next_refunds(&self, n: u32) {
        self.state.lock().expect("mock state poisoned").refund_failures = n;
    }

    pub fn reject_refunds_as_duplicate(&self) {
        self.state
            .lock()
            .expect("mock state poisoned")
            .refund_already_refunded = true;
    }

    pub fn invoices_issued(&self) -> u64 {
        self.state.lock().expect("mock state poisoned").invoices_issued
    }

    pub fn refunds(&self) -> Vec<String> {
        self.state.lock().expect("mock state poisoned").refunds.clone()
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockGateway {
    async fn create_customer(&self, email: &str, _keys: &CorrelationKeys) -> Result<String> {
        let mut state = self.state.lock().expect("mock state poisoned");
        if state.customer_failures > 0 {
            state.customer_failures -= 1;
            return Err(Error::provider_transient("customer service unavailable"));
        }
        Ok(format!("cus_{email}"))
    }

    async fn create_checkout_session(
        &self,
        customer: &str,
        _line: &CheckoutLine,
        _keys: &CorrelationKeys,
        _success_url: &str,
        _cancel_url: &str,
    ) -> Result<CheckoutSession> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.next_session += 1;
        let id = format!("cs_{}", state.next_session);
        let session = CheckoutSession {
            id: id.clone(),
            url: format!("https://pay.mock/{id}"),
            customer: Some(customer.to_string()),
            payment_status: SessionPaymentStatus::Unpaid,
            payment_intent: None,
        };
        state.sessions.insert(id, session.clone());
        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession> {
        let state = self.state.lock().expect("mock state poisoned");
        state
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::provider_permanent(format!("no such session {session_id}")))
    }

    async fn issue_invoice(
        &self,
        _customer: &str,
        _line: &CheckoutLine,
        keys: &CorrelationKeys,
    ) -> Result<Invoice> {
        let mut state = self.state.lock().expect("mock state poisoned");
        state.invoices_issued += 1;
        let id = format!("in_{}", keys.reservation_id);
        Ok(Invoice {
            hosted_url: format!("https://invoices.mock/{id}"),
            id,
        })
    }

    async fn create_refund(&self, payment_intent_id: &str) -> Result<RefundOutcome> {
        let mut state = self.state.lock().expect("mock state poisoned");
        if state.refund_failures > 0 {
            state.refund_failures -= 1;
            return Err(Error::provider_transient("refund service unavailable"));
        }
        if state.refund_already_refunded {
            return Ok(RefundOutcome::AlreadyRefunded);
        }
        state.refunds.push(payment_intent_id.to_string());
        Ok(RefundOutcome::Refunded(format!("re_{payment_intent_id}")))
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
        gateway: Arc<MockGateway>,
        coordinator: CheckoutCoordinator,
        guest: UserId,
        place_id: PlaceId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(MockGateway::new());
        let guest = user(Role::User);
        let host = user(Role::User);
        let p = place(host.id, 100);
        let place_id = p.id;
        let guest_id = guest.id;
        store.upsert_user(guest);
        store.upsert_user(host);
        store.upsert_place(p);

        let lifecycle = Arc::new(Reservations::new(
            store.clone() as Arc<dyn PlaceStore>,
            store.clone() as Arc<dyn ReservationStore>,
        ));
        let coordinator = CheckoutCoordinator::new(
            gateway.clone() as Arc<dyn PaymentGateway>,
            lifecycle,
            store.clone() as Arc<dyn ReservationStore>,
            store.clone() as Arc<dyn UserStore>,
            store.clone() as Arc<dyn PlaceStore>,
            "https://roost.example".to_string(),
            RetryPolicy::new(3, Duration::from_millis(1)),
        );
        Fixture {
            store,
            gateway,
            coordinator,
            guest: guest_id,
            place_id,
        }
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(date(start), date(end)).unwrap()
    }

    async fn begin(f: &Fixture) -> (ReservationId, String) {
        let begun = f
            .coordinator
            .begin_checkout(f.guest, f.place_id, range("2026-06-01", "2026-06-05"))
            .await
            .unwrap();
        let reservation = f
            .store
            .get_reservation(begun.reservation_id)
            .await
            .unwrap()
            .unwrap();
        (begun.reservation_id, reservation.checkout_session_id.unwrap())
    }

    #[tokio::test]
    async fn begin_checkout_persists_session_before_returning_url() {
        let f = fixture();
        let begun = f
            .coordinator
            .begin_checkout(f.guest, f.place_id, range("2026-06-01", "2026-06-05"))
            .await
            .unwrap();
        assert!(begun.checkout_url.starts_with("https://pay.mock/"));

        let reservation = f
            .store
            .get_reservation(begun.reservation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert!(reservation.checkout_session_id.is_some());
        assert_eq!(reservation.total_price, 500);
    }

    #[tokio::test]
    async fn transient_provider_failure_is_retried_within_bounds() {
        let f = fixture();
        f.gateway.fail_next_customers(2);
        // Third attempt succeeds within the allowed retries.
        let begun = f
            .coordinator
            .begin_checkout(f.guest, f.place_id, range("2026-06-01", "2026-06-05"))
            .await
            .unwrap();
        assert!(!begun.checkout_url.is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_leave_reservation_pending() {
        let f = fixture();
        f.gateway.fail_next_customers(3);
        let err = f
            .coordinator
            .begin_checkout(f.guest, f.place_id, range("2026-06-01", "2026-06-05"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PaymentProvider { .. }));

        // The hold stays: checkout is retryable, the janitor reclaims later.
        let pending = f
            .store
            .stale_pending(chrono::Utc::now() + chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);

        // Re-initiation succeeds once the provider recovers.
        let begun = f.coordinator.initiate_checkout(pending[0]).await.unwrap();
        assert!(!begun.checkout_url.is_empty());
    }

    #[tokio::test]
    async fn resolve_success_marks_paid_and_issues_one_invoice() {
        let f = fixture();
        let (reservation_id, session_id) = begin(&f).await;
        f.gateway.complete_session(&session_id);

        let outcome = f.coordinator.resolve_checkout(&session_id).await.unwrap();
        assert_eq!(outcome.reservation_id, reservation_id);
        assert_eq!(outcome.status, ReservationStatus::Paid);
        assert!(outcome.invoice_url.as_deref().unwrap().contains("invoices.mock"));
        assert_eq!(f.gateway.invoices_issued(), 1);
    }

    #[tokio::test]
    async fn resolve_is_idempotent_under_redelivery() {
        let f = fixture();
        let (_, session_id) = begin(&f).await;
        f.gateway.complete_session(&session_id);

        let first = f.coordinator.resolve_checkout(&session_id).await.unwrap();
        let second = f.coordinator.resolve_checkout(&session_id).await.unwrap();
        assert_eq!(first.status, second.status);
        assert_eq!(first.invoice_url, second.invoice_url);
        // Exactly one invoice despite the redelivery.
        assert_eq!(f.gateway.invoices_issued(), 1);
    }

    #[tokio::test]
    async fn resolve_failure_cancels_and_releases_the_hold() {
        let f = fixture();
        let (reservation_id, session_id) = begin(&f).await;
        // Session never completed: provider reports unpaid.
        let outcome = f.coordinator.resolve_checkout(&session_id).await.unwrap();
        assert_eq!(outcome.status, ReservationStatus::Cancelled);

        let reservation = f
            .store
            .get_reservation(reservation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            reservation.cancellation_reason.as_deref(),
            Some("payment failed")
        );

        // The range is bookable again.
        let again = f
            .coordinator
            .begin_checkout(f.guest, f.place_id, range("2026-06-01", "2026-06-05"))
            .await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn cancelling_paid_refunds_before_flipping_state() {
        let f = fixture();
        let (reservation_id, session_id) = begin(&f).await;
        f.gateway.complete_session(&session_id);
        f.coordinator.resolve_checkout(&session_id).await.unwrap();

        let cancelled = f
            .coordinator
            .cancel(reservation_id, CancelActor::Guest, "requested by customer")
            .await
            .unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
        assert_eq!(f.gateway.refunds().len(), 1);

        // Scenario D: the blocked dates are gone.
        let blocking = f.store.blocking_for_place(f.place_id).await.unwrap();
        assert!(blocking.is_empty());
    }

    #[tokio::test]
    async fn refund_failure_aborts_the_cancellation() {
        let f = fixture();
        let (reservation_id, session_id) = begin(&f).await;
        f.gateway.complete_session(&session_id);
        f.coordinator.resolve_checkout(&session_id).await.unwrap();

        f.gateway.fail_next_refunds(10);
        let err = f
            .coordinator
            .cancel(reservation_id, CancelActor::Guest, "requested by customer")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PaymentProvider { .. }));

        // Status must still be paid: cancellation never silently succeeds
        // while money is unrefunded.
        let reservation = f
            .store
            .get_reservation(reservation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Paid);
    }

    #[tokio::test]
    async fn duplicate_refund_rejection_counts_as_success() {
        let f = fixture();
        let (reservation_id, session_id) = begin(&f).await;
        f.gateway.complete_session(&session_id);
        f.coordinator.resolve_checkout(&session_id).await.unwrap();

        f.gateway.reject_refunds_as_duplicate();
        let cancelled = f
            .coordinator
            .cancel(reservation_id, CancelActor::Guest, "requested by customer")
            .await
            .unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancelling_pending_needs_no_refund() {
        let f = fixture();
        let (reservation_id, _) = begin(&f).await;
        let cancelled = f
            .coordinator
            .cancel(reservation_id, CancelActor::Guest, "changed plans")
            .await
            .unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
        assert!(f.gateway.refunds().is_empty());
    }
}
