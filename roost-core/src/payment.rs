use crate::ids::CorrelationKeys;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPaymentStatus {
    Paid,
    Unpaid,
}

/// Provider-side checkout session. `payment_intent` is only populated once
/// the provider has attempted a charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
    pub customer: Option<String>,
    pub payment_status: SessionPaymentStatus,
    pub payment_intent: Option<String>,
}

/// One checkout line: the nightly price times the number of nights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub name: String,
    pub description: Option<String>,
    /// Smallest currency unit (cents).
    pub unit_amount: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub hosted_url: String,
}

/// Refund result. A provider rejecting the refund because the charge was
/// already refunded is a successful (idempotent) outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
    Refunded(String),
    AlreadyRefunded,
}

/// Stripe-shaped payment provider seam. Implementations perform one outbound
/// network call per method; transient failures surface as
/// `Error::PaymentProvider { transient: true }` and are retried by the
/// coordination layer, never inside the adapter.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a provider customer for the payer.
    async fn create_customer(&self, email: &str, keys: &CorrelationKeys) -> Result<String>;

    /// Create a checkout session for a single line item, with the correlation
    /// keys embedded as metadata.
    async fn create_checkout_session(
        &self,
        customer: &str,
        line: &CheckoutLine,
        keys: &CorrelationKeys,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession>;

    /// Retrieve a session's current state by id.
    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession>;

    /// Create, finalize and send an invoice for a captured payment; returns
    /// the hosted invoice.
    async fn issue_invoice(
        &self,
        customer: &str,
        line: &CheckoutLine,
        keys: &CorrelationKeys,
    ) -> Result<Invoice>;

    /// Refund a captured payment by its payment-intent id.
    async fn create_refund(&self, payment_intent_id: &str) -> Result<RefundOutcome>;
}
