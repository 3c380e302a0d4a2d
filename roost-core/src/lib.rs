pub mod ids;
pub mod model;
pub mod payment;
pub mod repository;

/// Error taxonomy shared by every layer. The API crate maps these onto HTTP
/// statuses; nothing below the API boundary ever sees a status code.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Availability lost the race. The client must re-query and resubmit.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The entity exists but its current status forbids the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Payment provider failure. `transient` errors are retried with bounded
    /// attempts before surfacing; permanent ones surface immediately.
    #[error("Payment provider error: {message}")]
    PaymentProvider { message: String, transient: bool },

    #[error("Store error: {0}")]
    Store(String),
}

impl Error {
    pub fn provider_transient(message: impl Into<String>) -> Self {
        Self::PaymentProvider {
            message: message.into(),
            transient: true,
        }
    }

    pub fn provider_permanent(message: impl Into<String>) -> Self {
        Self::PaymentProvider {
            message: message.into(),
            transient: false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
