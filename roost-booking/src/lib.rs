pub mod availability;
pub mod cascade;
pub mod janitor;
pub mod lifecycle;
pub mod payments;

pub use availability::AvailabilityEngine;
pub use cascade::StatusPropagator;
pub use janitor::Janitor;
pub use lifecycle::Reservations;
pub use payments::{CheckoutCoordinator, MockGateway, RetryPolicy};
