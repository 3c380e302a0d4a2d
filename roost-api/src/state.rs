use roost_booking::{CheckoutCoordinator, Janitor, Reservations, StatusPropagator};
use roost_core::repository::{PlaceStore, ReservationStore, UserStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub places: Arc<dyn PlaceStore>,
    pub users: Arc<dyn UserStore>,
    pub reservations: Arc<dyn ReservationStore>,
    pub lifecycle: Arc<Reservations>,
    pub coordinator: Arc<CheckoutCoordinator>,
    pub propagator: Arc<StatusPropagator>,
    pub janitor: Arc<Janitor>,
    pub auth: AuthConfig,
}
