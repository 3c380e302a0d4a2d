pub mod app_config;
pub mod database;
pub mod memory;
pub mod place_repo;
pub mod reservation_repo;
pub mod user_repo;

pub use database::DbClient;
pub use memory::MemoryStore;
pub use place_repo::PgPlaceStore;
pub use reservation_repo::PgReservationStore;
pub use user_repo::PgUserStore;

use roost_core::Error;

/// Postgres error code for exclusion-constraint violations. The reservations
/// table carries an exclusion constraint over (place_id, date range) for
/// blocking statuses, so a racing insert that slipped past the availability
/// check loses here and surfaces as a Conflict.
const EXCLUSION_VIOLATION: &str = "23P01";

pub(crate) fn map_db_err(err: sqlx::Error) -> Error {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some(EXCLUSION_VIOLATION) {
            return Error::Conflict("an overlapping reservation already exists".to_string());
        }
    }
    Error::Store(err.to_string())
}
