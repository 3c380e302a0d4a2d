use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

typed_id!(PlaceId);
typed_id!(UserId);
typed_id!(ReservationId);

/// Typed correlation keys embedded in provider metadata, replacing the
/// stringly-typed `reservation_id`/`place_id`/`user_id` fields the provider
/// echoes back on sessions and invoices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationKeys {
    pub reservation_id: ReservationId,
    pub place_id: PlaceId,
    pub user_id: UserId,
}

impl CorrelationKeys {
    pub fn to_metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "reservation_id": self.reservation_id,
            "place_id": self.place_id,
            "user_id": self.user_id,
        })
    }
}
