use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use roost_core::ids::PlaceId;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub place_id: PlaceId,
    pub blocked_dates: Vec<NaiveDate>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/places/{id}/availability", get(availability))
}

/// GET /v1/places/{id}/availability
/// Days blocked by pending or paid reservations, for calendar disabling.
/// Public: guests consult availability before authenticating.
pub async fn availability(
    State(state): State<AppState>,
    Path(id): Path<PlaceId>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    // A place keeps answering availability while inactive; only booking is
    // gated on active status.
    state
        .places
        .get_place(id, true)
        .await?
        .ok_or_else(|| roost_core::Error::NotFound(format!("place {id}")))?;

    let blocked = state.lifecycle.availability().blocked_dates(id).await?;
    Ok(Json(AvailabilityResponse {
        place_id: id,
        blocked_dates: blocked.into_iter().collect(),
    }))
}
