use axum::{
    extract::{Path, State},
    middleware,
    routing::{delete, patch},
    Json, Router,
};
use roost_core::ids::{PlaceId, UserId};
use roost_core::model::{PlaceStatus, UserStatus};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::middleware::auth::admin_auth_middleware;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: String,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CascadeResponse {
    pub places_deactivated: u64,
    pub reservations_cancelled: u64,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/admin/places/{id}/status", patch(update_place_status))
        .route("/v1/admin/users/{id}/status", patch(update_user_status))
        .route("/v1/admin/users/{id}", delete(soft_delete_user))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}

/// PATCH /v1/admin/places/{id}/status
/// Deactivation stops new bookings only; existing reservations stand.
pub async fn update_place_status(
    State(state): State<AppState>,
    Path(id): Path<PlaceId>,
    Json(req): Json<StatusChangeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = PlaceStatus::parse(&req.status)?;
    state
        .propagator
        .set_place_status(id, status, req.reason.as_deref())
        .await?;
    Ok(Json(serde_json::json!({
        "message": format!("place status updated to {}", status.as_str()),
    })))
}

/// PATCH /v1/admin/users/{id}/status
/// Non-active statuses cascade to owned places and pending reservations.
pub async fn update_user_status(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Json(req): Json<StatusChangeRequest>,
) -> Result<Json<CascadeResponse>, ApiError> {
    let status = UserStatus::parse(&req.status)?;
    let outcome = state
        .propagator
        .set_user_status(id, status, req.reason.as_deref())
        .await?;
    Ok(Json(CascadeResponse {
        places_deactivated: outcome.places_deactivated,
        reservations_cancelled: outcome.reservations_cancelled,
    }))
}

/// DELETE /v1/admin/users/{id}
/// Soft delete: same cascade, delete-specific reason.
pub async fn soft_delete_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<CascadeResponse>, ApiError> {
    let outcome = state.propagator.soft_delete_user(id).await?;
    Ok(Json(CascadeResponse {
        places_deactivated: outcome.places_deactivated,
        reservations_cancelled: outcome.reservations_cancelled,
    }))
}
