use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::NaiveDate;
use roost_core::ids::{PlaceId, ReservationId};
use roost_core::model::{CancelActor, DateRange, Reservation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::auth::{customer_auth_middleware, Claims};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub place_id: PlaceId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct CreateReservationResponse {
    pub reservation_id: ReservationId,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub status: String,
    pub invoice_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub place_owner: bool,
}

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub id: ReservationId,
    pub place_id: PlaceId,
    pub user_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_price: i64,
    pub status: String,
    pub invoice_url: Option<String>,
    pub cancellation_reason: Option<String>,
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            id: r.id,
            place_id: r.place_id,
            user_id: r.user_id.0,
            start_date: r.range.start(),
            end_date: r.range.end(),
            total_price: r.total_price,
            status: r.status.as_str().to_string(),
            invoice_url: r.invoice_url,
            cancellation_reason: r.cancellation_reason,
        }
    }
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", post(create_reservation).get(list_reservations))
        .route("/v1/reservations/resolve", get(resolve_checkout))
        .route(
            "/v1/reservations/{id}",
            get(get_reservation).delete(cancel_reservation),
        )
        .route_layer(middleware::from_fn_with_state(
            state,
            customer_auth_middleware,
        ))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/reservations
/// Create a pending reservation plus its checkout session; returns the
/// provider redirect URL.
pub async fn create_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateReservationRequest>,
) -> Result<(StatusCode, Json<CreateReservationResponse>), ApiError> {
    let user_id = claims.user_id()?;
    let range = DateRange::new(req.start_date, req.end_date)?;

    let begun = state
        .coordinator
        .begin_checkout(user_id, req.place_id, range)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateReservationResponse {
            reservation_id: begun.reservation_id,
            url: begun.checkout_url,
        }),
    ))
}

/// GET /v1/reservations/resolve?session_id=
/// Reconcile a checkout session; idempotent under webhook/redirect
/// redelivery.
pub async fn resolve_checkout(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let outcome = state.coordinator.resolve_checkout(&query.session_id).await?;
    Ok(Json(ResolveResponse {
        status: outcome.status.as_str().to_string(),
        invoice_url: outcome.invoice_url,
    }))
}

/// DELETE /v1/reservations/{id}
/// Cancel a reservation; paid reservations are refunded first.
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<ReservationId>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let caller = claims.user_id()?;
    let reservation = state
        .reservations
        .get_reservation(id)
        .await?
        .ok_or_else(|| roost_core::Error::NotFound(format!("reservation {id}")))?;

    let (actor, reason) = if claims.is_admin() {
        (CancelActor::Admin, "cancelled by admin")
    } else {
        if reservation.user_id != caller {
            return Err(ApiError::AuthorizationError(
                "reservation belongs to another account".to_string(),
            ));
        }
        (CancelActor::Guest, "requested by customer")
    };

    let cancelled = state.coordinator.cancel(id, actor, reason).await?;
    Ok(Json(cancelled.into()))
}

/// GET /v1/reservations?place_owner=true
/// The caller's reservations, or the reservations made against the caller's
/// places.
pub async fn list_reservations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ReservationResponse>>, ApiError> {
    let caller = claims.user_id()?;
    let reservations = if query.place_owner {
        state.reservations.list_for_owner(caller).await?
    } else {
        state.reservations.list_for_user(caller).await?
    };
    Ok(Json(reservations.into_iter().map(Into::into).collect()))
}

/// GET /v1/reservations/{id}
pub async fn get_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<ReservationId>,
) -> Result<Json<ReservationResponse>, ApiError> {
    let caller = claims.user_id()?;
    let reservation = state
        .reservations
        .get_reservation(id)
        .await?
        .ok_or_else(|| roost_core::Error::NotFound(format!("reservation {id}")))?;

    if !claims.is_admin() && reservation.user_id != caller {
        // The place owner may also view bookings on their listing.
        let place = state
            .places
            .get_place(reservation.place_id, true)
            .await?
            .ok_or_else(|| {
                roost_core::Error::NotFound(format!("place {}", reservation.place_id))
            })?;
        if place.owner_id != caller {
            return Err(ApiError::AuthorizationError(
                "reservation belongs to another account".to_string(),
            ));
        }
    }

    Ok(Json(reservation.into()))
}
