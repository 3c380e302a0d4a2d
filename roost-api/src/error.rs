use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    AuthenticationError(String),
    AuthorizationError(String),
    Core(roost_core::Error),
}

impl From<roost_core::Error> for ApiError {
    fn from(err: roost_core::Error) -> Self {
        Self::Core(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use roost_core::Error as E;

        let (status, error_message) = match self {
            ApiError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Core(err) => match err {
                E::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
                E::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
                E::Conflict(msg) => (StatusCode::CONFLICT, msg),
                E::InvalidState(msg) => (StatusCode::CONFLICT, msg),
                E::InvalidTransition { from, to } => (
                    StatusCode::CONFLICT,
                    format!("invalid transition from {from} to {to}"),
                ),
                E::PaymentProvider { message, .. } => {
                    tracing::error!("payment provider error: {message}");
                    (
                        StatusCode::BAD_GATEWAY,
                        "payment provider unavailable, try again later".to_string(),
                    )
                }
                E::Store(msg) => {
                    tracing::error!("store error: {msg}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal Server Error".to_string(),
                    )
                }
            },
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
