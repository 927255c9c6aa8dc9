use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use farebox_core::error::ReservationError;

#[derive(Debug)]
pub struct ApiError(pub ReservationError);

impl From<ReservationError> for ApiError {
    fn from(err: ReservationError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self.0 {
            ReservationError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, json!({ "error": msg }))
            }
            ReservationError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            ReservationError::Conflict { seats } if seats.is_empty() => (
                StatusCode::CONFLICT,
                json!({ "error": "resource conflict" }),
            ),
            ReservationError::Conflict { seats } => (
                StatusCode::CONFLICT,
                json!({
                    "error": format!("seats already taken: {}", seats.join(", ")),
                    "seats": seats,
                }),
            ),
            ReservationError::State(msg) => (StatusCode::CONFLICT, json!({ "error": msg })),
            ReservationError::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": msg })),
            ReservationError::PaymentVerification(msg) => {
                // Verification detail stays in the logs, never with the payer.
                tracing::warn!("Payment verification failure: {}", msg);
                (
                    StatusCode::UNAUTHORIZED,
                    json!({ "error": "invalid payment notification" }),
                )
            }
            ReservationError::Internal(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
