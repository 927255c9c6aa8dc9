use axum::{extract::State, routing::post, Json, Router};
use serde_json::json;

use farebox_booking::gateway::WebhookOutcome;
use farebox_core::error::ReservationError;
use farebox_core::payment::PaymentNotification;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
/// Inbound payment notifications. A non-2xx response is the signal for the
/// gateway to redeliver; success replays are absorbed by the idempotent
/// confirm path.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<PaymentNotification>,
) -> Result<Json<serde_json::Value>, ApiError> {
    tracing::info!(
        "Received payment webhook for order {}",
        payload.order_code
    );

    match state.webhook.handle(payload).await {
        Ok(WebhookOutcome::Confirmed(reservation)) => {
            state.metrics.reservations_confirmed.inc();
            Ok(Json(json!({
                "status": "CONFIRMED",
                "reservation_id": reservation.id,
            })))
        }
        Ok(WebhookOutcome::Ignored) => Ok(Json(json!({ "status": "IGNORED" }))),
        Err(err) => {
            if matches!(err, ReservationError::PaymentVerification(_)) {
                state.metrics.webhooks_rejected.inc();
            }
            Err(err.into())
        }
    }
}
