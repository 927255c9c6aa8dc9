use axum::extract::State;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

use crate::state::AppState;

pub struct Metrics {
    registry: Registry,
    pub holds_created: IntCounter,
    pub seat_conflicts: IntCounter,
    pub reservations_confirmed: IntCounter,
    pub reservations_cancelled: IntCounter,
    pub webhooks_rejected: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let holds_created =
            IntCounter::new("farebox_holds_created_total", "Seat holds created").unwrap();
        let seat_conflicts =
            IntCounter::new("farebox_seat_conflicts_total", "Hold attempts lost to a conflict")
                .unwrap();
        let reservations_confirmed =
            IntCounter::new("farebox_reservations_confirmed_total", "Reservations confirmed")
                .unwrap();
        let reservations_cancelled =
            IntCounter::new("farebox_reservations_cancelled_total", "Reservations cancelled")
                .unwrap();
        let webhooks_rejected = IntCounter::new(
            "farebox_webhooks_rejected_total",
            "Payment webhooks rejected by signature verification",
        )
        .unwrap();

        registry.register(Box::new(holds_created.clone())).unwrap();
        registry.register(Box::new(seat_conflicts.clone())).unwrap();
        registry
            .register(Box::new(reservations_confirmed.clone()))
            .unwrap();
        registry
            .register(Box::new(reservations_cancelled.clone()))
            .unwrap();
        registry
            .register(Box::new(webhooks_rejected.clone()))
            .unwrap();

        Self {
            registry,
            holds_created,
            seat_conflicts,
            reservations_confirmed,
            reservations_cancelled,
            webhooks_rejected,
        }
    }

    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(err) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", err);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// GET /v1/metrics
pub async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.export()
}
