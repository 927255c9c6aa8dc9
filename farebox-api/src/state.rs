use std::sync::Arc;

use farebox_booking::gateway::PaymentWebhookAdapter;
use farebox_booking::lifecycle::ReservationLifecycle;
use farebox_core::identity::RequesterDirectory;
use farebox_core::repository::ReservationStore;
use farebox_store::RedisClient;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<ReservationLifecycle>,
    pub reservations: Arc<dyn ReservationStore>,
    pub webhook: Arc<PaymentWebhookAdapter>,
    pub requester: Arc<dyn RequesterDirectory>,
    /// None disables rate limiting (tests, single-node development).
    pub redis: Option<Arc<RedisClient>>,
    pub metrics: Arc<Metrics>,
}
