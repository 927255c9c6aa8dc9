pub mod allocator;
pub mod gateway;
pub mod lifecycle;
pub mod sweeper;
pub mod ticket;

pub use allocator::SeatAllocator;
pub use gateway::{PaymentWebhookAdapter, WebhookOutcome, WebhookVerifier};
pub use lifecycle::{CreateHoldRequest, ExpirySummary, ReservationLifecycle};
pub use sweeper::ExpirySweeper;
