use serde::{Deserialize, Serialize};

/// Gateway-reported payment outcome for a notification. Anything other than
/// `Paid` is logged and ignored by the adapter; the gateway is the source of
/// truth for payment outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Paid,
    Failed,
    Cancelled,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Paid => "PAID",
            NotificationStatus::Failed => "FAILED",
            NotificationStatus::Cancelled => "CANCELLED",
        }
    }
}

/// Inbound payment notification as delivered by the gateway webhook. Only
/// the gateway adapter parses this; the signature must be verified before
/// any other field is trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub order_code: String,
    pub amount: i64,
    pub status: NotificationStatus,
    pub signature: String,
}
