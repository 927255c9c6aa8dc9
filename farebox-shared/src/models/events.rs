use uuid::Uuid;

pub const TOPIC_RESERVATION_CONFIRMED: &str = "reservation.confirmed";
pub const TOPIC_RESERVATION_CANCELLED: &str = "reservation.cancelled";

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReservationConfirmedEvent {
    pub reservation_id: Uuid,
    pub trip_id: Uuid,
    pub user_id: Option<String>,
    pub seat_numbers: Vec<String>,
    pub total_amount: i64,
    pub ticket_code: String,
    pub payment_reference: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReservationCancelledEvent {
    pub reservation_id: Uuid,
    pub trip_id: Uuid,
    pub user_id: Option<String>,
    pub seat_numbers: Vec<String>,
    /// Status the reservation held before cancellation (HELD or CONFIRMED).
    pub previous_status: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReservationExpiredEvent {
    pub reservation_id: Uuid,
    pub trip_id: Uuid,
    pub seat_numbers: Vec<String>,
    pub timestamp: i64,
}
