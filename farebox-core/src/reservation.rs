use chrono::{DateTime, Utc};
use farebox_shared::pii::Masked;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Held,
    Confirmed,
    Cancelled,
    Expired,
}

impl ReservationStatus {
    /// CONFIRMED, CANCELLED and EXPIRED admit no further transition.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Held)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Held => "HELD",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
            ReservationStatus::Expired => "EXPIRED",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: String,
    pub phone: String,
    pub email: Masked<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub trip_id: Uuid,
    /// None for guest checkouts.
    pub user_id: Option<String>,
    pub status: ReservationStatus,
    pub seat_numbers: Vec<String>,
    /// price * seat count, captured at hold time.
    pub total_amount: i64,
    /// Some only while HELD; cleared at confirmation.
    pub held_until: Option<DateTime<Utc>>,
    pub payment_status: PaymentStatus,
    /// Gateway order code, assigned at hold creation.
    pub payment_reference: Option<String>,
    pub payment_method: Option<String>,
    /// Assigned exactly once, at confirmation.
    pub ticket_code: Option<String>,
    pub contact: ContactInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_hold_lapsed(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, ReservationStatus::Held)
            && self.held_until.map(|t| t <= now).unwrap_or(false)
    }
}

/// Fields applied together with the HELD -> CONFIRMED status transition.
#[derive(Debug, Clone)]
pub struct ConfirmationRecord {
    pub ticket_code: String,
    pub payment_method: String,
    pub payment_reference: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!ReservationStatus::Held.is_terminal());
        assert!(ReservationStatus::Confirmed.is_terminal());
        assert!(ReservationStatus::Cancelled.is_terminal());
        assert!(ReservationStatus::Expired.is_terminal());
    }

    #[test]
    fn hold_lapse_check() {
        let now = Utc::now();
        let mut reservation = Reservation {
            id: Uuid::new_v4(),
            trip_id: Uuid::new_v4(),
            user_id: None,
            status: ReservationStatus::Held,
            seat_numbers: vec!["A1".into()],
            total_amount: 100_000,
            held_until: Some(now - chrono::Duration::minutes(1)),
            payment_status: PaymentStatus::Pending,
            payment_reference: None,
            payment_method: None,
            ticket_code: None,
            contact: ContactInfo {
                name: "Linh".into(),
                phone: "0900000001".into(),
                email: Masked("linh@example.com".into()),
            },
            created_at: now,
            updated_at: now,
        };
        assert!(reservation.is_hold_lapsed(now));

        reservation.held_until = Some(now + chrono::Duration::minutes(15));
        assert!(!reservation.is_hold_lapsed(now));

        reservation.status = ReservationStatus::Confirmed;
        reservation.held_until = None;
        assert!(!reservation.is_hold_lapsed(now));
    }
}
