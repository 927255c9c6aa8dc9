use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TripStatus {
    Scheduled,
    Departed,
    Arrived,
    Cancelled,
}

impl TripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripStatus::Scheduled => "SCHEDULED",
            TripStatus::Departed => "DEPARTED",
            TripStatus::Arrived => "ARRIVED",
            TripStatus::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    Available,
    Held,
    Booked,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "AVAILABLE",
            SeatStatus::Held => "HELD",
            SeatStatus::Booked => "BOOKED",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub seat_number: String,
    pub status: SeatStatus,
    /// Invariant: Some iff status is HELD or BOOKED.
    pub reservation_ref: Option<Uuid>,
}

impl Seat {
    pub fn available(seat_number: impl Into<String>) -> Self {
        Self {
            seat_number: seat_number.into(),
            status: SeatStatus::Available,
            reservation_ref: None,
        }
    }
}

/// Trip aggregate: the seat map lives inside the trip and is only mutated
/// through the store's atomic transition path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub company_id: Uuid,
    pub status: TripStatus,
    /// Unit price in minor currency units, applied to every seat at hold time.
    pub price: i64,
    pub seats: Vec<Seat>,
}

impl Trip {
    pub fn new(company_id: Uuid, price: i64, seat_numbers: &[&str]) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id,
            status: TripStatus::Scheduled,
            price,
            seats: seat_numbers.iter().map(|s| Seat::available(*s)).collect(),
        }
    }

    pub fn seat(&self, seat_number: &str) -> Option<&Seat> {
        self.seats.iter().find(|s| s.seat_number == seat_number)
    }
}

/// Read-only view handed out to the booking flow at hold time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripForBooking {
    pub trip_id: Uuid,
    pub company_id: Uuid,
    pub status: TripStatus,
    pub price: i64,
    pub seat_numbers: Vec<String>,
}

impl From<&Trip> for TripForBooking {
    fn from(trip: &Trip) -> Self {
        Self {
            trip_id: trip.id,
            company_id: trip.company_id,
            status: trip.status,
            price: trip.price,
            seat_numbers: trip.seats.iter().map(|s| s.seat_number.clone()).collect(),
        }
    }
}
