use crate::reservation::ReservationStatus;
use crate::trip::TripStatus;

/// Per-seat transition failures, produced inside the store's atomic scope.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SeatError {
    #[error("no seats requested")]
    NoSeats,

    #[error("seat {0} requested more than once")]
    DuplicateSeat(String),

    #[error("seat {0} does not exist on this trip")]
    SeatNotFound(String),

    #[error("seats already taken: {}", .seats.join(", "))]
    Conflict { seats: Vec<String> },

    #[error("trip is {0:?}, holds require SCHEDULED")]
    TripNotBookable(TripStatus),
}

/// Storage-layer outcomes. `WrongStatus` carries the current status so the
/// lifecycle can distinguish an idempotent replay from an invalid call.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error(transparent)]
    Seat(#[from] SeatError),

    #[error("reservation is {0:?}")]
    WrongStatus(ReservationStatus),

    #[error("ticket code already in use")]
    TicketCodeTaken,

    #[error("storage failure: {0}")]
    Backend(String),
}

/// Public error taxonomy returned by every lifecycle operation. Conflicts
/// name the offending seats so callers can act on them.
#[derive(Debug, thiserror::Error)]
pub enum ReservationError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("seats already taken: {}", .seats.join(", "))]
    Conflict { seats: Vec<String> },

    #[error("{0}")]
    State(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("payment verification failed: {0}")]
    PaymentVerification(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<SeatError> for ReservationError {
    fn from(err: SeatError) -> Self {
        match err {
            SeatError::NoSeats => ReservationError::Validation("no seats requested".into()),
            SeatError::DuplicateSeat(seat) => {
                ReservationError::Validation(format!("seat {seat} requested more than once"))
            }
            SeatError::SeatNotFound(seat) => {
                ReservationError::NotFound(format!("seat {seat} does not exist on this trip"))
            }
            SeatError::Conflict { seats } => ReservationError::Conflict { seats },
            SeatError::TripNotBookable(status) => {
                ReservationError::State(format!("trip is {}, holds require SCHEDULED", status.as_str()))
            }
        }
    }
}

impl From<StoreError> for ReservationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ReservationError::NotFound("record not found".into()),
            StoreError::Seat(seat_err) => seat_err.into(),
            StoreError::WrongStatus(status) => {
                ReservationError::State(format!("reservation is {}", status.as_str()))
            }
            StoreError::TicketCodeTaken => ReservationError::Conflict { seats: vec![] },
            StoreError::Backend(msg) => ReservationError::Internal(msg),
        }
    }
}
