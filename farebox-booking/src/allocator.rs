use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use farebox_core::error::{ReservationError, StoreError};
use farebox_core::repository::TripStore;
use farebox_core::seatmap::SeatTransition;

/// Enforces single-writer-per-seat semantics by funnelling every seat
/// mutation through the store's atomic transition path. The store re-runs
/// the same validation inside its lock; the checks here just fail the
/// obviously malformed requests before any locking happens.
pub struct SeatAllocator {
    trips: Arc<dyn TripStore>,
}

impl SeatAllocator {
    pub fn new(trips: Arc<dyn TripStore>) -> Self {
        Self { trips }
    }

    pub async fn try_transition(
        &self,
        trip_id: Uuid,
        req: SeatTransition,
    ) -> Result<(), ReservationError> {
        if req.seat_numbers.is_empty() {
            return Err(ReservationError::Validation("no seats requested".into()));
        }
        let mut seen = HashSet::new();
        for seat in &req.seat_numbers {
            if !seen.insert(seat.as_str()) {
                return Err(ReservationError::Validation(format!(
                    "seat {seat} requested more than once"
                )));
            }
        }

        self.trips
            .transition_seats(trip_id, &req)
            .await
            .map_err(|err| match err {
                StoreError::NotFound => {
                    ReservationError::NotFound(format!("trip {trip_id} not found"))
                }
                StoreError::Seat(seat_err) => {
                    tracing::debug!(
                        "Seat transition rejected for trip {}: {}",
                        trip_id,
                        seat_err
                    );
                    seat_err.into()
                }
                other => other.into(),
            })
    }
}
