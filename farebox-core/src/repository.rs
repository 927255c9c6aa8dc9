use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::reservation::{ConfirmationRecord, Reservation, ReservationStatus};
use crate::seatmap::SeatTransition;
use crate::trip::{Trip, TripForBooking};

/// Atomic access to trip aggregates. `transition_seats` is the only write
/// path for seat statuses; implementations must serialize it per trip
/// (partition lock or row-locked transaction).
#[async_trait]
pub trait TripStore: Send + Sync {
    async fn insert_trip(&self, trip: &Trip) -> Result<(), StoreError>;

    async fn get_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StoreError>;

    async fn list_trip_ids(&self) -> Result<Vec<Uuid>, StoreError>;

    /// Applies `seatmap::apply_transition` under the trip's atomic scope,
    /// resolving owner liveness from the reservation store in the same scope.
    async fn transition_seats(&self, trip_id: Uuid, req: &SeatTransition)
        -> Result<(), StoreError>;
}

/// Persistence for reservation rows. Status transitions are compare-and-set
/// on the expected current status; on mismatch they return
/// `StoreError::WrongStatus` carrying what the row actually is, so racing
/// confirm / cancel / expiry resolve deterministically.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn insert(&self, reservation: &Reservation) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Reservation>, StoreError>;

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Reservation>, StoreError>;

    async fn find_by_ticket_code(&self, code: &str) -> Result<Option<Reservation>, StoreError>;

    /// Removes a reservation row entirely; used only to roll back a hold
    /// whose seat allocation failed.
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// HELD -> CONFIRMED. Enforces ticket-code uniqueness in the same atomic
    /// step (`TicketCodeTaken` when the generated code is already in use).
    async fn mark_confirmed(
        &self,
        id: Uuid,
        record: &ConfirmationRecord,
    ) -> Result<Reservation, StoreError>;

    /// {HELD, CONFIRMED} -> CANCELLED.
    async fn mark_cancelled(&self, id: Uuid) -> Result<Reservation, StoreError>;

    /// HELD -> EXPIRED.
    async fn mark_expired(&self, id: Uuid) -> Result<Reservation, StoreError>;

    /// Rolls a failed confirmation back to HELD, restoring the original
    /// expiry timestamp.
    async fn revert_to_held(
        &self,
        id: Uuid,
        held_until: DateTime<Utc>,
    ) -> Result<Reservation, StoreError>;

    async fn list_expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, StoreError>;

    /// Statuses of the given reservations; absent entries mean the row no
    /// longer exists. Used by trip stores for lazy conflict resolution.
    async fn statuses_of(
        &self,
        ids: &[Uuid],
    ) -> Result<std::collections::HashMap<Uuid, ReservationStatus>, StoreError>;
}

/// Read-only trip data handed to the booking flow at hold time. The core
/// never mutates trip scheduling fields.
#[async_trait]
pub trait TripCatalog: Send + Sync {
    async fn get_trip_for_booking(
        &self,
        trip_id: Uuid,
    ) -> Result<Option<TripForBooking>, StoreError>;
}

/// Outbound domain events. Dispatch failures must never roll back the
/// reservation transaction; callers log and move on.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
