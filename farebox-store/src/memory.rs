//! In-memory store backend. Seat mutations are serialized by one
//! `tokio::sync::Mutex` per trip, so concurrent holds over the same trip
//! queue up while different trips proceed in parallel. Lock order is always
//! trip first, then the reservation table, never the reverse.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use farebox_core::error::StoreError;
use farebox_core::repository::{ReservationStore, TripCatalog, TripStore};
use farebox_core::reservation::{
    ConfirmationRecord, PaymentStatus, Reservation, ReservationStatus,
};
use farebox_core::seatmap::{apply_transition, SeatTransition};
use farebox_core::trip::{Trip, TripForBooking};

#[derive(Default)]
struct ReservationTable {
    rows: HashMap<Uuid, Reservation>,
    by_reference: HashMap<String, Uuid>,
    by_ticket_code: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    trips: RwLock<HashMap<Uuid, Arc<Mutex<Trip>>>>,
    reservations: Mutex<ReservationTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TripStore for MemoryStore {
    async fn insert_trip(&self, trip: &Trip) -> Result<(), StoreError> {
        self.trips
            .write()
            .await
            .insert(trip.id, Arc::new(Mutex::new(trip.clone())));
        Ok(())
    }

    async fn get_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StoreError> {
        let handle = self.trips.read().await.get(&trip_id).cloned();
        match handle {
            Some(trip) => Ok(Some(trip.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn list_trip_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.trips.read().await.keys().copied().collect())
    }

    async fn transition_seats(
        &self,
        trip_id: Uuid,
        req: &SeatTransition,
    ) -> Result<(), StoreError> {
        let handle = self
            .trips
            .read()
            .await
            .get(&trip_id)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        let mut trip = handle.lock().await;

        // Owners referenced by the requested seats, resolved while the trip
        // lock is held so liveness cannot change under us.
        let owner_ids: Vec<Uuid> = trip
            .seats
            .iter()
            .filter(|s| req.seat_numbers.contains(&s.seat_number))
            .filter_map(|s| s.reservation_ref)
            .collect();

        let owner_status = {
            let table = self.reservations.lock().await;
            owner_ids
                .iter()
                .filter_map(|id| table.rows.get(id).map(|r| (*id, r.status)))
                .collect::<HashMap<Uuid, ReservationStatus>>()
        };

        apply_transition(&mut trip, req, &owner_status)?;
        Ok(())
    }
}

#[async_trait]
impl TripCatalog for MemoryStore {
    async fn get_trip_for_booking(
        &self,
        trip_id: Uuid,
    ) -> Result<Option<TripForBooking>, StoreError> {
        Ok(self.get_trip(trip_id).await?.map(|t| TripForBooking::from(&t)))
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn insert(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut table = self.reservations.lock().await;
        if let Some(reference) = &reservation.payment_reference {
            table.by_reference.insert(reference.clone(), reservation.id);
        }
        table.rows.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Reservation>, StoreError> {
        Ok(self.reservations.lock().await.rows.get(&id).cloned())
    }

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Reservation>, StoreError> {
        let table = self.reservations.lock().await;
        Ok(table
            .by_reference
            .get(reference)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn find_by_ticket_code(&self, code: &str) -> Result<Option<Reservation>, StoreError> {
        let table = self.reservations.lock().await;
        Ok(table
            .by_ticket_code
            .get(code)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut table = self.reservations.lock().await;
        if let Some(row) = table.rows.remove(&id) {
            if let Some(reference) = &row.payment_reference {
                table.by_reference.remove(reference);
            }
            if let Some(code) = &row.ticket_code {
                table.by_ticket_code.remove(code);
            }
        }
        Ok(())
    }

    async fn mark_confirmed(
        &self,
        id: Uuid,
        record: &ConfirmationRecord,
    ) -> Result<Reservation, StoreError> {
        let mut table = self.reservations.lock().await;
        let current = table.rows.get(&id).ok_or(StoreError::NotFound)?.status;
        if current != ReservationStatus::Held {
            return Err(StoreError::WrongStatus(current));
        }
        if table.by_ticket_code.contains_key(&record.ticket_code) {
            return Err(StoreError::TicketCodeTaken);
        }

        let row = table.rows.get_mut(&id).expect("checked above");
        // The confirmation reference may differ from the one assigned at
        // hold time (manual confirmation); keep the lookup index current.
        let old_reference = row.payment_reference.replace(record.payment_reference.clone());
        row.status = ReservationStatus::Confirmed;
        row.ticket_code = Some(record.ticket_code.clone());
        row.payment_status = PaymentStatus::Paid;
        row.payment_method = Some(record.payment_method.clone());
        row.held_until = None;
        row.updated_at = Utc::now();
        let updated = row.clone();

        table.by_ticket_code.insert(record.ticket_code.clone(), id);
        if let Some(old) = old_reference {
            if old != record.payment_reference {
                table.by_reference.remove(&old);
            }
        }
        table.by_reference.insert(record.payment_reference.clone(), id);

        Ok(updated)
    }

    async fn mark_cancelled(&self, id: Uuid) -> Result<Reservation, StoreError> {
        let mut table = self.reservations.lock().await;
        let row = table.rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !matches!(
            row.status,
            ReservationStatus::Held | ReservationStatus::Confirmed
        ) {
            return Err(StoreError::WrongStatus(row.status));
        }
        row.status = ReservationStatus::Cancelled;
        row.held_until = None;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn mark_expired(&self, id: Uuid) -> Result<Reservation, StoreError> {
        let mut table = self.reservations.lock().await;
        let row = table.rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        if row.status != ReservationStatus::Held {
            return Err(StoreError::WrongStatus(row.status));
        }
        row.status = ReservationStatus::Expired;
        row.held_until = None;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn revert_to_held(
        &self,
        id: Uuid,
        held_until: DateTime<Utc>,
    ) -> Result<Reservation, StoreError> {
        let mut table = self.reservations.lock().await;
        let row = table.rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        if row.status != ReservationStatus::Confirmed {
            return Err(StoreError::WrongStatus(row.status));
        }
        let code = row.ticket_code.take();
        row.status = ReservationStatus::Held;
        row.held_until = Some(held_until);
        row.payment_status = PaymentStatus::Pending;
        row.payment_method = None;
        row.updated_at = Utc::now();
        let updated = row.clone();
        if let Some(code) = code {
            table.by_ticket_code.remove(&code);
        }
        Ok(updated)
    }

    async fn list_expired_holds(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let table = self.reservations.lock().await;
        Ok(table
            .rows
            .values()
            .filter(|r| r.is_hold_lapsed(now))
            .cloned()
            .collect())
    }

    async fn statuses_of(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, ReservationStatus>, StoreError> {
        let table = self.reservations.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| table.rows.get(id).map(|r| (*id, r.status)))
            .collect())
    }
}
