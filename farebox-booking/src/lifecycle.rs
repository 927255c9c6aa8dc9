//! Reservation lifecycle orchestration: HELD -> {CONFIRMED, CANCELLED,
//! EXPIRED}. The reservation-status compare-and-set in the store is the
//! serialization point between racing confirm, cancel and expiry; only the
//! CAS winner touches seats afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use farebox_core::error::{ReservationError, StoreError};
use farebox_core::repository::{
    NotificationDispatcher, ReservationStore, TripCatalog, TripStore,
};
use farebox_core::reservation::{
    ConfirmationRecord, ContactInfo, PaymentStatus, Reservation, ReservationStatus,
};
use farebox_core::seatmap::SeatTransition;
use farebox_core::trip::{SeatStatus, TripStatus};
use farebox_shared::models::events::{
    ReservationCancelledEvent, ReservationConfirmedEvent, TOPIC_RESERVATION_CANCELLED,
    TOPIC_RESERVATION_CONFIRMED,
};
use farebox_store::app_config::BookingRules;

use crate::allocator::SeatAllocator;
use crate::ticket;

/// Collision retries before the confirmation gives up. 36^8 codes make even
/// one retry rare; the bound exists so a corrupted store cannot spin forever.
const MAX_TICKET_ATTEMPTS: u32 = 32;

#[derive(Debug, Clone)]
pub struct CreateHoldRequest {
    pub trip_id: Uuid,
    pub seat_numbers: Vec<String>,
    pub contact: ContactInfo,
    /// Resolved user id; None for guest checkouts.
    pub requester: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ExpirySummary {
    pub expired: usize,
    pub failed: usize,
}

pub struct ReservationLifecycle {
    catalog: Arc<dyn TripCatalog>,
    trips: Arc<dyn TripStore>,
    allocator: SeatAllocator,
    reservations: Arc<dyn ReservationStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    rules: BookingRules,
}

impl ReservationLifecycle {
    pub fn new(
        catalog: Arc<dyn TripCatalog>,
        trips: Arc<dyn TripStore>,
        reservations: Arc<dyn ReservationStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        rules: BookingRules,
    ) -> Self {
        Self {
            catalog,
            allocator: SeatAllocator::new(trips.clone()),
            trips,
            reservations,
            dispatcher,
            rules,
        }
    }

    pub fn rules(&self) -> &BookingRules {
        &self.rules
    }

    /// Creates a time-bounded hold on the requested seats.
    ///
    /// The reservation row is persisted before seat allocation so that the
    /// allocator's lazy-conflict check can always discover the owner; if
    /// allocation fails the row is deleted again.
    pub async fn create_hold(
        &self,
        req: CreateHoldRequest,
    ) -> Result<Reservation, ReservationError> {
        // 1. Trip must exist and still be open for sale.
        let trip = self
            .catalog
            .get_trip_for_booking(req.trip_id)
            .await
            .map_err(ReservationError::from)?
            .ok_or_else(|| ReservationError::NotFound(format!("trip {} not found", req.trip_id)))?;

        if trip.status != TripStatus::Scheduled {
            return Err(ReservationError::State(format!(
                "trip is {}, holds require SCHEDULED",
                trip.status.as_str()
            )));
        }

        // 2. Request shape: non-empty, no duplicates, seats exist.
        if req.seat_numbers.is_empty() {
            return Err(ReservationError::Validation("no seats requested".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for seat in &req.seat_numbers {
            if !seen.insert(seat.as_str()) {
                return Err(ReservationError::Validation(format!(
                    "seat {seat} requested more than once"
                )));
            }
            if !trip.seat_numbers.iter().any(|s| s == seat) {
                return Err(ReservationError::NotFound(format!(
                    "seat {seat} does not exist on this trip"
                )));
            }
        }

        // 3. Price is captured now; the reservation total never changes.
        let total_amount = trip.price * req.seat_numbers.len() as i64;
        let now = Utc::now();
        let reservation_id = Uuid::new_v4();
        let reservation = Reservation {
            id: reservation_id,
            trip_id: req.trip_id,
            user_id: req.requester,
            status: ReservationStatus::Held,
            seat_numbers: req.seat_numbers.clone(),
            total_amount,
            held_until: Some(now + chrono::Duration::minutes(self.rules.hold_duration_minutes)),
            payment_status: PaymentStatus::Pending,
            // Order code handed to the payment gateway; unique because the
            // reservation id is.
            payment_reference: Some(reservation_id.simple().to_string()),
            payment_method: None,
            ticket_code: None,
            contact: req.contact,
            created_at: now,
            updated_at: now,
        };

        // 4. Persist first, allocate second.
        self.reservations
            .insert(&reservation)
            .await
            .map_err(ReservationError::from)?;

        let transition = SeatTransition::hold(req.seat_numbers.clone(), reservation_id);
        if let Err(err) = self.allocator.try_transition(req.trip_id, transition).await {
            // Compensating rollback: no reservation may outlive a failed
            // allocation.
            if let Err(delete_err) = self.reservations.delete(reservation_id).await {
                tracing::error!(
                    "Failed to roll back reservation {} after seat conflict: {}",
                    reservation_id,
                    delete_err
                );
            }
            return Err(err);
        }

        tracing::info!(
            "Hold {} created on trip {} for seats [{}]",
            reservation_id,
            req.trip_id,
            reservation.seat_numbers.join(", ")
        );
        Ok(reservation)
    }

    /// Confirms a held reservation after payment. Idempotent: repeating the
    /// call with the same payment reference returns the existing result
    /// without touching seats or the ticket code again.
    pub async fn confirm(
        &self,
        reservation_id: Uuid,
        paid_amount: i64,
        payment_method: &str,
        payment_reference: &str,
    ) -> Result<Reservation, ReservationError> {
        let reservation = self
            .reservations
            .get(reservation_id)
            .await
            .map_err(ReservationError::from)?
            .ok_or_else(|| {
                ReservationError::NotFound(format!("reservation {reservation_id} not found"))
            })?;

        match reservation.status {
            ReservationStatus::Confirmed => {
                return self.replayed_confirmation(reservation, payment_reference)
            }
            ReservationStatus::Cancelled | ReservationStatus::Expired => {
                return Err(ReservationError::State(format!(
                    "reservation is {}",
                    reservation.status.as_str()
                )))
            }
            ReservationStatus::Held => {}
        }

        let now = Utc::now();
        if reservation.is_hold_lapsed(now) {
            // The hold lapsed before payment arrived; its seats may already
            // be someone else's. Expire it rather than honor the payment.
            self.expire_one(&reservation).await;
            return Err(ReservationError::State("hold has expired".into()));
        }

        if paid_amount < reservation.total_amount {
            return Err(ReservationError::Validation(format!(
                "insufficient payment: {} < {}",
                paid_amount, reservation.total_amount
            )));
        }

        // Win the status CAS before touching seats; the ticket code is
        // assigned in the same atomic step, regenerated on collision.
        let held_until = reservation.held_until;
        let confirmed = self
            .confirm_with_unique_code(reservation_id, payment_method, payment_reference)
            .await?;

        let confirmed = match confirmed {
            ConfirmAttempt::Won(updated) => updated,
            ConfirmAttempt::LostToConfirm => {
                let current = self
                    .reservations
                    .get(reservation_id)
                    .await
                    .map_err(ReservationError::from)?
                    .ok_or_else(|| {
                        ReservationError::NotFound(format!(
                            "reservation {reservation_id} not found"
                        ))
                    })?;
                return self.replayed_confirmation(current, payment_reference);
            }
        };

        // Only the CAS winner books the seats.
        let transition = SeatTransition::book(confirmed.seat_numbers.clone(), reservation_id);
        if let Err(err) = self
            .allocator
            .try_transition(confirmed.trip_id, transition)
            .await
        {
            tracing::error!(
                "Seat booking failed after confirming reservation {}: {}",
                reservation_id,
                err
            );
            if let Some(held_until) = held_until {
                if let Err(revert_err) = self
                    .reservations
                    .revert_to_held(reservation_id, held_until)
                    .await
                {
                    tracing::error!(
                        "Failed to revert reservation {} to HELD: {}",
                        reservation_id,
                        revert_err
                    );
                }
            }
            return Err(ReservationError::Internal(
                "seat booking failed during confirmation".into(),
            ));
        }

        self.emit_confirmed(&confirmed).await;
        tracing::info!(
            "Reservation {} confirmed, ticket {}",
            reservation_id,
            confirmed.ticket_code.as_deref().unwrap_or("-")
        );
        Ok(confirmed)
    }

    /// Cancels a held or confirmed reservation and releases its seats.
    /// Cancelling an already-CANCELLED or EXPIRED reservation is a no-op
    /// success.
    pub async fn cancel(
        &self,
        reservation_id: Uuid,
        requester: Option<&str>,
    ) -> Result<Reservation, ReservationError> {
        let reservation = self
            .reservations
            .get(reservation_id)
            .await
            .map_err(ReservationError::from)?
            .ok_or_else(|| {
                ReservationError::NotFound(format!("reservation {reservation_id} not found"))
            })?;

        if matches!(
            reservation.status,
            ReservationStatus::Cancelled | ReservationStatus::Expired
        ) {
            return Ok(reservation);
        }

        if let (Some(requester), Some(owner)) = (requester, reservation.user_id.as_deref()) {
            if requester != owner {
                return Err(ReservationError::Forbidden(
                    "reservation belongs to a different user".into(),
                ));
            }
        }

        let previous_status = reservation.status;
        let cancelled = match self.reservations.mark_cancelled(reservation_id).await {
            Ok(updated) => updated,
            // Lost the CAS to a concurrent cancel or expiry; both leave the
            // reservation terminal, which is what this caller asked for.
            Err(StoreError::WrongStatus(status)) if status.is_terminal() => {
                return self
                    .reservations
                    .get(reservation_id)
                    .await
                    .map_err(ReservationError::from)?
                    .ok_or_else(|| {
                        ReservationError::NotFound(format!(
                            "reservation {reservation_id} not found"
                        ))
                    });
            }
            Err(err) => return Err(err.into()),
        };

        self.release_seats(&cancelled).await?;
        self.emit_cancelled(&cancelled, previous_status).await;
        tracing::info!("Reservation {} cancelled", reservation_id);
        Ok(cancelled)
    }

    /// Releases every hold whose expiry has passed. Each reservation is
    /// processed in its own unit under its own timeout; one failure never
    /// blocks the rest.
    pub async fn expire_stale_holds(&self, now: DateTime<Utc>) -> ExpirySummary {
        let stale = match self.reservations.list_expired_holds(now).await {
            Ok(stale) => stale,
            Err(err) => {
                tracing::error!("Failed to list stale holds: {}", err);
                return ExpirySummary::default();
            }
        };

        let item_timeout = Duration::from_millis(self.rules.expiry_item_timeout_ms);
        let mut summary = ExpirySummary::default();
        for reservation in stale {
            let id = reservation.id;
            match tokio::time::timeout(item_timeout, self.expire_one(&reservation)).await {
                Ok(true) => summary.expired += 1,
                Ok(false) => summary.failed += 1,
                Err(_) => {
                    tracing::warn!("Timed out expiring reservation {}", id);
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// Expires a single hold: status CAS first, seat release second. Returns
    /// false when the work is left for a later pass.
    async fn expire_one(&self, reservation: &Reservation) -> bool {
        match self.reservations.mark_expired(reservation.id).await {
            Ok(_) => {}
            // Confirm or cancel won the race; nothing left to do here.
            Err(StoreError::WrongStatus(_)) | Err(StoreError::NotFound) => return true,
            Err(err) => {
                tracing::error!("Failed to expire reservation {}: {}", reservation.id, err);
                return false;
            }
        }

        tracing::info!("Hold {} expired, releasing seats", reservation.id);
        self.release_seats(reservation).await.is_ok()
    }

    /// Repairs HELD seats whose owner is not itself HELD: seats of missing,
    /// EXPIRED or CANCELLED reservations go back to AVAILABLE; seats of a
    /// CONFIRMED reservation (a confirmation that crashed between the status
    /// change and the booking transition) are completed to BOOKED. A
    /// compensating control for crash windows; the allocator's lazy check
    /// already keeps abandoned seats sellable in the meantime.
    pub async fn reconcile_trip(&self, trip_id: Uuid) -> Result<usize, ReservationError> {
        let trip = self
            .trips
            .get_trip(trip_id)
            .await
            .map_err(ReservationError::from)?
            .ok_or_else(|| ReservationError::NotFound(format!("trip {trip_id} not found")))?;

        let mut held_by: HashMap<Uuid, Vec<String>> = HashMap::new();
        for seat in &trip.seats {
            if seat.status == SeatStatus::Held {
                if let Some(owner) = seat.reservation_ref {
                    held_by.entry(owner).or_default().push(seat.seat_number.clone());
                }
            }
        }
        if held_by.is_empty() {
            return Ok(0);
        }

        let owner_ids: Vec<Uuid> = held_by.keys().copied().collect();
        let statuses = self
            .reservations
            .statuses_of(&owner_ids)
            .await
            .map_err(ReservationError::from)?;

        let mut repaired = 0;
        for (owner, seats) in held_by {
            let to = match statuses.get(&owner) {
                // Healthy hold, nothing to repair.
                Some(ReservationStatus::Held) => continue,
                // Crashed confirmation: finish the seat booking.
                Some(ReservationStatus::Confirmed) => SeatStatus::Booked,
                // Missing or EXPIRED/CANCELLED owner: free the seats.
                _ => SeatStatus::Available,
            };
            let count = seats.len();
            let transition = SeatTransition {
                seat_numbers: seats,
                from_allowed: vec![SeatStatus::Held],
                to,
                reservation_id: owner,
            };
            match self.allocator.try_transition(trip_id, transition).await {
                Ok(()) => {
                    tracing::info!(
                        "Reconciled {} seat(s) of reservation {} on trip {} to {}",
                        count,
                        owner,
                        trip_id,
                        to.as_str()
                    );
                    repaired += count;
                }
                // The seats changed hands between the snapshot and the
                // repair; the next pass will see the new state.
                Err(ReservationError::Conflict { .. }) => {}
                Err(err) => {
                    tracing::warn!(
                        "Reconcile of reservation {} on trip {} failed: {}",
                        owner,
                        trip_id,
                        err
                    );
                }
            }
        }
        Ok(repaired)
    }

    pub async fn reconcile_all(&self) -> usize {
        let trip_ids = match self.trips.list_trip_ids().await {
            Ok(ids) => ids,
            Err(err) => {
                tracing::error!("Failed to list trips for reconciliation: {}", err);
                return 0;
            }
        };
        let mut repaired = 0;
        for trip_id in trip_ids {
            match self.reconcile_trip(trip_id).await {
                Ok(count) => repaired += count,
                Err(err) => tracing::warn!("Reconcile of trip {} failed: {}", trip_id, err),
            }
        }
        repaired
    }

    fn replayed_confirmation(
        &self,
        reservation: Reservation,
        payment_reference: &str,
    ) -> Result<Reservation, ReservationError> {
        if reservation.payment_reference.as_deref() == Some(payment_reference) {
            tracing::debug!(
                "Replayed confirmation for reservation {}, returning existing result",
                reservation.id
            );
            Ok(reservation)
        } else {
            Err(ReservationError::State(
                "reservation already confirmed with a different payment reference".into(),
            ))
        }
    }

    async fn confirm_with_unique_code(
        &self,
        reservation_id: Uuid,
        payment_method: &str,
        payment_reference: &str,
    ) -> Result<ConfirmAttempt, ReservationError> {
        for _ in 0..MAX_TICKET_ATTEMPTS {
            let record = ConfirmationRecord {
                ticket_code: ticket::generate(self.rules.ticket_code_length),
                payment_method: payment_method.to_string(),
                payment_reference: payment_reference.to_string(),
            };
            match self.reservations.mark_confirmed(reservation_id, &record).await {
                Ok(updated) => return Ok(ConfirmAttempt::Won(updated)),
                Err(StoreError::TicketCodeTaken) => continue,
                Err(StoreError::WrongStatus(ReservationStatus::Confirmed)) => {
                    return Ok(ConfirmAttempt::LostToConfirm)
                }
                Err(StoreError::WrongStatus(status)) => {
                    return Err(ReservationError::State(format!(
                        "reservation is {}",
                        status.as_str()
                    )))
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ReservationError::Conflict { seats: vec![] })
    }

    /// Returns the reservation's seats to the open pool. A conflict means a
    /// seat was already lazily re-held by someone else, which is fine; any
    /// leftovers are terminal-owned and the reconcile pass picks them up.
    async fn release_seats(&self, reservation: &Reservation) -> Result<(), ReservationError> {
        let transition = SeatTransition::release(reservation.seat_numbers.clone(), reservation.id);
        match self
            .allocator
            .try_transition(reservation.trip_id, transition)
            .await
        {
            Ok(()) => Ok(()),
            Err(ReservationError::Conflict { seats }) => {
                tracing::debug!(
                    "Release for reservation {} skipped re-held seats [{}]",
                    reservation.id,
                    seats.join(", ")
                );
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    "Failed to release seats of reservation {}: {}",
                    reservation.id,
                    err
                );
                Err(err)
            }
        }
    }

    async fn emit_confirmed(&self, reservation: &Reservation) {
        let event = ReservationConfirmedEvent {
            reservation_id: reservation.id,
            trip_id: reservation.trip_id,
            user_id: reservation.user_id.clone(),
            seat_numbers: reservation.seat_numbers.clone(),
            total_amount: reservation.total_amount,
            ticket_code: reservation.ticket_code.clone().unwrap_or_default(),
            payment_reference: reservation.payment_reference.clone(),
            timestamp: Utc::now().timestamp(),
        };
        self.emit(TOPIC_RESERVATION_CONFIRMED, reservation.id, &event).await;
    }

    async fn emit_cancelled(&self, reservation: &Reservation, previous: ReservationStatus) {
        let event = ReservationCancelledEvent {
            reservation_id: reservation.id,
            trip_id: reservation.trip_id,
            user_id: reservation.user_id.clone(),
            seat_numbers: reservation.seat_numbers.clone(),
            previous_status: previous.as_str().to_string(),
            timestamp: Utc::now().timestamp(),
        };
        self.emit(TOPIC_RESERVATION_CANCELLED, reservation.id, &event).await;
    }

    /// Dispatch happens after the state change committed; a dispatcher
    /// failure must never roll a reservation back.
    async fn emit<E: serde::Serialize>(&self, topic: &str, key: Uuid, event: &E) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!("Failed to serialize {} event: {}", topic, err);
                return;
            }
        };
        if let Err(err) = self
            .dispatcher
            .publish(topic, &key.to_string(), &payload)
            .await
        {
            tracing::warn!("Failed to dispatch {} for {}: {}", topic, key, err);
        }
    }
}

enum ConfirmAttempt {
    Won(Reservation),
    LostToConfirm,
}
