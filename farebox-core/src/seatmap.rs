//! Pure seat-status transition planning. Every store backend runs this
//! inside its own atomic scope (per-trip lock or database transaction), so
//! the single-writer-per-seat rule holds regardless of backend.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::error::SeatError;
use crate::reservation::ReservationStatus;
use crate::trip::{SeatStatus, Trip};

#[derive(Debug, Clone)]
pub struct SeatTransition {
    pub seat_numbers: Vec<String>,
    pub from_allowed: Vec<SeatStatus>,
    pub to: SeatStatus,
    pub reservation_id: Uuid,
}

impl SeatTransition {
    pub fn hold(seat_numbers: Vec<String>, reservation_id: Uuid) -> Self {
        Self {
            seat_numbers,
            from_allowed: vec![SeatStatus::Available],
            to: SeatStatus::Held,
            reservation_id,
        }
    }

    pub fn book(seat_numbers: Vec<String>, reservation_id: Uuid) -> Self {
        Self {
            seat_numbers,
            from_allowed: vec![SeatStatus::Held],
            to: SeatStatus::Booked,
            reservation_id,
        }
    }

    pub fn release(seat_numbers: Vec<String>, reservation_id: Uuid) -> Self {
        Self {
            seat_numbers,
            from_allowed: vec![SeatStatus::Held, SeatStatus::Booked],
            to: SeatStatus::Available,
            reservation_id,
        }
    }
}

/// Applies a transition to the trip's seat map, all-or-nothing.
///
/// `owner_status` maps reservation ids referenced by the seat map to their
/// current status; a referenced reservation absent from the map is treated
/// as deleted. A HELD seat whose owner is deleted, EXPIRED or CANCELLED is
/// eligible as if AVAILABLE (lazy conflict resolution): reservation
/// existence is the source of truth, not seat status alone.
pub fn apply_transition(
    trip: &mut Trip,
    req: &SeatTransition,
    owner_status: &HashMap<Uuid, ReservationStatus>,
) -> Result<(), SeatError> {
    if req.seat_numbers.is_empty() {
        return Err(SeatError::NoSeats);
    }

    let mut seen = HashSet::new();
    for seat_number in &req.seat_numbers {
        if !seen.insert(seat_number.as_str()) {
            return Err(SeatError::DuplicateSeat(seat_number.clone()));
        }
    }

    if req.to == SeatStatus::Held && trip.status != crate::trip::TripStatus::Scheduled {
        return Err(SeatError::TripNotBookable(trip.status));
    }

    // Validate every seat before mutating any.
    let mut indices = Vec::with_capacity(req.seat_numbers.len());
    let mut conflicts = Vec::new();
    for seat_number in &req.seat_numbers {
        let idx = trip
            .seats
            .iter()
            .position(|s| &s.seat_number == seat_number)
            .ok_or_else(|| SeatError::SeatNotFound(seat_number.clone()))?;
        let seat = &trip.seats[idx];

        if !seat_eligible(seat.status, seat.reservation_ref, req, owner_status) {
            conflicts.push(seat_number.clone());
        }
        indices.push(idx);
    }

    if !conflicts.is_empty() {
        return Err(SeatError::Conflict { seats: conflicts });
    }

    for idx in indices {
        let seat = &mut trip.seats[idx];
        seat.status = req.to;
        seat.reservation_ref = match req.to {
            SeatStatus::Available => None,
            _ => Some(req.reservation_id),
        };
    }
    Ok(())
}

fn seat_eligible(
    status: SeatStatus,
    reservation_ref: Option<Uuid>,
    req: &SeatTransition,
    owner_status: &HashMap<Uuid, ReservationStatus>,
) -> bool {
    // A seat committed to a different live reservation is never eligible,
    // not even for release (no confused-deputy release of a foreign hold).
    // Live means HELD or CONFIRMED: a HELD seat whose owner is CONFIRMED is
    // mid-confirmation and about to become BOOKED, not abandoned.
    if let Some(owner) = reservation_ref {
        if owner != req.reservation_id {
            let dead = match owner_status.get(&owner) {
                None => true,
                Some(ReservationStatus::Expired) | Some(ReservationStatus::Cancelled) => true,
                Some(_) => false,
            };
            if !dead {
                return false;
            }
            // Dead owner: a HELD seat is effectively AVAILABLE for a new
            // hold. BOOKED seats are never lazily reclaimed.
            return status == SeatStatus::Held
                && req.from_allowed.contains(&SeatStatus::Available);
        }
    }

    req.from_allowed.contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trip::TripStatus;

    fn trip() -> Trip {
        Trip::new(Uuid::new_v4(), 100_000, &["A1", "A2", "A3"])
    }

    fn no_owners() -> HashMap<Uuid, ReservationStatus> {
        HashMap::new()
    }

    #[test]
    fn hold_available_seats() {
        let mut t = trip();
        let rid = Uuid::new_v4();
        let req = SeatTransition::hold(vec!["A1".into(), "A2".into()], rid);
        apply_transition(&mut t, &req, &no_owners()).unwrap();
        assert_eq!(t.seat("A1").unwrap().status, SeatStatus::Held);
        assert_eq!(t.seat("A1").unwrap().reservation_ref, Some(rid));
        assert_eq!(t.seat("A3").unwrap().status, SeatStatus::Available);
    }

    #[test]
    fn hold_is_all_or_nothing() {
        let mut t = trip();
        let other = Uuid::new_v4();
        let mut owners = HashMap::new();
        owners.insert(other, ReservationStatus::Confirmed);
        apply_transition(&mut t, &SeatTransition::hold(vec!["A2".into()], other), &no_owners())
            .unwrap();
        apply_transition(&mut t, &SeatTransition::book(vec!["A2".into()], other), &owners)
            .unwrap();

        let rid = Uuid::new_v4();
        let err = apply_transition(
            &mut t,
            &SeatTransition::hold(vec!["A1".into(), "A2".into()], rid),
            &owners,
        )
        .unwrap_err();
        assert_eq!(err, SeatError::Conflict { seats: vec!["A2".into()] });
        // A1 untouched by the failed attempt.
        assert_eq!(t.seat("A1").unwrap().status, SeatStatus::Available);
        assert_eq!(t.seat("A1").unwrap().reservation_ref, None);
    }

    #[test]
    fn duplicate_and_missing_seats_rejected() {
        let mut t = trip();
        let rid = Uuid::new_v4();
        let err = apply_transition(
            &mut t,
            &SeatTransition::hold(vec!["A1".into(), "A1".into()], rid),
            &no_owners(),
        )
        .unwrap_err();
        assert_eq!(err, SeatError::DuplicateSeat("A1".into()));

        let err = apply_transition(
            &mut t,
            &SeatTransition::hold(vec!["Z9".into()], rid),
            &no_owners(),
        )
        .unwrap_err();
        assert_eq!(err, SeatError::SeatNotFound("Z9".into()));

        let err =
            apply_transition(&mut t, &SeatTransition::hold(vec![], rid), &no_owners()).unwrap_err();
        assert_eq!(err, SeatError::NoSeats);
    }

    #[test]
    fn holds_require_scheduled_trip() {
        let mut t = trip();
        t.status = TripStatus::Departed;
        let err = apply_transition(
            &mut t,
            &SeatTransition::hold(vec!["A1".into()], Uuid::new_v4()),
            &no_owners(),
        )
        .unwrap_err();
        assert_eq!(err, SeatError::TripNotBookable(TripStatus::Departed));

        // Releasing is still allowed on a departed trip.
        t.status = TripStatus::Scheduled;
        let rid = Uuid::new_v4();
        apply_transition(&mut t, &SeatTransition::hold(vec!["A1".into()], rid), &no_owners())
            .unwrap();
        t.status = TripStatus::Departed;
        let mut owners = HashMap::new();
        owners.insert(rid, ReservationStatus::Held);
        apply_transition(&mut t, &SeatTransition::release(vec!["A1".into()], rid), &owners)
            .unwrap();
        assert_eq!(t.seat("A1").unwrap().status, SeatStatus::Available);
    }

    #[test]
    fn cannot_release_foreign_live_hold() {
        let mut t = trip();
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        apply_transition(&mut t, &SeatTransition::hold(vec!["A1".into()], owner), &no_owners())
            .unwrap();

        let mut owners = HashMap::new();
        owners.insert(owner, ReservationStatus::Held);
        let err = apply_transition(
            &mut t,
            &SeatTransition::release(vec!["A1".into()], intruder),
            &owners,
        )
        .unwrap_err();
        assert_eq!(err, SeatError::Conflict { seats: vec!["A1".into()] });
        assert_eq!(t.seat("A1").unwrap().reservation_ref, Some(owner));
    }

    #[test]
    fn lazy_resolution_frees_seats_of_dead_holds() {
        let mut t = trip();
        let dead = Uuid::new_v4();
        apply_transition(&mut t, &SeatTransition::hold(vec!["A1".into()], dead), &no_owners())
            .unwrap();

        // Owner expired before the sweeper released the seat.
        let mut owners = HashMap::new();
        owners.insert(dead, ReservationStatus::Expired);
        let rid = Uuid::new_v4();
        apply_transition(&mut t, &SeatTransition::hold(vec!["A1".into()], rid), &owners)
            .unwrap();
        assert_eq!(t.seat("A1").unwrap().reservation_ref, Some(rid));
        assert_eq!(t.seat("A1").unwrap().status, SeatStatus::Held);

        // Owner deleted entirely (missing from the map) works the same way.
        let mut t2 = trip();
        apply_transition(&mut t2, &SeatTransition::hold(vec!["A2".into()], dead), &no_owners())
            .unwrap();
        let rid2 = Uuid::new_v4();
        apply_transition(&mut t2, &SeatTransition::hold(vec!["A2".into()], rid2), &no_owners())
            .unwrap();
        assert_eq!(t2.seat("A2").unwrap().reservation_ref, Some(rid2));
    }

    #[test]
    fn held_seat_of_confirmed_owner_is_not_reclaimable() {
        // Mid-confirmation window: owner already CONFIRMED, seat still HELD
        // until the booking transition lands. Nobody may take it.
        let mut t = trip();
        let confirming = Uuid::new_v4();
        apply_transition(
            &mut t,
            &SeatTransition::hold(vec!["A1".into()], confirming),
            &no_owners(),
        )
        .unwrap();

        let mut owners = HashMap::new();
        owners.insert(confirming, ReservationStatus::Confirmed);
        let err = apply_transition(
            &mut t,
            &SeatTransition::hold(vec!["A1".into()], Uuid::new_v4()),
            &owners,
        )
        .unwrap_err();
        assert_eq!(err, SeatError::Conflict { seats: vec!["A1".into()] });
    }

    #[test]
    fn booked_seats_are_never_lazily_reclaimed() {
        let mut t = trip();
        let dead = Uuid::new_v4();
        apply_transition(&mut t, &SeatTransition::hold(vec!["A1".into()], dead), &no_owners())
            .unwrap();
        let mut owners = HashMap::new();
        owners.insert(dead, ReservationStatus::Held);
        apply_transition(&mut t, &SeatTransition::book(vec!["A1".into()], dead), &owners)
            .unwrap();

        // Even with a terminal owner, a BOOKED seat stays off-limits.
        owners.insert(dead, ReservationStatus::Cancelled);
        let err = apply_transition(
            &mut t,
            &SeatTransition::hold(vec!["A1".into()], Uuid::new_v4()),
            &owners,
        )
        .unwrap_err();
        assert_eq!(err, SeatError::Conflict { seats: vec!["A1".into()] });
    }

    #[test]
    fn conflict_names_every_offending_seat() {
        let mut t = trip();
        let other = Uuid::new_v4();
        apply_transition(
            &mut t,
            &SeatTransition::hold(vec!["A1".into(), "A3".into()], other),
            &no_owners(),
        )
        .unwrap();

        let mut owners = HashMap::new();
        owners.insert(other, ReservationStatus::Held);
        let err = apply_transition(
            &mut t,
            &SeatTransition::hold(vec!["A1".into(), "A2".into(), "A3".into()], Uuid::new_v4()),
            &owners,
        )
        .unwrap_err();
        assert_eq!(
            err,
            SeatError::Conflict { seats: vec!["A1".into(), "A3".into()] }
        );
    }
}
