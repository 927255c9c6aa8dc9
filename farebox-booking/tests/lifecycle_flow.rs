use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use farebox_booking::gateway::{PaymentWebhookAdapter, WebhookOutcome, WebhookVerifier};
use farebox_booking::lifecycle::{CreateHoldRequest, ReservationLifecycle};
use farebox_core::error::{ReservationError, StoreError};
use farebox_core::payment::{NotificationStatus, PaymentNotification};
use farebox_core::repository::{NotificationDispatcher, ReservationStore, TripStore};
use farebox_core::reservation::{
    ConfirmationRecord, ContactInfo, Reservation, ReservationStatus,
};
use farebox_core::trip::{SeatStatus, Trip, TripStatus};
use farebox_shared::pii::Masked;
use farebox_store::app_config::BookingRules;
use farebox_store::{LogDispatcher, MemoryStore};

const PRICE: i64 = 100_000;

fn rules() -> BookingRules {
    BookingRules {
        hold_duration_minutes: 15,
        sweep_interval_seconds: 60,
        reconcile_every_ticks: 10,
        expiry_item_timeout_ms: 5_000,
        ticket_code_length: 8,
    }
}

fn contact(name: &str) -> ContactInfo {
    ContactInfo {
        name: name.to_string(),
        phone: "0900000000".to_string(),
        email: Masked(format!("{}@example.com", name.to_lowercase())),
    }
}

fn hold_request(trip_id: Uuid, seats: &[&str]) -> CreateHoldRequest {
    CreateHoldRequest {
        trip_id,
        seat_numbers: seats.iter().map(|s| s.to_string()).collect(),
        contact: contact("Rider"),
        requester: None,
    }
}

async fn setup(seats: &[&str]) -> (Arc<MemoryStore>, Arc<ReservationLifecycle>, Trip) {
    let store = Arc::new(MemoryStore::new());
    let trip = Trip::new(Uuid::new_v4(), PRICE, seats);
    store.insert_trip(&trip).await.unwrap();
    let lifecycle = Arc::new(ReservationLifecycle::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(LogDispatcher),
        rules(),
    ));
    (store, lifecycle, trip)
}

async fn seat_status(store: &MemoryStore, trip_id: Uuid, seat: &str) -> (SeatStatus, Option<Uuid>) {
    let trip = store.get_trip(trip_id).await.unwrap().unwrap();
    let seat = trip.seat(seat).unwrap();
    (seat.status, seat.reservation_ref)
}

#[tokio::test]
async fn full_booking_scenario() {
    let (store, lifecycle, trip) = setup(&["A1", "A2", "A3"]).await;

    // Hold A1: reservation HELD, total captured from the trip price.
    let held = lifecycle
        .create_hold(hold_request(trip.id, &["A1"]))
        .await
        .unwrap();
    assert_eq!(held.status, ReservationStatus::Held);
    assert_eq!(held.total_amount, 100_000);
    assert!(held.held_until.unwrap() > Utc::now());
    assert_eq!(seat_status(&store, trip.id, "A1").await, (SeatStatus::Held, Some(held.id)));

    // Confirm with the exact amount: CONFIRMED, seat BOOKED, ticket issued.
    let reference = held.payment_reference.clone().unwrap();
    let confirmed = lifecycle
        .confirm(held.id, 100_000, "BANK_TRANSFER", &reference)
        .await
        .unwrap();
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert!(confirmed.held_until.is_none());
    let ticket = confirmed.ticket_code.clone().unwrap();
    assert_eq!(ticket.len(), 8);
    assert_eq!(
        seat_status(&store, trip.id, "A1").await,
        (SeatStatus::Booked, Some(held.id))
    );

    // A booked seat conflicts for any other caller.
    let err = lifecycle
        .create_hold(hold_request(trip.id, &["A1"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::Conflict { ref seats } if seats == &vec!["A1".to_string()]));

    // Cancellation frees the seat again.
    let cancelled = lifecycle.cancel(held.id, None).await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(seat_status(&store, trip.id, "A1").await, (SeatStatus::Available, None));

    // And a fresh hold on A1 succeeds.
    let rehold = lifecycle
        .create_hold(hold_request(trip.id, &["A1"]))
        .await
        .unwrap();
    assert_eq!(rehold.status, ReservationStatus::Held);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_holds_have_exactly_one_winner_per_seat() {
    let (store, lifecycle, trip) = setup(&["A1", "A2", "A3", "A4", "A5", "A6"]).await;

    // 24 tasks fight over overlapping seat pairs.
    let mut handles = Vec::new();
    for i in 0..24 {
        let lifecycle = lifecycle.clone();
        let trip_id = trip.id;
        let seats = [
            format!("A{}", (i % 6) + 1),
            format!("A{}", ((i + 1) % 6) + 1),
        ];
        handles.push(tokio::spawn(async move {
            lifecycle
                .create_hold(CreateHoldRequest {
                    trip_id,
                    seat_numbers: seats.to_vec(),
                    contact: contact("Racer"),
                    requester: None,
                })
                .await
        }));
    }

    let mut winners: Vec<Reservation> = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(reservation) => winners.push(reservation),
            Err(ReservationError::Conflict { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    // No seat appears in two winning reservations.
    let mut taken = HashSet::new();
    for winner in &winners {
        for seat in &winner.seat_numbers {
            assert!(taken.insert(seat.clone()), "seat {seat} double-booked");
        }
    }

    // The seat map agrees with the winners.
    let final_trip = store.get_trip(trip.id).await.unwrap().unwrap();
    let winner_ids: HashSet<Uuid> = winners.iter().map(|w| w.id).collect();
    for seat in &final_trip.seats {
        match seat.status {
            SeatStatus::Held => assert!(winner_ids.contains(&seat.reservation_ref.unwrap())),
            SeatStatus::Available => assert!(seat.reservation_ref.is_none()),
            SeatStatus::Booked => panic!("nothing was confirmed in this test"),
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn confirmation_is_idempotent_under_replay_and_race() {
    let (store, lifecycle, trip) = setup(&["A1"]).await;
    let held = lifecycle
        .create_hold(hold_request(trip.id, &["A1"]))
        .await
        .unwrap();
    let reference = held.payment_reference.clone().unwrap();

    // Webhook redelivery racing a manual confirmation.
    let (first, second) = tokio::join!(
        lifecycle.confirm(held.id, 100_000, "GATEWAY", &reference),
        lifecycle.confirm(held.id, 100_000, "GATEWAY", &reference),
    );
    let first = first.unwrap();
    let second = second.unwrap();
    assert_eq!(first.ticket_code, second.ticket_code);
    assert_eq!(first.status, ReservationStatus::Confirmed);
    assert_eq!(second.status, ReservationStatus::Confirmed);

    // A later replay still returns the same ticket.
    let replay = lifecycle
        .confirm(held.id, 100_000, "GATEWAY", &reference)
        .await
        .unwrap();
    assert_eq!(replay.ticket_code, first.ticket_code);
    assert_eq!(
        seat_status(&store, trip.id, "A1").await,
        (SeatStatus::Booked, Some(held.id))
    );
}

#[tokio::test]
async fn insufficient_payment_is_rejected() {
    let (store, lifecycle, trip) = setup(&["A1", "A2"]).await;
    let held = lifecycle
        .create_hold(hold_request(trip.id, &["A1", "A2"]))
        .await
        .unwrap();
    assert_eq!(held.total_amount, 200_000);

    let reference = held.payment_reference.clone().unwrap();
    let err = lifecycle
        .confirm(held.id, 150_000, "CARD", &reference)
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::Validation(_)));

    // Nothing moved: still HELD, seats untouched.
    let row = store.get(held.id).await.unwrap().unwrap();
    assert_eq!(row.status, ReservationStatus::Held);
    assert_eq!(seat_status(&store, trip.id, "A1").await.0, SeatStatus::Held);
}

#[tokio::test]
async fn all_or_nothing_hold_names_the_conflicting_seat() {
    let (store, lifecycle, trip) = setup(&["A1", "A2"]).await;

    // A2 gets booked by someone else first.
    let other = lifecycle
        .create_hold(hold_request(trip.id, &["A2"]))
        .await
        .unwrap();
    let reference = other.payment_reference.clone().unwrap();
    lifecycle
        .confirm(other.id, 100_000, "CARD", &reference)
        .await
        .unwrap();

    let err = lifecycle
        .create_hold(hold_request(trip.id, &["A1", "A2"]))
        .await
        .unwrap_err();
    match err {
        ReservationError::Conflict { seats } => assert_eq!(seats, vec!["A2".to_string()]),
        other => panic!("expected conflict, got {other}"),
    }

    // A1 was not left HELD by the failed attempt.
    assert_eq!(seat_status(&store, trip.id, "A1").await, (SeatStatus::Available, None));
}

#[tokio::test]
async fn expiry_releases_seats_and_marks_reservation() {
    let (store, lifecycle, trip) = setup(&["A1", "A2"]).await;
    let held = lifecycle
        .create_hold(hold_request(trip.id, &["A1", "A2"]))
        .await
        .unwrap();

    // Nothing is stale yet.
    let summary = lifecycle.expire_stale_holds(Utc::now()).await;
    assert_eq!(summary.expired, 0);

    // Simulate the clock passing the hold deadline.
    let later: DateTime<Utc> = Utc::now() + Duration::minutes(16);
    let summary = lifecycle.expire_stale_holds(later).await;
    assert_eq!(summary.expired, 1);
    assert_eq!(summary.failed, 0);

    let row = store.get(held.id).await.unwrap().unwrap();
    assert_eq!(row.status, ReservationStatus::Expired);
    assert_eq!(seat_status(&store, trip.id, "A1").await, (SeatStatus::Available, None));
    assert_eq!(seat_status(&store, trip.id, "A2").await, (SeatStatus::Available, None));

    // The seats are sellable again.
    lifecycle
        .create_hold(hold_request(trip.id, &["A1", "A2"]))
        .await
        .unwrap();
}

#[tokio::test]
async fn confirming_a_lapsed_hold_expires_it() {
    let (store, lifecycle, trip) = setup(&["A1"]).await;
    let lapsed_rules = BookingRules {
        hold_duration_minutes: 0,
        ..rules()
    };
    let lifecycle_short = ReservationLifecycle::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(LogDispatcher),
        lapsed_rules,
    );
    let held = lifecycle_short
        .create_hold(hold_request(trip.id, &["A1"]))
        .await
        .unwrap();

    let reference = held.payment_reference.clone().unwrap();
    let err = lifecycle
        .confirm(held.id, 100_000, "CARD", &reference)
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::State(_)));

    let row = store.get(held.id).await.unwrap().unwrap();
    assert_eq!(row.status, ReservationStatus::Expired);
    assert_eq!(seat_status(&store, trip.id, "A1").await, (SeatStatus::Available, None));
}

#[tokio::test]
async fn cancellation_is_idempotent() {
    let (store, lifecycle, trip) = setup(&["A1"]).await;
    let held = lifecycle
        .create_hold(hold_request(trip.id, &["A1"]))
        .await
        .unwrap();

    let first = lifecycle.cancel(held.id, None).await.unwrap();
    assert_eq!(first.status, ReservationStatus::Cancelled);
    assert_eq!(seat_status(&store, trip.id, "A1").await, (SeatStatus::Available, None));

    // The seat moves on to a new owner...
    let newcomer = lifecycle
        .create_hold(hold_request(trip.id, &["A1"]))
        .await
        .unwrap();

    // ...and cancelling the old reservation again neither errors nor
    // touches the newcomer's hold.
    let second = lifecycle.cancel(held.id, None).await.unwrap();
    assert_eq!(second.status, ReservationStatus::Cancelled);
    assert_eq!(
        seat_status(&store, trip.id, "A1").await,
        (SeatStatus::Held, Some(newcomer.id))
    );
}

#[tokio::test]
async fn cancel_enforces_ownership_when_requester_is_known() {
    let (_store, lifecycle, trip) = setup(&["A1"]).await;
    let held = lifecycle
        .create_hold(CreateHoldRequest {
            trip_id: trip.id,
            seat_numbers: vec!["A1".into()],
            contact: contact("Owner"),
            requester: Some("user-1".into()),
        })
        .await
        .unwrap();

    let err = lifecycle.cancel(held.id, Some("user-2")).await.unwrap_err();
    assert!(matches!(err, ReservationError::Forbidden(_)));

    // Anonymous surfaces (support tooling) may still cancel.
    let cancelled = lifecycle.cancel(held.id, None).await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
}

#[tokio::test]
async fn holds_rejected_unless_trip_is_scheduled() {
    let store = Arc::new(MemoryStore::new());
    let mut trip = Trip::new(Uuid::new_v4(), PRICE, &["A1"]);
    trip.status = TripStatus::Departed;
    store.insert_trip(&trip).await.unwrap();
    let lifecycle = ReservationLifecycle::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(LogDispatcher),
        rules(),
    );

    let err = lifecycle
        .create_hold(hold_request(trip.id, &["A1"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::State(_)));
}

#[tokio::test]
async fn lazy_conflict_resolution_frees_seats_of_terminal_holds() {
    let (store, lifecycle, trip) = setup(&["A1"]).await;
    let held = lifecycle
        .create_hold(hold_request(trip.id, &["A1"]))
        .await
        .unwrap();

    // The reservation goes terminal without its seats being released,
    // as if a storage-level expiry beat the sweeper to it.
    store.mark_expired(held.id).await.unwrap();
    assert_eq!(seat_status(&store, trip.id, "A1").await.0, SeatStatus::Held);

    // A new hold claims the seat anyway: the reservation is the source of
    // truth, not the seat flag.
    let newcomer = lifecycle
        .create_hold(hold_request(trip.id, &["A1"]))
        .await
        .unwrap();
    assert_eq!(
        seat_status(&store, trip.id, "A1").await,
        (SeatStatus::Held, Some(newcomer.id))
    );
}

#[tokio::test]
async fn reconcile_releases_orphaned_held_seats() {
    let (store, lifecycle, trip) = setup(&["A1", "A2", "A3"]).await;
    let held = lifecycle
        .create_hold(hold_request(trip.id, &["A1", "A2"]))
        .await
        .unwrap();

    // Terminal reservation, seats never released.
    store.mark_cancelled(held.id).await.unwrap();

    let released = lifecycle.reconcile_trip(trip.id).await.unwrap();
    assert_eq!(released, 2);
    assert_eq!(seat_status(&store, trip.id, "A1").await, (SeatStatus::Available, None));
    assert_eq!(seat_status(&store, trip.id, "A2").await, (SeatStatus::Available, None));

    // A clean map reconciles to zero.
    assert_eq!(lifecycle.reconcile_trip(trip.id).await.unwrap(), 0);
}

#[tokio::test]
async fn reconcile_completes_a_crashed_confirmation() {
    let (store, lifecycle, trip) = setup(&["A1"]).await;
    let held = lifecycle
        .create_hold(hold_request(trip.id, &["A1"]))
        .await
        .unwrap();

    // Status flipped to CONFIRMED but the process died before the seats
    // were booked.
    let record = ConfirmationRecord {
        ticket_code: "CRASH123".into(),
        payment_method: "CARD".into(),
        payment_reference: held.payment_reference.clone().unwrap(),
    };
    store.mark_confirmed(held.id, &record).await.unwrap();
    assert_eq!(seat_status(&store, trip.id, "A1").await.0, SeatStatus::Held);

    // In the meantime nobody can steal the seat.
    let err = lifecycle
        .create_hold(hold_request(trip.id, &["A1"]))
        .await
        .unwrap_err();
    assert!(matches!(err, ReservationError::Conflict { .. }));

    // Reconciliation finishes the booking instead of releasing the seat.
    let repaired = lifecycle.reconcile_trip(trip.id).await.unwrap();
    assert_eq!(repaired, 1);
    assert_eq!(
        seat_status(&store, trip.id, "A1").await,
        (SeatStatus::Booked, Some(held.id))
    );
}

/// ReservationStore wrapper that fails the first N confirmations with
/// `TicketCodeTaken`, standing in for a store pre-seeded with colliding
/// codes.
struct CollidingStore {
    inner: Arc<MemoryStore>,
    collisions_left: AtomicU32,
}

#[async_trait::async_trait]
impl ReservationStore for CollidingStore {
    async fn insert(&self, reservation: &Reservation) -> Result<(), StoreError> {
        self.inner.insert(reservation).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Reservation>, StoreError> {
        self.inner.get(id).await
    }

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Reservation>, StoreError> {
        self.inner.find_by_payment_reference(reference).await
    }

    async fn find_by_ticket_code(&self, code: &str) -> Result<Option<Reservation>, StoreError> {
        self.inner.find_by_ticket_code(code).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }

    async fn mark_confirmed(
        &self,
        id: Uuid,
        record: &ConfirmationRecord,
    ) -> Result<Reservation, StoreError> {
        if self
            .collisions_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::TicketCodeTaken);
        }
        self.inner.mark_confirmed(id, record).await
    }

    async fn mark_cancelled(&self, id: Uuid) -> Result<Reservation, StoreError> {
        self.inner.mark_cancelled(id).await
    }

    async fn mark_expired(&self, id: Uuid) -> Result<Reservation, StoreError> {
        self.inner.mark_expired(id).await
    }

    async fn revert_to_held(
        &self,
        id: Uuid,
        held_until: DateTime<Utc>,
    ) -> Result<Reservation, StoreError> {
        self.inner.revert_to_held(id, held_until).await
    }

    async fn list_expired_holds(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StoreError> {
        self.inner.list_expired_holds(now).await
    }

    async fn statuses_of(
        &self,
        ids: &[Uuid],
    ) -> Result<std::collections::HashMap<Uuid, ReservationStatus>, StoreError> {
        self.inner.statuses_of(ids).await
    }
}

#[tokio::test]
async fn ticket_code_collisions_are_retried_until_unique() {
    let store = Arc::new(MemoryStore::new());
    let trip = Trip::new(Uuid::new_v4(), PRICE, &["A1"]);
    store.insert_trip(&trip).await.unwrap();

    let colliding = Arc::new(CollidingStore {
        inner: store.clone(),
        collisions_left: AtomicU32::new(3),
    });
    let lifecycle = ReservationLifecycle::new(
        store.clone(),
        store.clone(),
        colliding.clone(),
        Arc::new(LogDispatcher),
        rules(),
    );

    let held = lifecycle
        .create_hold(hold_request(trip.id, &["A1"]))
        .await
        .unwrap();
    let reference = held.payment_reference.clone().unwrap();
    let confirmed = lifecycle
        .confirm(held.id, 100_000, "CARD", &reference)
        .await
        .unwrap();

    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert!(confirmed.ticket_code.is_some());
    assert_eq!(colliding.collisions_left.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn confirmed_reservations_never_share_a_ticket_code() {
    let seat_names: Vec<String> = (1..=40).map(|i| format!("S{i}")).collect();
    let seat_refs: Vec<&str> = seat_names.iter().map(String::as_str).collect();
    let (_store, lifecycle, trip) = setup(&seat_refs).await;

    let mut codes = HashSet::new();
    for seat in &seat_names {
        let held = lifecycle
            .create_hold(hold_request(trip.id, &[seat]))
            .await
            .unwrap();
        let reference = held.payment_reference.clone().unwrap();
        let confirmed = lifecycle
            .confirm(held.id, PRICE, "CARD", &reference)
            .await
            .unwrap();
        assert!(
            codes.insert(confirmed.ticket_code.unwrap()),
            "duplicate ticket code issued"
        );
    }
    assert_eq!(codes.len(), 40);
}

struct CountingDispatcher {
    published: AtomicU32,
}

#[async_trait::async_trait]
impl NotificationDispatcher for CountingDispatcher {
    async fn publish(
        &self,
        _topic: &str,
        _key: &str,
        _payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.published.fetch_add(1, Ordering::SeqCst);
        // The dispatcher failing must not fail the operation.
        Err("broker unavailable".into())
    }
}

#[tokio::test]
async fn dispatcher_failures_do_not_roll_back_reservations() {
    let store = Arc::new(MemoryStore::new());
    let trip = Trip::new(Uuid::new_v4(), PRICE, &["A1"]);
    store.insert_trip(&trip).await.unwrap();
    let dispatcher = Arc::new(CountingDispatcher {
        published: AtomicU32::new(0),
    });
    let lifecycle = ReservationLifecycle::new(
        store.clone(),
        store.clone(),
        store.clone(),
        dispatcher.clone(),
        rules(),
    );

    let held = lifecycle
        .create_hold(hold_request(trip.id, &["A1"]))
        .await
        .unwrap();
    let reference = held.payment_reference.clone().unwrap();
    let confirmed = lifecycle
        .confirm(held.id, PRICE, "CARD", &reference)
        .await
        .unwrap();
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    assert_eq!(dispatcher.published.load(Ordering::SeqCst), 1);

    let cancelled = lifecycle.cancel(held.id, None).await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);
    assert_eq!(dispatcher.published.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn webhook_confirms_verifies_and_replays_safely() {
    let (store, lifecycle, trip) = setup(&["A1"]).await;
    let verifier = WebhookVerifier::new("webhook-secret");
    let adapter = PaymentWebhookAdapter::new(
        verifier.clone(),
        store.clone(),
        lifecycle.clone(),
    );

    let held = lifecycle
        .create_hold(hold_request(trip.id, &["A1"]))
        .await
        .unwrap();
    let order_code = held.payment_reference.clone().unwrap();

    // Failed-payment notification: verified, logged, no effect.
    let failed = PaymentNotification {
        order_code: order_code.clone(),
        amount: PRICE,
        status: NotificationStatus::Failed,
        signature: verifier.sign(&order_code, PRICE, NotificationStatus::Failed),
    };
    assert!(matches!(
        adapter.handle(failed).await.unwrap(),
        WebhookOutcome::Ignored
    ));
    assert_eq!(
        store.get(held.id).await.unwrap().unwrap().status,
        ReservationStatus::Held
    );

    // Tampered signature never reaches the lifecycle.
    let tampered = PaymentNotification {
        order_code: order_code.clone(),
        amount: PRICE,
        status: NotificationStatus::Paid,
        signature: verifier.sign(&order_code, PRICE - 1, NotificationStatus::Paid),
    };
    assert!(matches!(
        adapter.handle(tampered).await.unwrap_err(),
        ReservationError::PaymentVerification(_)
    ));

    // The real success notification confirms...
    let paid = PaymentNotification {
        order_code: order_code.clone(),
        amount: PRICE,
        status: NotificationStatus::Paid,
        signature: verifier.sign(&order_code, PRICE, NotificationStatus::Paid),
    };
    let first = match adapter.handle(paid.clone()).await.unwrap() {
        WebhookOutcome::Confirmed(reservation) => reservation,
        other => panic!("expected confirmation, got {other:?}"),
    };

    // ...and its redelivery returns the same ticket without side effects.
    let second = match adapter.handle(paid).await.unwrap() {
        WebhookOutcome::Confirmed(reservation) => reservation,
        other => panic!("expected confirmation, got {other:?}"),
    };
    assert_eq!(first.ticket_code, second.ticket_code);

    // Unknown order codes surface as NotFound so the gateway retries.
    let unknown = PaymentNotification {
        order_code: "does-not-exist".into(),
        amount: PRICE,
        status: NotificationStatus::Paid,
        signature: verifier.sign("does-not-exist", PRICE, NotificationStatus::Paid),
    };
    assert!(matches!(
        adapter.handle(unknown).await.unwrap_err(),
        ReservationError::NotFound(_)
    ));
}
