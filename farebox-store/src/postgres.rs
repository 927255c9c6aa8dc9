//! Postgres store backend. Every operation is one transaction; the seat map
//! of a trip is serialized by locking the trip row and its seat rows
//! `FOR UPDATE`, then running the same pure transition planning the memory
//! backend uses. Ticket-code uniqueness rides on a partial unique index.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use farebox_core::error::StoreError;
use farebox_core::repository::{ReservationStore, TripCatalog, TripStore};
use farebox_core::reservation::{
    ConfirmationRecord, ContactInfo, PaymentStatus, Reservation, ReservationStatus,
};
use farebox_core::seatmap::{apply_transition, SeatTransition};
use farebox_core::trip::{Seat, SeatStatus, Trip, TripForBooking, TripStatus};
use farebox_shared::pii::Masked;

#[derive(Clone)]
pub struct PgStore {
    pub pool: PgPool,
}

impl PgStore {
    pub async fn connect(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Migrations completed successfully.");
        Ok(())
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn parse_trip_status(s: &str) -> Result<TripStatus, StoreError> {
    match s {
        "SCHEDULED" => Ok(TripStatus::Scheduled),
        "DEPARTED" => Ok(TripStatus::Departed),
        "ARRIVED" => Ok(TripStatus::Arrived),
        "CANCELLED" => Ok(TripStatus::Cancelled),
        other => Err(StoreError::Backend(format!("unknown trip status {other}"))),
    }
}

fn parse_seat_status(s: &str) -> Result<SeatStatus, StoreError> {
    match s {
        "AVAILABLE" => Ok(SeatStatus::Available),
        "HELD" => Ok(SeatStatus::Held),
        "BOOKED" => Ok(SeatStatus::Booked),
        other => Err(StoreError::Backend(format!("unknown seat status {other}"))),
    }
}

fn parse_reservation_status(s: &str) -> Result<ReservationStatus, StoreError> {
    match s {
        "HELD" => Ok(ReservationStatus::Held),
        "CONFIRMED" => Ok(ReservationStatus::Confirmed),
        "CANCELLED" => Ok(ReservationStatus::Cancelled),
        "EXPIRED" => Ok(ReservationStatus::Expired),
        other => Err(StoreError::Backend(format!(
            "unknown reservation status {other}"
        ))),
    }
}

fn parse_payment_status(s: &str) -> Result<PaymentStatus, StoreError> {
    match s {
        "PENDING" => Ok(PaymentStatus::Pending),
        "PAID" => Ok(PaymentStatus::Paid),
        "FAILED" => Ok(PaymentStatus::Failed),
        other => Err(StoreError::Backend(format!(
            "unknown payment status {other}"
        ))),
    }
}

fn payment_status_str(s: PaymentStatus) -> &'static str {
    match s {
        PaymentStatus::Pending => "PENDING",
        PaymentStatus::Paid => "PAID",
        PaymentStatus::Failed => "FAILED",
    }
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    company_id: Uuid,
    status: String,
    price: i64,
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    seat_number: String,
    status: String,
    reservation_ref: Option<Uuid>,
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    trip_id: Uuid,
    user_id: Option<String>,
    status: String,
    seat_numbers: Vec<String>,
    total_amount: i64,
    held_until: Option<DateTime<Utc>>,
    payment_status: String,
    payment_reference: Option<String>,
    payment_method: Option<String>,
    ticket_code: Option<String>,
    contact_name: String,
    contact_phone: String,
    contact_email: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ReservationRow {
    fn into_reservation(self) -> Result<Reservation, StoreError> {
        Ok(Reservation {
            id: self.id,
            trip_id: self.trip_id,
            user_id: self.user_id,
            status: parse_reservation_status(&self.status)?,
            seat_numbers: self.seat_numbers,
            total_amount: self.total_amount,
            held_until: self.held_until,
            payment_status: parse_payment_status(&self.payment_status)?,
            payment_reference: self.payment_reference,
            payment_method: self.payment_method,
            ticket_code: self.ticket_code,
            contact: ContactInfo {
                name: self.contact_name,
                phone: self.contact_phone,
                email: Masked(self.contact_email),
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const RESERVATION_COLUMNS: &str = "id, trip_id, user_id, status, seat_numbers, total_amount, \
     held_until, payment_status, payment_reference, payment_method, ticket_code, \
     contact_name, contact_phone, contact_email, created_at, updated_at";

async fn load_trip_for_update(
    tx: &mut Transaction<'_, Postgres>,
    trip_id: Uuid,
) -> Result<Option<Trip>, StoreError> {
    let trip_row = sqlx::query_as::<_, TripRow>(
        "SELECT id, company_id, status, price FROM trips WHERE id = $1 FOR UPDATE",
    )
    .bind(trip_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(backend)?;

    let Some(trip_row) = trip_row else {
        return Ok(None);
    };

    let seat_rows = sqlx::query_as::<_, SeatRow>(
        "SELECT seat_number, status, reservation_ref FROM trip_seats \
         WHERE trip_id = $1 ORDER BY position FOR UPDATE",
    )
    .bind(trip_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(backend)?;

    let mut seats = Vec::with_capacity(seat_rows.len());
    for row in seat_rows {
        seats.push(Seat {
            seat_number: row.seat_number,
            status: parse_seat_status(&row.status)?,
            reservation_ref: row.reservation_ref,
        });
    }

    Ok(Some(Trip {
        id: trip_row.id,
        company_id: trip_row.company_id,
        status: parse_trip_status(&trip_row.status)?,
        price: trip_row.price,
        seats,
    }))
}

async fn fetch_reservation_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<ReservationRow, StoreError> {
    sqlx::query_as::<_, ReservationRow>(&format!(
        "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(backend)?
    .ok_or(StoreError::NotFound)
}

#[async_trait]
impl TripStore for PgStore {
    async fn insert_trip(&self, trip: &Trip) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query("INSERT INTO trips (id, company_id, status, price) VALUES ($1, $2, $3, $4)")
            .bind(trip.id)
            .bind(trip.company_id)
            .bind(trip.status.as_str())
            .bind(trip.price)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        for (position, seat) in trip.seats.iter().enumerate() {
            sqlx::query(
                "INSERT INTO trip_seats (trip_id, seat_number, position, status, reservation_ref) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(trip.id)
            .bind(&seat.seat_number)
            .bind(position as i32)
            .bind(seat.status.as_str())
            .bind(seat.reservation_ref)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)
    }

    async fn get_trip(&self, trip_id: Uuid) -> Result<Option<Trip>, StoreError> {
        let trip_row = sqlx::query_as::<_, TripRow>(
            "SELECT id, company_id, status, price FROM trips WHERE id = $1",
        )
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        let Some(trip_row) = trip_row else {
            return Ok(None);
        };

        let seat_rows = sqlx::query_as::<_, SeatRow>(
            "SELECT seat_number, status, reservation_ref FROM trip_seats \
             WHERE trip_id = $1 ORDER BY position",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut seats = Vec::with_capacity(seat_rows.len());
        for row in seat_rows {
            seats.push(Seat {
                seat_number: row.seat_number,
                status: parse_seat_status(&row.status)?,
                reservation_ref: row.reservation_ref,
            });
        }

        Ok(Some(Trip {
            id: trip_row.id,
            company_id: trip_row.company_id,
            status: parse_trip_status(&trip_row.status)?,
            price: trip_row.price,
            seats,
        }))
    }

    async fn list_trip_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM trips")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn transition_seats(
        &self,
        trip_id: Uuid,
        req: &SeatTransition,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let mut trip = load_trip_for_update(&mut tx, trip_id)
            .await?
            .ok_or(StoreError::NotFound)?;

        let owner_ids: Vec<Uuid> = trip
            .seats
            .iter()
            .filter(|s| req.seat_numbers.contains(&s.seat_number))
            .filter_map(|s| s.reservation_ref)
            .collect();

        let mut owner_status = HashMap::new();
        if !owner_ids.is_empty() {
            let rows: Vec<(Uuid, String)> =
                sqlx::query_as("SELECT id, status FROM reservations WHERE id = ANY($1)")
                    .bind(&owner_ids)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(backend)?;
            for (id, status) in rows {
                owner_status.insert(id, parse_reservation_status(&status)?);
            }
        }

        apply_transition(&mut trip, req, &owner_status)?;

        for seat_number in &req.seat_numbers {
            let seat = trip.seat(seat_number).expect("validated by apply_transition");
            sqlx::query(
                "UPDATE trip_seats SET status = $1, reservation_ref = $2 \
                 WHERE trip_id = $3 AND seat_number = $4",
            )
            .bind(seat.status.as_str())
            .bind(seat.reservation_ref)
            .bind(trip_id)
            .bind(seat_number)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)
    }
}

#[async_trait]
impl TripCatalog for PgStore {
    async fn get_trip_for_booking(
        &self,
        trip_id: Uuid,
    ) -> Result<Option<TripForBooking>, StoreError> {
        Ok(self
            .get_trip(trip_id)
            .await?
            .map(|t| TripForBooking::from(&t)))
    }
}

#[async_trait]
impl ReservationStore for PgStore {
    async fn insert(&self, reservation: &Reservation) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO reservations (id, trip_id, user_id, status, seat_numbers, total_amount, \
             held_until, payment_status, payment_reference, payment_method, ticket_code, \
             contact_name, contact_phone, contact_email, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(reservation.id)
        .bind(reservation.trip_id)
        .bind(&reservation.user_id)
        .bind(reservation.status.as_str())
        .bind(&reservation.seat_numbers)
        .bind(reservation.total_amount)
        .bind(reservation.held_until)
        .bind(payment_status_str(reservation.payment_status))
        .bind(&reservation.payment_reference)
        .bind(&reservation.payment_method)
        .bind(&reservation.ticket_code)
        .bind(&reservation.contact.name)
        .bind(&reservation.contact.phone)
        .bind(&reservation.contact.email.0)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(ReservationRow::into_reservation).transpose()
    }

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE payment_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(ReservationRow::into_reservation).transpose()
    }

    async fn find_by_ticket_code(&self, code: &str) -> Result<Option<Reservation>, StoreError> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE ticket_code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.map(ReservationRow::into_reservation).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn mark_confirmed(
        &self,
        id: Uuid,
        record: &ConfirmationRecord,
    ) -> Result<Reservation, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let row = fetch_reservation_for_update(&mut tx, id).await?;
        let current = parse_reservation_status(&row.status)?;
        if current != ReservationStatus::Held {
            return Err(StoreError::WrongStatus(current));
        }

        let updated = sqlx::query_as::<_, ReservationRow>(&format!(
            "UPDATE reservations SET status = 'CONFIRMED', ticket_code = $2, \
             payment_status = 'PAID', payment_method = $3, payment_reference = $4, \
             held_until = NULL, updated_at = NOW() \
             WHERE id = $1 RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(id)
        .bind(&record.ticket_code)
        .bind(&record.payment_method)
        .bind(&record.payment_reference)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| match &err {
            sqlx::Error::Database(db)
                if db.constraint() == Some("reservations_ticket_code_key") =>
            {
                StoreError::TicketCodeTaken
            }
            _ => backend(err),
        })?;

        tx.commit().await.map_err(backend)?;
        updated.into_reservation()
    }

    async fn mark_cancelled(&self, id: Uuid) -> Result<Reservation, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let row = fetch_reservation_for_update(&mut tx, id).await?;
        let current = parse_reservation_status(&row.status)?;
        if current != ReservationStatus::Held && current != ReservationStatus::Confirmed {
            return Err(StoreError::WrongStatus(current));
        }

        let updated = sqlx::query_as::<_, ReservationRow>(&format!(
            "UPDATE reservations SET status = 'CANCELLED', held_until = NULL, \
             updated_at = NOW() WHERE id = $1 RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        updated.into_reservation()
    }

    async fn mark_expired(&self, id: Uuid) -> Result<Reservation, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let row = fetch_reservation_for_update(&mut tx, id).await?;
        let current = parse_reservation_status(&row.status)?;
        if current != ReservationStatus::Held {
            return Err(StoreError::WrongStatus(current));
        }

        let updated = sqlx::query_as::<_, ReservationRow>(&format!(
            "UPDATE reservations SET status = 'EXPIRED', held_until = NULL, \
             updated_at = NOW() WHERE id = $1 RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        updated.into_reservation()
    }

    async fn revert_to_held(
        &self,
        id: Uuid,
        held_until: DateTime<Utc>,
    ) -> Result<Reservation, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        let row = fetch_reservation_for_update(&mut tx, id).await?;
        let current = parse_reservation_status(&row.status)?;
        if current != ReservationStatus::Confirmed {
            return Err(StoreError::WrongStatus(current));
        }

        let updated = sqlx::query_as::<_, ReservationRow>(&format!(
            "UPDATE reservations SET status = 'HELD', ticket_code = NULL, \
             payment_status = 'PENDING', payment_method = NULL, held_until = $2, \
             updated_at = NOW() WHERE id = $1 RETURNING {RESERVATION_COLUMNS}"
        ))
        .bind(id)
        .bind(held_until)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        updated.into_reservation()
    }

    async fn list_expired_holds(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE status = 'HELD' AND held_until <= $1"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.into_iter()
            .map(ReservationRow::into_reservation)
            .collect()
    }

    async fn statuses_of(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, ReservationStatus>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT id, status FROM reservations WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;
        let mut out = HashMap::new();
        for (id, status) in rows {
            out.insert(id, parse_reservation_status(&status)?);
        }
        Ok(out)
    }
}
