use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use farebox_booking::lifecycle::CreateHoldRequest;
use farebox_core::error::ReservationError;
use farebox_core::reservation::{ContactInfo, PaymentStatus, Reservation, ReservationStatus};
use farebox_shared::pii::Masked;

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub name: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct HoldRequest {
    pub trip_id: Uuid,
    pub seat_numbers: Vec<String>,
    pub contact: ContactRequest,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub paid_amount: i64,
    pub payment_method: String,
    pub payment_reference: String,
}

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub ticket_code: String,
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub status: ReservationStatus,
    pub seat_numbers: Vec<String>,
    pub total_amount: i64,
    pub held_until: Option<DateTime<Utc>>,
    pub payment_status: PaymentStatus,
    pub payment_reference: Option<String>,
    pub ticket_code: Option<String>,
    pub contact_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<Reservation> for BookingResponse {
    fn from(reservation: Reservation) -> Self {
        Self {
            id: reservation.id,
            trip_id: reservation.trip_id,
            status: reservation.status,
            seat_numbers: reservation.seat_numbers,
            total_amount: reservation.total_amount,
            held_until: reservation.held_until,
            payment_status: reservation.payment_status,
            payment_reference: reservation.payment_reference,
            ticket_code: reservation.ticket_code,
            contact_name: reservation.contact.name,
            created_at: reservation.created_at,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings/hold", post(create_hold))
        .route("/v1/bookings/{id}", get(get_booking).delete(cancel_booking))
        .route("/v1/bookings/{id}/confirm", post(confirm_booking))
        .route("/v1/bookings/lookup", post(lookup_booking))
}

fn resolve_requester(
    state: &AppState,
    bearer: &Option<TypedHeader<Authorization<Bearer>>>,
) -> Option<String> {
    bearer
        .as_ref()
        .and_then(|TypedHeader(Authorization(bearer))| {
            state.requester.resolve_requester(bearer.token())
        })
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/bookings/hold
/// Place a time-bounded hold on seats of a scheduled trip.
async fn create_hold(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Json(req): Json<HoldRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), ApiError> {
    let requester = resolve_requester(&state, &bearer);

    let result = state
        .lifecycle
        .create_hold(CreateHoldRequest {
            trip_id: req.trip_id,
            seat_numbers: req.seat_numbers,
            contact: ContactInfo {
                name: req.contact.name,
                phone: req.contact.phone,
                email: Masked(req.contact.email),
            },
            requester,
        })
        .await;

    match result {
        Ok(reservation) => {
            state.metrics.holds_created.inc();
            Ok((StatusCode::CREATED, Json(reservation.into())))
        }
        Err(err) => {
            if matches!(err, ReservationError::Conflict { .. }) {
                state.metrics.seat_conflicts.inc();
            }
            Err(err.into())
        }
    }
}

/// POST /v1/bookings/{id}/confirm
/// Confirm a held booking directly (e.g. counter sale); idempotent.
async fn confirm_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<BookingResponse>, ApiError> {
    let confirmed = state
        .lifecycle
        .confirm(
            booking_id,
            req.paid_amount,
            &req.payment_method,
            &req.payment_reference,
        )
        .await?;

    state.metrics.reservations_confirmed.inc();
    Ok(Json(confirmed.into()))
}

/// DELETE /v1/bookings/{id}
/// Cancel a held or confirmed booking; idempotent.
async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Json<BookingResponse>, ApiError> {
    let requester = resolve_requester(&state, &bearer);
    let cancelled = state
        .lifecycle
        .cancel(booking_id, requester.as_deref())
        .await?;

    state.metrics.reservations_cancelled.inc();
    Ok(Json(cancelled.into()))
}

/// GET /v1/bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, ApiError> {
    let reservation = state
        .reservations
        .get(booking_id)
        .await
        .map_err(ReservationError::from)?
        .ok_or_else(|| {
            ApiError(ReservationError::NotFound(format!(
                "booking {booking_id} not found"
            )))
        })?;
    Ok(Json(reservation.into()))
}

/// POST /v1/bookings/lookup
/// Retrieve a confirmed booking by ticket code plus contact phone. Both must
/// match; a wrong phone looks identical to an unknown code.
async fn lookup_booking(
    State(state): State<AppState>,
    Json(req): Json<LookupRequest>,
) -> Result<Json<BookingResponse>, ApiError> {
    let not_found =
        || ApiError(ReservationError::NotFound("no matching booking".to_string()));

    let reservation = state
        .reservations
        .find_by_ticket_code(&req.ticket_code)
        .await
        .map_err(ReservationError::from)?
        .ok_or_else(not_found)?;

    if reservation.contact.phone != req.phone {
        return Err(not_found());
    }
    Ok(Json(reservation.into()))
}
