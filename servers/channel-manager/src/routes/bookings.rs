//! Direct-booking HTTP surface: create a hold, confirm it, cancel it, read
//! it back, and check availability ahead of time. Thin wrappers over
//! [`reservations::booking`] — all the actual orchestration lives there.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use common::AppError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use db::models::CanonicalBooking;
use reservations::{CreateBookingOutcome, CreateBookingRequest};

use crate::errors::reservation_error;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create))
        .route("/check-availability", post(check_availability))
        .route("/{id}", get(get_booking))
        .route("/{id}/confirm", post(confirm))
        .route("/{id}/cancel", post(cancel))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBookingRequestBody {
    pub property_id: Uuid,
    pub guest_email: Option<String>,
    pub guest_name: String,
    pub guest_phone: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default = "default_adults")]
    pub adults: i32,
    #[serde(default)]
    pub children: i32,
    #[serde(default)]
    pub infants: i32,
}

fn default_adults() -> i32 {
    1
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateBookingResponse {
    pub booking: CanonicalBooking,
    pub client_secret: Option<String>,
}

impl From<CreateBookingOutcome> for CreateBookingResponse {
    fn from(outcome: CreateBookingOutcome) -> Self {
        Self {
            booking: outcome.booking,
            client_secret: outcome.client_secret,
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/bookings",
    request_body = CreateBookingRequestBody,
    responses(
        (status = 201, description = "Tentative booking created", body = CreateBookingResponse),
        (status = 409, description = "Requested dates are unavailable", body = common::ErrorResponse),
    ),
    tag = "Bookings"
)]
async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateBookingRequestBody>,
) -> Result<Json<CreateBookingResponse>, AppError> {
    let outcome = reservations::create_booking(
        &state.reservations,
        CreateBookingRequest {
            property_id: body.property_id,
            guest_email: body.guest_email,
            guest_name: body.guest_name,
            guest_phone: body.guest_phone,
            check_in: body.check_in,
            check_out: body.check_out,
            adults: body.adults,
            children: body.children,
            infants: body.infants,
        },
    )
    .await
    .map_err(reservation_error)?;

    Ok(Json(outcome.into()))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmBookingRequest {
    pub payment_intent_id: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/bookings/{id}/confirm",
    params(("id" = Uuid, Path, description = "Booking id")),
    request_body = ConfirmBookingRequest,
    responses((status = 200, description = "Booking confirmed", body = CanonicalBooking)),
    tag = "Bookings"
)]
async fn confirm(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ConfirmBookingRequest>,
) -> Result<Json<CanonicalBooking>, AppError> {
    let booking = reservations::confirm_booking(&state.reservations, id, &body.payment_intent_id)
        .await
        .map_err(reservation_error)?;
    Ok(Json(booking))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelBookingRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/bookings/{id}/cancel",
    params(("id" = Uuid, Path, description = "Booking id")),
    request_body = CancelBookingRequest,
    responses((status = 200, description = "Booking cancelled", body = CanonicalBooking)),
    tag = "Bookings"
)]
async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CancelBookingRequest>,
) -> Result<Json<CanonicalBooking>, AppError> {
    let booking = reservations::cancel_booking(&state.reservations, id, body.reason)
        .await
        .map_err(reservation_error)?;
    Ok(Json(booking))
}

#[utoipa::path(
    get,
    path = "/api/v1/bookings/{id}",
    params(("id" = Uuid, Path, description = "Booking id")),
    responses((status = 200, description = "Booking", body = CanonicalBooking)),
    tag = "Bookings"
)]
async fn get_booking(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<CanonicalBooking>, AppError> {
    let booking = state
        .reservations
        .reservations
        .find_by_id(id)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
    Ok(Json(booking))
}

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct CheckAvailabilityQuery {
    pub property_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AvailabilityResponse {
    pub available: bool,
}

#[utoipa::path(
    post,
    path = "/api/v1/bookings/check-availability",
    params(CheckAvailabilityQuery),
    responses((status = 200, description = "Availability", body = AvailabilityResponse)),
    tag = "Bookings"
)]
async fn check_availability(
    State(state): State<AppState>,
    Query(query): Query<CheckAvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let available = reservations::check_availability(&state.reservations, query.property_id, query.check_in, query.check_out)
        .await
        .map_err(reservation_error)?;
    Ok(Json(AvailabilityResponse { available }))
}
