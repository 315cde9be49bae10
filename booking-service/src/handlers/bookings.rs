//! Booking handlers: creation, listing, payment, check-in and reschedule.
//!
//! Reads by booking id, checkout and payment verification are public so a
//! guest can pay for the booking they just made.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::bookings::{
    CheckInResponse, CheckoutResponse, CreateBookingRequest, ListBookingsQuery,
    ProposeRescheduleRequest, ResolveRescheduleRequest, VerifyPaymentRequest,
};
use crate::middleware::{booking_scope, AuthUser, MaybeAuthUser};
use crate::models::ListBookingsFilter;
use crate::utils::ValidatedJson;
use crate::AppState;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

/// POST /api/bookings
pub async fn create_booking(
    State(state): State<AppState>,
    MaybeAuthUser(claims): MaybeAuthUser,
    ValidatedJson(req): ValidatedJson<CreateBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state.bookings.create_booking(&req, claims.as_ref()).await?;

    tracing::info!(
        booking_id = %booking.id,
        tour_id = %booking.tour_id,
        status = %booking.status,
        discount_source = %booking.discount_source,
        "Booking created"
    );

    Ok((StatusCode::CREATED, Json(booking)))
}

/// GET /api/bookings
pub async fn list_bookings(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Query(query): Query<ListBookingsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = ListBookingsFilter {
        status: query.status,
        tour_id: query.tour_id,
        from_date: query.from,
        to_date: query.to,
        limit: query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        offset: query.offset.unwrap_or(0).max(0),
    };

    let bookings = state
        .db
        .list_bookings(booking_scope(&claims), &filter)
        .await?;
    Ok(Json(bookings))
}

/// GET /api/bookings/:id
pub async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state.bookings.get_booking(booking_id).await?;
    Ok(Json(booking))
}

/// POST /api/bookings/:id/checkout
pub async fn checkout(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.bookings.start_checkout(booking_id).await?;
    Ok(Json(CheckoutResponse {
        session_id: session.session_id,
        url: session.url,
    }))
}

/// POST /api/bookings/:id/verify-payment
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<VerifyPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .bookings
        .verify_payment(booking_id, &req.session_id)
        .await?;
    Ok(Json(result))
}

/// POST /api/bookings/:id/confirm-cash-payment
pub async fn confirm_cash_payment(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let result = state
        .bookings
        .confirm_cash_payment(&claims, booking_id)
        .await?;

    tracing::info!(
        booking_id = %booking_id,
        payment_id = %result.payment.id,
        confirmed_by = %claims.sub,
        "Cash payment confirmed"
    );
    Ok(Json(result))
}

/// POST /api/bookings/:id/check-in
pub async fn check_in(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.bookings.check_in(&claims, booking_id).await?;

    Ok(Json(CheckInResponse {
        success: true,
        already_checked_in: result.already_checked_in,
        checked_in_at: result.booking.checked_in_at,
        booking: result.booking,
    }))
}

/// GET /api/bookings/qr/:code
pub async fn ticket_by_qr(
    State(state): State<AppState>,
    Path(qr_code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let ticket = state.bookings.lookup_ticket(&qr_code).await?;
    Ok(Json(ticket))
}

/// POST /api/bookings/:id/propose-reschedule
pub async fn propose_reschedule(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(booking_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<ProposeRescheduleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let proposal = state
        .bookings
        .propose_reschedule(&claims, booking_id, req.proposed_date, req.reason.as_deref())
        .await?;
    Ok(Json(proposal))
}

/// GET /api/bookings/resolve/:token
pub async fn reschedule_details(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let details = state.bookings.reschedule_details(&token).await?;
    Ok(Json(details))
}

/// POST /api/bookings/resolve/:token
pub async fn resolve_reschedule(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<ResolveRescheduleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state.bookings.resolve_reschedule(&token, &req).await?;

    tracing::info!(booking_id = %booking.id, new_date = %booking.booking_date, "Reschedule resolved");
    Ok(Json(json!({ "success": true, "booking": booking })))
}
