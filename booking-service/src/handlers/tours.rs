//! Tour catalogue, availability and seat hold handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::ensure_non_negative;
use crate::dtos::tours::{
    AvailabilityQuery, CreateTourRequest, ListToursQuery, SeatHoldRequest, UpdateTourRequest,
};
use crate::middleware::{ensure_tour_access, owning_business, AuthUser, Capability, MaybeAuthUser};
use crate::models::{CreateTour, UpdateTour};
use crate::services::ServiceError;
use crate::utils::ValidatedJson;
use crate::AppState;

/// GET /api/tours
///
/// Inactive tours are listed only for staff who manage tours.
pub async fn list_tours(
    State(state): State<AppState>,
    MaybeAuthUser(claims): MaybeAuthUser,
    Query(query): Query<ListToursQuery>,
) -> Result<impl IntoResponse, AppError> {
    let can_manage = claims
        .as_ref()
        .is_some_and(|c| c.role.can(Capability::ManageTours));
    let active_only = !(query.include_inactive && can_manage);

    let tours = state.db.list_tours(query.business_id, active_only).await?;
    Ok(Json(tours))
}

/// GET /api/tours/:id
pub async fn get_tour(
    State(state): State<AppState>,
    Path(tour_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tour = state
        .db
        .get_tour(tour_id)
        .await?
        .ok_or(ServiceError::TourNotFound)?;
    Ok(Json(tour))
}

/// POST /api/tours
pub async fn create_tour(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateTourRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_non_negative("price", req.price)?;
    if let Some(child_price) = req.child_price {
        ensure_non_negative("childPrice", child_price)?;
    }
    let business_id = owning_business(&claims, req.business_id)?;

    let tour = state
        .db
        .create_tour(&CreateTour {
            business_id,
            seller_id: req.seller_id,
            provider_id: req.provider_id,
            name: req.name,
            description: req.description,
            location: req.location,
            price: req.price,
            child_price: req.child_price,
            capacity: req.capacity,
            departure_time: req.departure_time,
            duration_minutes: req.duration_minutes,
        })
        .await?;

    tracing::info!(tour_id = %tour.id, created_by = %claims.sub, "Tour created");
    Ok((StatusCode::CREATED, Json(tour)))
}

/// PUT /api/tours/:id
pub async fn update_tour(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(tour_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateTourRequest>,
) -> Result<impl IntoResponse, AppError> {
    for (field, value) in [("price", req.price), ("childPrice", req.child_price)] {
        if let Some(value) = value {
            ensure_non_negative(field, value)?;
        }
    }

    let existing = state
        .db
        .get_tour(tour_id)
        .await?
        .ok_or(ServiceError::TourNotFound)?;
    ensure_tour_access(&claims, &existing)?;

    let tour = state
        .db
        .update_tour(
            tour_id,
            &UpdateTour {
                seller_id: req.seller_id,
                provider_id: req.provider_id,
                name: req.name,
                description: req.description,
                location: req.location,
                price: req.price,
                child_price: req.child_price,
                capacity: req.capacity,
                departure_time: req.departure_time,
                duration_minutes: req.duration_minutes,
                is_active: req.is_active,
            },
        )
        .await?
        .ok_or(ServiceError::TourNotFound)?;

    tracing::info!(tour_id = %tour.id, updated_by = %claims.sub, "Tour updated");
    Ok(Json(tour))
}

/// GET /api/tours/:id/availability?date=YYYY-MM-DD
pub async fn tour_availability(
    State(state): State<AppState>,
    Path(tour_id): Path<Uuid>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<impl IntoResponse, AppError> {
    let availability = state.bookings.availability(tour_id, query.date).await?;
    Ok(Json(availability))
}

/// POST /api/seat-holds
pub async fn create_seat_hold(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SeatHoldRequest>,
) -> Result<impl IntoResponse, AppError> {
    let hold = state
        .bookings
        .place_seat_hold(req.tour_id, req.date, req.seats)
        .await?;
    Ok((StatusCode::CREATED, Json(hold)))
}
