//! Date-level availability overrides (blocked dates, custom capacity).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::tours::{ListOverridesQuery, OverrideResponse, UpsertOverrideRequest};
use crate::dtos::MessageResponse;
use crate::middleware::{owning_business, AuthUser};
use crate::models::UpsertAvailabilityOverride;
use crate::utils::ValidatedJson;
use crate::AppState;

/// GET /api/availability-overrides
pub async fn list_overrides(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Query(query): Query<ListOverridesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let business_id = owning_business(&claims, None)?;
    let overrides = state
        .db
        .list_availability_overrides(query.tour_id, business_id, query.from, query.to)
        .await?;
    Ok(Json(overrides))
}

/// POST /api/availability-overrides
///
/// Blocking a date does not move existing bookings; they are returned so
/// staff can propose new dates.
pub async fn upsert_override(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<UpsertOverrideRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .bookings
        .save_override(
            &claims,
            UpsertAvailabilityOverride {
                tour_id: req.tour_id,
                override_date: req.date,
                is_blocked: req.is_blocked,
                custom_capacity: req.custom_capacity,
                reason: req.reason,
                created_by: Some(claims.sub),
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(OverrideResponse {
            availability_override: outcome.availability_override,
            displaced_bookings: outcome.displaced_bookings,
        }),
    ))
}

/// DELETE /api/availability-overrides/:id
pub async fn delete_override(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(override_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.bookings.delete_override(&claims, override_id).await?;
    Ok(Json(MessageResponse {
        message: "Availability override deleted".to_string(),
    }))
}
