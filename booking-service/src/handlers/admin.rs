//! Master admin and reporting handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::admin::{
    CreateBusinessRequest, FinancialSummaryQuery, ListPaymentsQuery, UpdateRetentionRequest,
};
use crate::middleware::{booking_scope, AuthUser};
use crate::models::CreateBusiness;
use crate::services::settlement::RetentionRates;
use crate::utils::ValidatedJson;
use crate::AppState;

/// GET /api/admin/payments
pub async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let payments = state
        .db
        .list_payments(
            query.status,
            query.booking_id,
            query.limit.unwrap_or(50).clamp(1, 200),
            query.offset.unwrap_or(0).max(0),
        )
        .await?;
    Ok(Json(payments))
}

/// POST /api/admin/payments/:id/refund
pub async fn refund_payment(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let result = state.bookings.refund_payment(payment_id).await?;

    tracing::info!(
        payment_id = %payment_id,
        booking_id = %result.booking.id,
        refunded_by = %claims.sub,
        "Refund issued"
    );
    Ok(Json(result))
}

/// GET /api/admin/retention-config
pub async fn get_retention_config(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let rates = state.bookings.retention_rates().await?;
    Ok(Json(rates))
}

/// PUT /api/admin/retention-config
pub async fn update_retention_config(
    State(state): State<AppState>,
    Json(req): Json<UpdateRetentionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let config = state
        .bookings
        .update_retention(RetentionRates::from(req))
        .await?;
    Ok(Json(config))
}

/// GET /api/businesses
pub async fn list_businesses(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let businesses = state.db.list_businesses().await?;
    Ok(Json(businesses))
}

/// POST /api/businesses
pub async fn create_business(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateBusinessRequest>,
) -> Result<impl IntoResponse, AppError> {
    let business = state
        .db
        .create_business(&CreateBusiness {
            name: req.name.trim().to_string(),
            contact_email: req.contact_email,
        })
        .await?;

    tracing::info!(business_id = %business.id, "Business created");
    Ok((StatusCode::CREATED, Json(business)))
}

/// GET /api/financial-summary?from=&to=
pub async fn financial_summary(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Query(query): Query<FinancialSummaryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let summary = state
        .db
        .financial_summary(booking_scope(&claims), query.from, query.to)
        .await?;
    Ok(Json(summary))
}
