//! Staff-side ticket scanning and redemption.

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use service_core::error::AppError;

use crate::dtos::tickets::{RedeemTicketRequest, ValidateTicketCodeRequest, ValidateTicketRequest};
use crate::middleware::AuthUser;
use crate::services::lifecycle::TicketRef;
use crate::utils::ValidatedJson;
use crate::AppState;

/// POST /api/validate-ticket
pub async fn validate_ticket(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<ValidateTicketRequest>,
) -> Result<impl IntoResponse, AppError> {
    let validation = state
        .bookings
        .validate_ticket(&claims, TicketRef::Qr(req.qr_code.trim()))
        .await?;
    Ok(Json(validation))
}

/// POST /api/validate-ticket-code
pub async fn validate_ticket_code(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<ValidateTicketCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let validation = state
        .bookings
        .validate_ticket(&claims, TicketRef::Code(req.code.trim()))
        .await?;
    Ok(Json(validation))
}

/// POST /api/redeem-ticket
pub async fn redeem_ticket(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<RedeemTicketRequest>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state.bookings.redeem_ticket(&claims, req.code.trim()).await?;
    Ok(Json(json!({ "success": true, "booking": booking })))
}
