//! Coupon and referral handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use rust_decimal::Decimal;
use service_core::error::AppError;

use crate::dtos::ensure_non_negative;
use crate::dtos::promotions::{
    CouponPreviewResponse, CreateCouponRequest, ReferralCodeResponse, ValidateCouponRequest,
};
use crate::middleware::{owning_business, AuthUser};
use crate::models::{CreateCoupon, DiscountType};
use crate::utils::ValidatedJson;
use crate::AppState;

/// POST /api/coupons
pub async fn create_coupon(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateCouponRequest>,
) -> Result<impl IntoResponse, AppError> {
    ensure_non_negative("discountValue", req.discount_value)?;
    if req.discount_type == DiscountType::Percent && req.discount_value > Decimal::ONE_HUNDRED {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Percentage discount cannot exceed 100"
        )));
    }
    let business_id = owning_business(&claims, req.business_id)?;

    let coupon = state
        .db
        .create_coupon(&CreateCoupon {
            code: req.code,
            discount_type: req.discount_type,
            discount_value: req.discount_value,
            expiration_date: req.expiration_date,
            usage_limit: req.usage_limit,
            business_id,
        })
        .await?;

    tracing::info!(coupon_code = %coupon.code, created_by = %claims.sub, "Coupon created");
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// GET /api/coupons
pub async fn list_coupons(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let business_id = owning_business(&claims, None)?;
    let coupons = state.db.list_coupons(business_id).await?;
    Ok(Json(coupons))
}

/// POST /api/coupons/validate
///
/// Preview only; no use is consumed.
pub async fn validate_coupon(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ValidateCouponRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(amount) = req.amount {
        ensure_non_negative("amount", amount)?;
    }

    let (coupon, final_amount) = state
        .bookings
        .preview_coupon(&req.code, req.tour_id, req.amount)
        .await?;

    Ok(Json(CouponPreviewResponse {
        valid: true,
        coupon,
        final_amount,
    }))
}

/// POST /api/referrals/generate
pub async fn generate_referral_code(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let code = state.bookings.generate_referral_code(claims.sub).await?;
    Ok(Json(ReferralCodeResponse {
        referral_code: Some(code),
    }))
}

/// GET /api/referrals/my-code
pub async fn my_referral_code(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let referral_code = state.bookings.referral_code(claims.sub).await?;
    Ok(Json(ReferralCodeResponse { referral_code }))
}

/// GET /api/referrals/stats
pub async fn referral_stats(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.db.referral_stats(claims.sub).await?;
    Ok(Json(stats))
}
