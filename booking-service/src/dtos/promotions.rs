use crate::models::{Coupon, DiscountType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCouponRequest {
    #[validate(length(min = 3, max = 32, message = "Code must be 3-32 characters"))]
    pub code: String,

    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub expiration_date: Option<DateTime<Utc>>,

    #[validate(range(min = 1, message = "Usage limit must be positive"))]
    pub usage_limit: Option<i32>,

    /// Only honoured for master admins.
    pub business_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, message = "Code is required"))]
    pub code: String,

    pub tour_id: Option<Uuid>,
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponPreviewResponse {
    pub valid: bool,
    pub coupon: Coupon,
    pub final_amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralCodeResponse {
    pub referral_code: Option<String>,
}
