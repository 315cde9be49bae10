use crate::models::PaymentStatus;
use crate::services::settlement::RetentionRates;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPaymentsQuery {
    pub status: Option<PaymentStatus>,
    pub booking_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRetentionRequest {
    pub platform_fee_rate: Decimal,
    pub seller_commission_rate: Decimal,
    pub tax_rate: Decimal,
    pub bank_commission_rate: Decimal,
    pub other_retentions_rate: Decimal,
}

impl From<UpdateRetentionRequest> for RetentionRates {
    fn from(req: UpdateRetentionRequest) -> Self {
        RetentionRates {
            platform_fee_rate: req.platform_fee_rate,
            seller_commission_rate: req.seller_commission_rate,
            tax_rate: req.tax_rate,
            bank_commission_rate: req.bank_commission_rate,
            other_retentions_rate: req.other_retentions_rate,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBusinessRequest {
    #[validate(length(min = 1, max = 200, message = "Name is required"))]
    pub name: String,

    #[validate(email(message = "Invalid email format"))]
    pub contact_email: Option<String>,
}

/// `to` is exclusive.
#[derive(Debug, Default, Deserialize)]
pub struct FinancialSummaryQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}
