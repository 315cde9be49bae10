use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;

use crate::services::settlement::RetentionRates;

/// Singleton row (id = 1) with the current settlement percentages.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RetentionConfig {
    pub platform_fee_rate: Decimal,
    pub seller_commission_rate: Decimal,
    pub tax_rate: Decimal,
    pub bank_commission_rate: Decimal,
    pub other_retentions_rate: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl RetentionConfig {
    pub fn rates(&self) -> RetentionRates {
        RetentionRates {
            platform_fee_rate: self.platform_fee_rate,
            seller_commission_rate: self.seller_commission_rate,
            tax_rate: self.tax_rate,
            bank_commission_rate: self.bank_commission_rate,
            other_retentions_rate: self.other_retentions_rate,
        }
    }
}
