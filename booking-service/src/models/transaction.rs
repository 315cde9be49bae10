use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Settlement ledger entry, one per paid booking. Never updated.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub tour_id: Uuid,
    pub payment_id: Uuid,
    pub payment_method: String,
    pub gross_amount: Decimal,
    pub platform_fee: Decimal,
    pub seller_commission: Decimal,
    pub tax_amount: Decimal,
    pub bank_commission: Decimal,
    pub other_retentions: Decimal,
    pub provider_payout: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Ledger totals over a scope and period.
#[derive(Debug, Clone, Default, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FinancialSummary {
    pub transaction_count: i64,
    pub gross_total: Decimal,
    pub platform_fees: Decimal,
    pub seller_commissions: Decimal,
    pub taxes: Decimal,
    pub bank_commissions: Decimal,
    pub other_retentions: Decimal,
    pub provider_payouts: Decimal,
    pub refunded_total: Decimal,
}
