//! Settlement calculator.
//!
//! Splits a gross booking amount into platform fee, seller commission, tax,
//! bank commission, other retentions and the provider payout. Pure and
//! deterministic; persistence happens in the lifecycle service.

use crate::models::PaymentMethod;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Settlement percentages, each in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionRates {
    pub platform_fee_rate: Decimal,
    pub seller_commission_rate: Decimal,
    pub tax_rate: Decimal,
    pub bank_commission_rate: Decimal,
    pub other_retentions_rate: Decimal,
}

impl Default for RetentionRates {
    /// Fallback used when no configuration row exists.
    fn default() -> Self {
        Self {
            platform_fee_rate: Decimal::from(5),
            seller_commission_rate: Decimal::from(10),
            tax_rate: Decimal::from(16),
            bank_commission_rate: Decimal::from(3),
            other_retentions_rate: Decimal::from(2),
        }
    }
}

impl RetentionRates {
    pub fn validate(&self) -> Result<(), String> {
        let hundred = Decimal::ONE_HUNDRED;
        for (name, rate) in [
            ("platformFeeRate", self.platform_fee_rate),
            ("sellerCommissionRate", self.seller_commission_rate),
            ("taxRate", self.tax_rate),
            ("bankCommissionRate", self.bank_commission_rate),
            ("otherRetentionsRate", self.other_retentions_rate),
        ] {
            if rate < Decimal::ZERO || rate > hundred {
                return Err(format!("{} must be between 0 and 100", name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub gross_amount: Decimal,
    pub platform_fee: Decimal,
    pub seller_commission: Decimal,
    pub tax_amount: Decimal,
    pub bank_commission: Decimal,
    pub other_retentions: Decimal,
    pub provider_payout: Decimal,
}

fn share(gross: Decimal, rate: Decimal) -> Decimal {
    (gross * rate / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Compute the split for one payment event. Cash payments carry no bank
/// commission. The payout absorbs rounding so the parts always sum to gross.
pub fn compute_settlement(
    gross_amount: Decimal,
    rates: &RetentionRates,
    method: PaymentMethod,
) -> Settlement {
    let platform_fee = share(gross_amount, rates.platform_fee_rate);
    let seller_commission = share(gross_amount, rates.seller_commission_rate);
    let tax_amount = share(gross_amount, rates.tax_rate);
    let bank_commission = match method {
        PaymentMethod::Card => share(gross_amount, rates.bank_commission_rate),
        PaymentMethod::Cash => Decimal::ZERO,
    };
    let other_retentions = share(gross_amount, rates.other_retentions_rate);

    let provider_payout = gross_amount
        - platform_fee
        - seller_commission
        - tax_amount
        - bank_commission
        - other_retentions;

    Settlement {
        gross_amount,
        platform_fee,
        seller_commission,
        tax_amount,
        bank_commission,
        other_retentions,
        provider_payout,
    }
}
