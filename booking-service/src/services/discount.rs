//! Discount resolver.
//!
//! A code is first tried as a coupon, then as a referral code. The two never
//! stack: a coupon that applies suppresses the referral lookup.

use crate::models::{Coupon, DiscountSource, DiscountType, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::AppError;
use uuid::Uuid;

/// Percentage taken off the gross amount for a referral booking.
pub const REFERRAL_DISCOUNT_PERCENT: u32 = 10;
/// Percentage of the original gross amount owed to the referrer.
pub const REFERRAL_REWARD_PERCENT: u32 = 5;

/// Storage operations the resolver needs.
#[async_trait]
pub trait DiscountLookup: Send + Sync {
    /// Atomically take one use of a usable coupon. `None` when the code is
    /// unknown, inactive, expired, exhausted or scoped to another business.
    async fn claim_coupon(
        &self,
        code: &str,
        business_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<Coupon>, AppError>;

    /// Give back a use taken by `claim_coupon`.
    async fn release_coupon(&self, coupon_id: Uuid) -> Result<(), AppError>;

    /// Active user owning a referral code.
    async fn find_referrer(&self, referral_code: &str) -> Result<Option<User>, AppError>;
}

/// Referral row the caller must create once the booking exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingReferral {
    pub referrer_id: Uuid,
    pub reward_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscountOutcome {
    pub final_amount: Decimal,
    pub applied_via: DiscountSource,
    pub coupon: Option<Coupon>,
    pub referral: Option<PendingReferral>,
}

impl DiscountOutcome {
    pub fn none(gross_amount: Decimal) -> Self {
        Self {
            final_amount: gross_amount,
            applied_via: DiscountSource::None,
            coupon: None,
            referral: None,
        }
    }
}

fn money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Apply a coupon's discount to a gross amount, floored at zero.
pub fn apply_coupon(gross_amount: Decimal, discount_type: DiscountType, value: Decimal) -> Decimal {
    let discounted = match discount_type {
        DiscountType::Percent => {
            gross_amount * (Decimal::ONE - value / Decimal::ONE_HUNDRED)
        }
        DiscountType::Fixed => gross_amount - value,
    };
    money(discounted.max(Decimal::ZERO))
}

pub fn referral_final_amount(gross_amount: Decimal) -> Decimal {
    let keep = Decimal::ONE_HUNDRED - Decimal::from(REFERRAL_DISCOUNT_PERCENT);
    money(gross_amount * keep / Decimal::ONE_HUNDRED)
}

pub fn referral_reward(gross_amount: Decimal) -> Decimal {
    money(gross_amount * Decimal::from(REFERRAL_REWARD_PERCENT) / Decimal::ONE_HUNDRED)
}

/// Resolve a discount code against a gross amount.
///
/// A matching coupon consumes one use as a side effect. Unknown or unusable
/// codes resolve to no discount. A referral code owned by the requesting
/// user is ignored.
pub async fn resolve_discount(
    lookup: &dyn DiscountLookup,
    code: Option<&str>,
    gross_amount: Decimal,
    requesting_user_id: Option<Uuid>,
    business_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<DiscountOutcome, AppError> {
    let code = match code.map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => code,
        None => return Ok(DiscountOutcome::none(gross_amount)),
    };

    if let Some(coupon) = lookup.claim_coupon(code, business_id, now).await? {
        let final_amount =
            apply_coupon(gross_amount, coupon.discount_type(), coupon.discount_value);
        tracing::info!(
            coupon_code = %coupon.code,
            gross = %gross_amount,
            final_amount = %final_amount,
            "Coupon applied"
        );
        return Ok(DiscountOutcome {
            final_amount,
            applied_via: DiscountSource::Coupon,
            coupon: Some(coupon),
            referral: None,
        });
    }

    if let Some(referrer) = lookup.find_referrer(code).await? {
        if requesting_user_id == Some(referrer.id) {
            tracing::warn!(user_id = %referrer.id, "Self-referral ignored");
            return Ok(DiscountOutcome::none(gross_amount));
        }

        let final_amount = referral_final_amount(gross_amount);
        tracing::info!(
            referrer_id = %referrer.id,
            gross = %gross_amount,
            final_amount = %final_amount,
            "Referral discount applied"
        );
        return Ok(DiscountOutcome {
            final_amount,
            applied_via: DiscountSource::Referral,
            coupon: None,
            referral: Some(PendingReferral {
                referrer_id: referrer.id,
                reward_amount: referral_reward(gross_amount),
            }),
        });
    }

    tracing::debug!(code = %code, "Discount code did not match a coupon or referral");
    Ok(DiscountOutcome::none(gross_amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct InMemoryLookup {
        coupons: Mutex<Vec<Coupon>>,
        users: Vec<User>,
    }

    impl InMemoryLookup {
        fn new(coupons: Vec<Coupon>, users: Vec<User>) -> Self {
            Self {
                coupons: Mutex::new(coupons),
                users,
            }
        }

        fn usage_count(&self, code: &str) -> i32 {
            self.coupons
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.code == code)
                .map(|c| c.usage_count)
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl DiscountLookup for InMemoryLookup {
        async fn claim_coupon(
            &self,
            code: &str,
            business_id: Option<Uuid>,
            now: DateTime<Utc>,
        ) -> Result<Option<Coupon>, AppError> {
            let mut coupons = self.coupons.lock().unwrap();
            let found = coupons
                .iter_mut()
                .find(|c| c.code == code && c.is_usable(now) && c.applies_to(business_id));
            Ok(found.map(|c| {
                c.usage_count += 1;
                c.clone()
            }))
        }

        async fn release_coupon(&self, coupon_id: Uuid) -> Result<(), AppError> {
            let mut coupons = self.coupons.lock().unwrap();
            if let Some(c) = coupons.iter_mut().find(|c| c.id == coupon_id) {
                c.usage_count -= 1;
            }
            Ok(())
        }

        async fn find_referrer(&self, referral_code: &str) -> Result<Option<User>, AppError> {
            Ok(self
                .users
                .iter()
                .find(|u| u.is_active && u.referral_code.as_deref() == Some(referral_code))
                .cloned())
        }
    }

    fn coupon(code: &str, discount_type: &str, value: i64, limit: Option<i32>) -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: code.to_string(),
            discount_type: discount_type.to_string(),
            discount_value: Decimal::from(value),
            expiration_date: None,
            usage_limit: limit,
            usage_count: 0,
            is_active: true,
            business_id: None,
            created_at: Utc::now(),
        }
    }

    fn referrer(code: &str) -> User {
        User {
            id: Uuid::new_v4(),
            username: "referrer".to_string(),
            email: None,
            password_hash: String::new(),
            role: "customer".to_string(),
            business_id: None,
            referral_code: Some(code.to_string()),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_percent_coupon() {
        assert_eq!(
            apply_coupon(Decimal::from(1000), DiscountType::Percent, Decimal::from(20)),
            Decimal::from(800)
        );
    }

    #[test]
    fn test_fixed_coupon() {
        assert_eq!(
            apply_coupon(Decimal::from(1000), DiscountType::Fixed, Decimal::from(150)),
            Decimal::from(850)
        );
    }

    #[test]
    fn test_fixed_coupon_floors_at_zero() {
        assert_eq!(
            apply_coupon(Decimal::from(100), DiscountType::Fixed, Decimal::from(150)),
            Decimal::ZERO
        );
    }

    #[test]
    fn test_referral_amounts() {
        assert_eq!(referral_final_amount(Decimal::from(1000)), Decimal::from(900));
        assert_eq!(referral_reward(Decimal::from(1000)), Decimal::from(50));
    }

    #[tokio::test]
    async fn test_coupon_consumes_a_use() {
        let lookup = InMemoryLookup::new(vec![coupon("SPRING20", "percent", 20, Some(5))], vec![]);
        let outcome = resolve_discount(
            &lookup,
            Some("SPRING20"),
            Decimal::from(1000),
            None,
            None,
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.final_amount, Decimal::from(800));
        assert_eq!(outcome.applied_via, DiscountSource::Coupon);
        assert_eq!(lookup.usage_count("SPRING20"), 1);
    }

    #[tokio::test]
    async fn test_exhausted_coupon_is_rejected() {
        let mut c = coupon("LAST", "fixed", 100, Some(1));
        c.usage_count = 1;
        let lookup = InMemoryLookup::new(vec![c], vec![]);
        let outcome = resolve_discount(
            &lookup,
            Some("LAST"),
            Decimal::from(500),
            None,
            None,
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.applied_via, DiscountSource::None);
        assert_eq!(outcome.final_amount, Decimal::from(500));
    }

    #[tokio::test]
    async fn test_referral_applies_ten_percent_and_reward() {
        let user = referrer("REFABC123");
        let referrer_id = user.id;
        let lookup = InMemoryLookup::new(vec![], vec![user]);
        let outcome = resolve_discount(
            &lookup,
            Some("REFABC123"),
            Decimal::from(1000),
            Some(Uuid::new_v4()),
            None,
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.applied_via, DiscountSource::Referral);
        assert_eq!(outcome.final_amount, Decimal::from(900));
        assert_eq!(
            outcome.referral,
            Some(PendingReferral {
                referrer_id,
                reward_amount: Decimal::from(50),
            })
        );
    }

    #[tokio::test]
    async fn test_self_referral_is_ignored() {
        let user = referrer("REFSELF00");
        let own_id = user.id;
        let lookup = InMemoryLookup::new(vec![], vec![user]);
        let outcome = resolve_discount(
            &lookup,
            Some("REFSELF00"),
            Decimal::from(1000),
            Some(own_id),
            None,
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, DiscountOutcome::none(Decimal::from(1000)));
    }

    #[tokio::test]
    async fn test_coupon_takes_precedence_over_referral() {
        let lookup = InMemoryLookup::new(
            vec![coupon("SHARED", "fixed", 100, None)],
            vec![referrer("SHARED")],
        );
        let outcome = resolve_discount(
            &lookup,
            Some("SHARED"),
            Decimal::from(1000),
            None,
            None,
            Utc::now(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.applied_via, DiscountSource::Coupon);
        assert_eq!(outcome.final_amount, Decimal::from(900));
        assert!(outcome.referral.is_none());
    }

    #[tokio::test]
    async fn test_unknown_and_blank_codes() {
        let lookup = InMemoryLookup::new(vec![], vec![]);
        for code in [Some("NOPE"), Some("   "), None] {
            let outcome = resolve_discount(
                &lookup,
                code,
                Decimal::from(300),
                None,
                None,
                Utc::now(),
            )
            .await
            .unwrap();
            assert_eq!(outcome, DiscountOutcome::none(Decimal::from(300)));
        }
    }
}
