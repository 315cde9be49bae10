use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    Percent,
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percent => "percent",
            DiscountType::Fixed => "fixed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "percent" => DiscountType::Percent,
            _ => DiscountType::Fixed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub discount_type: String,
    pub discount_value: Decimal,
    pub expiration_date: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub is_active: bool,
    pub business_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    pub fn discount_type(&self) -> DiscountType {
        DiscountType::from_string(&self.discount_type)
    }

    /// Active, unexpired and under its usage limit.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.expiration_date.map_or(true, |exp| exp > now)
            && self.usage_limit.map_or(true, |limit| self.usage_count < limit)
    }

    /// Business-scoped coupons only apply to that business's tours.
    pub fn applies_to(&self, business_id: Option<Uuid>) -> bool {
        match self.business_id {
            None => true,
            Some(scope) => business_id == Some(scope),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateCoupon {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub expiration_date: Option<DateTime<Utc>>,
    pub usage_limit: Option<i32>,
    pub business_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon() -> Coupon {
        Coupon {
            id: Uuid::new_v4(),
            code: "SPRING20".to_string(),
            discount_type: "percent".to_string(),
            discount_value: Decimal::from(20),
            expiration_date: None,
            usage_limit: Some(3),
            usage_count: 0,
            is_active: true,
            business_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_usable_under_limit() {
        assert!(coupon().is_usable(Utc::now()));
    }

    #[test]
    fn test_exhausted_at_limit() {
        let mut c = coupon();
        c.usage_count = 3;
        assert!(!c.is_usable(Utc::now()));
    }

    #[test]
    fn test_expired_and_inactive() {
        let now = Utc::now();
        let mut c = coupon();
        c.expiration_date = Some(now - Duration::minutes(1));
        assert!(!c.is_usable(now));

        let mut c = coupon();
        c.is_active = false;
        assert!(!c.is_usable(now));
    }

    #[test]
    fn test_unlimited_when_no_limit() {
        let mut c = coupon();
        c.usage_limit = None;
        c.usage_count = 10_000;
        assert!(c.is_usable(Utc::now()));
    }

    #[test]
    fn test_business_scope() {
        let business = Uuid::new_v4();
        let mut c = coupon();
        assert!(c.applies_to(None));
        c.business_id = Some(business);
        assert!(c.applies_to(Some(business)));
        assert!(!c.applies_to(Some(Uuid::new_v4())));
        assert!(!c.applies_to(None));
    }
}
