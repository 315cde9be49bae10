use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: Uuid,
    pub business_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub location: String,
    pub price: Decimal,
    pub child_price: Option<Decimal>,
    pub capacity: i32,
    pub departure_time: Option<NaiveTime>,
    pub duration_minutes: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tour {
    /// Gross price for a party. Children pay `child_price` when set.
    pub fn gross_for(&self, adults: i32, children: i32) -> Decimal {
        let child_price = self.child_price.unwrap_or(self.price);
        self.price * Decimal::from(adults) + child_price * Decimal::from(children)
    }
}

#[derive(Debug, Clone)]
pub struct CreateTour {
    pub business_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub location: String,
    pub price: Decimal,
    pub child_price: Option<Decimal>,
    pub capacity: i32,
    pub departure_time: Option<NaiveTime>,
    pub duration_minutes: Option<i32>,
}

/// Partial update; `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateTour {
    pub seller_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub price: Option<Decimal>,
    pub child_price: Option<Decimal>,
    pub capacity: Option<i32>,
    pub departure_time: Option<NaiveTime>,
    pub duration_minutes: Option<i32>,
    pub is_active: Option<bool>,
}
