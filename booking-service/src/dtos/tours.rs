use crate::models::{AvailabilityOverride, Booking};
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTourRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    #[validate(length(max = 5000))]
    pub description: Option<String>,

    #[validate(length(min = 1, max = 200, message = "Location is required"))]
    pub location: String,

    pub price: Decimal,
    pub child_price: Option<Decimal>,

    #[validate(range(min = 1, max = 10000, message = "Capacity must be between 1 and 10000"))]
    pub capacity: i32,

    pub departure_time: Option<NaiveTime>,

    #[validate(range(min = 1, message = "Duration must be positive"))]
    pub duration_minutes: Option<i32>,

    /// Only honoured for master admins; business staff create tours for
    /// their own business.
    pub business_id: Option<Uuid>,
    pub seller_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTourRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,

    #[validate(length(max = 5000))]
    pub description: Option<String>,

    #[validate(length(min = 1, max = 200))]
    pub location: Option<String>,

    pub price: Option<Decimal>,
    pub child_price: Option<Decimal>,

    #[validate(range(min = 1, max = 10000))]
    pub capacity: Option<i32>,

    pub departure_time: Option<NaiveTime>,

    #[validate(range(min = 1))]
    pub duration_minutes: Option<i32>,

    pub seller_id: Option<Uuid>,
    pub provider_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToursQuery {
    pub business_id: Option<Uuid>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SeatHoldRequest {
    pub tour_id: Uuid,
    pub date: NaiveDate,

    #[validate(range(min = 1, max = 100, message = "Seats must be between 1 and 100"))]
    pub seats: i32,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOverrideRequest {
    pub tour_id: Uuid,
    pub date: NaiveDate,
    #[serde(default)]
    pub is_blocked: bool,

    #[validate(range(min = 0, max = 10000))]
    pub custom_capacity: Option<i32>,

    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOverridesQuery {
    pub tour_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideResponse {
    pub availability_override: AvailabilityOverride,
    /// Bookings on a newly blocked date that need a reschedule proposal.
    pub displaced_bookings: Vec<Booking>,
}
