use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Per-tour, per-date block or capacity change.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityOverride {
    pub id: Uuid,
    pub tour_id: Uuid,
    pub override_date: NaiveDate,
    pub is_blocked: bool,
    pub custom_capacity: Option<i32>,
    pub reason: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpsertAvailabilityOverride {
    pub tour_id: Uuid,
    pub override_date: NaiveDate,
    pub is_blocked: bool,
    pub custom_capacity: Option<i32>,
    pub reason: Option<String>,
    pub created_by: Option<Uuid>,
}
