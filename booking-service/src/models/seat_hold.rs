use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Short-lived seat reservation taken while a customer checks out.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SeatHold {
    pub id: Uuid,
    pub tour_id: Uuid,
    pub hold_date: NaiveDate,
    pub seats: i32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
