use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionAction {
    CheckIn,
    Redeem,
}

impl RedemptionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedemptionAction::CheckIn => "check_in",
            RedemptionAction::Redeem => "redeem",
        }
    }
}

/// Audit row per check-in or redemption event.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TicketRedemption {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub redeemed_by: Uuid,
    pub action: String,
    pub redeemed_at: DateTime<Utc>,
}
