//! User accounts and roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Business,
    Manager,
    Seller,
    MasterAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Business => "business",
            Role::Manager => "manager",
            Role::Seller => "seller",
            Role::MasterAdmin => "master_admin",
        }
    }

    /// Unknown strings map to the least privileged role.
    pub fn from_string(s: &str) -> Self {
        match s {
            "business" => Role::Business,
            "manager" => Role::Manager,
            "seller" => Role::Seller,
            "master_admin" => Role::MasterAdmin,
            _ => Role::Customer,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub business_id: Option<Uuid>,
    pub referral_code: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Role {
        Role::from_string(&self.role)
    }

    pub fn sanitized(&self) -> SanitizedUser {
        SanitizedUser {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role(),
            business_id: self.business_id,
            referral_code: self.referral_code.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub role: Role,
    pub business_id: Option<Uuid>,
}

/// User representation safe to return to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedUser {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub business_id: Option<Uuid>,
    pub referral_code: Option<String>,
    pub created_at: DateTime<Utc>,
}
