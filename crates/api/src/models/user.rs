//! User domain types.
//!
//! These types represent validated domain objects separate from database row types.

use chrono::{DateTime, Utc};
use electomart_core::{Email, UserId, UserRole};
use serde::{Deserialize, Serialize};

/// An Electomart account. Never carries the password hash.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    pub name: String,
    /// Login email, unique.
    pub email: Email,
    pub role: UserRole,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `PUT /api/users/me`; absent fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
}

/// Body of `PUT /api/users/{id}/role`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateRole {
    pub role: UserRole,
}

/// Query string of the admin user list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Response of the paginated admin user list.
#[derive(Debug, Serialize)]
pub struct UserPage {
    pub users: Vec<User>,
    pub page: u32,
    pub pages: u64,
    pub total: u64,
}
