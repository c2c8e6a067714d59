//! Database models for users.

use crate::api::models::users::Role;
use crate::types::UserId;
use chrono::{DateTime, Utc};

/// Database request for creating a new user
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    /// Already lowercased
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Database response for a user
#[derive(Debug, Clone, PartialEq)]
pub struct UserDBResponse {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Expense counts for one user, plus the total of their approved bills
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserStatistics {
    pub total_expenses: i64,
    pub pending_expenses: i64,
    pub approved_expenses: i64,
    pub approved_amount: f64,
}
