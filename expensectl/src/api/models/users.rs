//! API request/response models for users.

use crate::db::models::users::{UserDBResponse, UserStatistics};
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Account role. `HR` sees every expense and may change statuses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Hr,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Hr => "HR",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ();

    /// Exact, uppercase match only.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Role::User),
            "HR" => Ok(Role::Hr),
            _ => Err(()),
        }
    }
}

/// The authenticated caller, as carried by the session token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_hr(&self) -> bool {
        self.role == Role::Hr
    }
}

impl From<&UserDBResponse> for CurrentUser {
    fn from(user: &UserDBResponse) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProfileUpdate {
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PasswordChange {
    #[serde(alias = "current_password")]
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

/// `{user_id, email, role}` as returned by registration and login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSummary {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
}

impl From<&UserDBResponse> for UserSummary {
    fn from(user: &UserDBResponse) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatisticsResponse {
    pub total_expenses: i64,
    pub pending_expenses: i64,
    pub approved_expenses: i64,
    /// Only in the HR user listing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
}

impl StatisticsResponse {
    pub fn counts(stats: &UserStatistics) -> Self {
        Self {
            total_expenses: stats.total_expenses,
            pending_expenses: stats.pending_expenses,
            approved_expenses: stats.approved_expenses,
            total_amount: None,
        }
    }

    pub fn with_amount(stats: &UserStatistics) -> Self {
        Self {
            total_amount: Some(stats.approved_amount),
            ..Self::counts(stats)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user_id: UserId,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<StatisticsResponse>,
}

impl ProfileResponse {
    pub fn new(user: &UserDBResponse, statistics: Option<StatisticsResponse>) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role,
            created_at: user.created_at,
            statistics,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserListResponse {
    pub users: Vec<ProfileResponse>,
    pub count: usize,
}
