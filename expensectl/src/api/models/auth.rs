//! API request/response models for registration and login.

use serde::{Deserialize, Serialize};

use super::users::UserSummary;

/// Fields are optional so a missing one gets a readable 400 instead of a decode error.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    /// `USER` when absent
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserSummary,
}
