//! Database models for expenses.

use crate::api::models::expenses::ExpenseStatus;
use crate::extraction::NormalizedBill;
use crate::types::{ExpenseId, UserId};
use chrono::{DateTime, Utc};

/// Database request for creating a new expense
#[derive(Debug, Clone)]
pub struct ExpenseCreateDBRequest {
    pub user_id: UserId,
    pub image_path: String,
    pub extracted_data: NormalizedBill,
    pub status: ExpenseStatus,
}

/// Database response for an expense
#[derive(Debug, Clone, PartialEq)]
pub struct ExpenseDBResponse {
    pub id: ExpenseId,
    pub user_id: UserId,
    pub image_path: String,
    pub extracted_data: NormalizedBill,
    pub status: ExpenseStatus,
    pub hr_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Filter for listing expenses. Results are always newest first.
#[derive(Debug, Clone, Default)]
pub struct ExpenseFilter {
    pub user_id: Option<UserId>,
    pub status: Option<ExpenseStatus>,
    /// Inclusive lower bound on `created_at`
    pub created_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub created_to: Option<DateTime<Utc>>,
}

impl ExpenseFilter {
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, expense: &ExpenseDBResponse) -> bool {
        self.user_id.is_none_or(|id| id == expense.user_id)
            && self.status.is_none_or(|s| s == expense.status)
            && self.created_from.is_none_or(|from| expense.created_at >= from)
            && self.created_to.is_none_or(|to| expense.created_at <= to)
    }
}

/// What a status change does to the HR note.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NotesUpdate {
    #[default]
    Keep,
    Clear,
    Set(String),
}

impl NotesUpdate {
    /// Absent notes keep the current value; blank notes clear it; anything else is trimmed.
    pub fn from_request(notes: Option<&str>) -> Self {
        match notes.map(str::trim) {
            None => NotesUpdate::Keep,
            Some("") => NotesUpdate::Clear,
            Some(text) => NotesUpdate::Set(text.to_string()),
        }
    }

    pub fn apply(&self, current: Option<String>) -> Option<String> {
        match self {
            NotesUpdate::Keep => current,
            NotesUpdate::Clear => None,
            NotesUpdate::Set(text) => Some(text.clone()),
        }
    }
}

/// Database request for a status transition
#[derive(Debug, Clone)]
pub struct StatusUpdateDBRequest {
    pub status: ExpenseStatus,
    pub notes: NotesUpdate,
}
