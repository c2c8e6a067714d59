//! API request/response models for expenses and the HR review workflow.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::db::models::expenses::ExpenseDBResponse;
use crate::extraction::NormalizedBill;
use crate::types::{ExpenseId, UserId};

/// Review state. Every expense starts out pending.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "expense_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ExpenseStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::Pending => "pending",
            ExpenseStatus::Approved => "approved",
            ExpenseStatus::Rejected => "rejected",
        }
    }

    /// Past-tense phrase used in status change messages.
    pub fn transition_phrase(&self) -> &'static str {
        match self {
            ExpenseStatus::Pending => "set to pending",
            ExpenseStatus::Approved => "approved",
            ExpenseStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpenseStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExpenseStatus::Pending),
            "approved" => Ok(ExpenseStatus::Approved),
            "rejected" => Ok(ExpenseStatus::Rejected),
            _ => Err(()),
        }
    }
}

/// Parse an ISO-8601 bound: RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS[.f]` (UTC), or a bare date
/// (midnight UTC).
pub fn parse_datetime_bound(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Query string of the listing and export endpoints.
///
/// Everything is kept as text; handlers decide how strictly to interpret it.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ListExpensesQuery {
    pub status: Option<String>,
    pub user_id: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StatusUpdate {
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BulkStatusUpdate {
    #[serde(default)]
    pub expense_ids: Vec<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkStatusResponse {
    pub updated_count: u64,
    pub status: ExpenseStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseResponse {
    pub expense_id: ExpenseId,
    pub user_id: UserId,
    pub image_path: String,
    pub extracted_data: NormalizedBill,
    pub status: ExpenseStatus,
    pub hr_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Owner email, HR listings only. "Unknown" when the owner is gone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

impl From<ExpenseDBResponse> for ExpenseResponse {
    fn from(db: ExpenseDBResponse) -> Self {
        Self {
            expense_id: db.id,
            user_id: db.user_id,
            image_path: db.image_path,
            extracted_data: db.extracted_data,
            status: db.status,
            hr_notes: db.hr_notes,
            created_at: db.created_at,
            updated_at: db.updated_at,
            user_email: None,
        }
    }
}

impl ExpenseResponse {
    pub fn with_user_email(mut self, email: impl Into<String>) -> Self {
        self.user_email = Some(email.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseListResponse {
    pub expenses: Vec<ExpenseResponse>,
    pub count: usize,
}

impl ExpenseListResponse {
    pub fn new(expenses: Vec<ExpenseResponse>) -> Self {
        Self {
            count: expenses.len(),
            expenses,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchUploadResponse {
    pub expenses: Vec<ExpenseResponse>,
    pub count: usize,
    /// Files that yielded nothing usable or failed validation
    pub skipped: usize,
    /// Files whose bill was identical to an earlier one in the same batch
    pub duplicates: usize,
}
