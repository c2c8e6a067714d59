//! Data persistence and access.
//!
//! Handlers talk to a [`Store`], never to a database driver directly:
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  (api::handlers)
//! └──────┬──────┘
//!        │ Arc<dyn Store>
//!        ↓
//! ┌─────────────┐     ┌───────────────┐
//! │PostgresStore│     │ InMemoryStore │  (tests, local runs)
//! └──────┬──────┘     └───────────────┘
//!        ↓
//! ┌─────────────┐
//! │  PostgreSQL │
//! └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`]: Record structures passed to and returned from the store
//! - [`errors`]: Store error type shared by both implementations
//! - [`postgres`]: SQLx implementation
//! - [`in_memory`]: Lock-protected maps with the same semantics
//!
//! Every write is a single statement; no operation spans more than one row change except the bulk
//! status update, which is one `UPDATE ... WHERE id = ANY(...)`.

pub mod errors;
pub mod in_memory;
pub mod models;
pub mod postgres;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use std::collections::HashMap;

use crate::extraction::NormalizedBill;
use crate::types::{ExpenseId, UserId};
use errors::Result;
use models::{
    expenses::{ExpenseCreateDBRequest, ExpenseDBResponse, ExpenseFilter, StatusUpdateDBRequest},
    users::{UserCreateDBRequest, UserDBResponse, UserStatistics},
};

#[async_trait]
pub trait Store: Send + Sync {
    /// Fails with a unique violation when the email is taken.
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse>;

    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>>;

    /// Exact match; callers lowercase first.
    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserDBResponse>>;

    /// Users keyed by ID. Unknown IDs are simply absent.
    async fn get_users_bulk(&self, ids: &[UserId]) -> Result<HashMap<UserId, UserDBResponse>>;

    /// All users, newest first.
    async fn list_users(&self) -> Result<Vec<UserDBResponse>>;

    /// `NotFound` for an unknown user, unique violation when the email is taken.
    async fn update_user_email(&self, id: UserId, email: &str) -> Result<UserDBResponse>;

    async fn update_user_password(&self, id: UserId, password_hash: &str) -> Result<()>;

    async fn create_expense(&self, request: &ExpenseCreateDBRequest) -> Result<ExpenseDBResponse>;

    async fn get_expense(&self, id: ExpenseId) -> Result<Option<ExpenseDBResponse>>;

    /// Matching expenses, newest first.
    async fn list_expenses(&self, filter: &ExpenseFilter) -> Result<Vec<ExpenseDBResponse>>;

    /// Sets the status, applies the notes update and bumps `updated_at`. `NotFound` for an unknown ID.
    async fn update_expense_status(&self, id: ExpenseId, update: &StatusUpdateDBRequest) -> Result<ExpenseDBResponse>;

    /// Same as [`Store::update_expense_status`] for many IDs; returns how many rows matched.
    async fn bulk_update_expense_status(&self, ids: &[ExpenseId], update: &StatusUpdateDBRequest) -> Result<u64>;

    async fn user_statistics(&self, user_id: UserId) -> Result<UserStatistics>;
}

/// Sum of the reporting amounts of `bills`, skipping any that do not parse.
pub fn total_amount<'a>(bills: impl IntoIterator<Item = &'a NormalizedBill>) -> f64 {
    bills
        .into_iter()
        .filter_map(|bill| {
            let amount = bill.reporting_amount();
            if amount.is_empty() { Some(0.0) } else { amount.parse::<f64>().ok() }
        })
        .sum()
}
