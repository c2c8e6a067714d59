//! API request and response data models.
//!
//! These structures define the public JSON contract and are kept apart from the database models
//! in [`crate::db::models`], so storage and API can evolve independently.
//!
//! - [`auth`]: Registration and login payloads
//! - [`envelope`]: The `{"success", "message", "data"}` wrapper
//! - [`expenses`]: Expense records, status values, listing queries and review requests
//! - [`users`]: Roles, the authenticated caller, profiles and statistics
//!
//! Request models keep their fields optional so a missing value produces a readable 400 from the
//! handler rather than a decode error.

pub mod auth;
pub mod envelope;
pub mod expenses;
pub mod users;
