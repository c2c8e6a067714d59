//! HTTP request handlers for all API endpoints.
//!
//! Each submodule groups the handlers of one functional area. Handlers extract state and the
//! authenticated caller, delegate to the store or the extraction pipeline, and answer with the
//! `{"success", "message", "data"}` envelope.
//!
//! # Modules
//!
//! - [`auth`]: Registration and login
//! - [`users`]: Profile, password changes, HR user listing
//! - [`expenses`]: Bill uploads, own listings, exports and file downloads
//! - [`hr`]: Review workflow across all users
//! - [`files`]: Uploaded file serving and health

pub mod auth;
pub mod expenses;
pub mod files;
pub mod hr;
pub mod users;
