//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! - **Authentication** (`/auth/*`): Registration and login
//! - **Expenses** (`/expenses/*`): Uploads, own listing, export, bill download
//! - **HR** (`/hr/*`): Listing across users, status review, bulk review, export
//! - **Users** (`/users/*`): Profile, password change, HR user listing
//! - **Files** (`/files/*`): Uploaded bills by path

pub mod handlers;
pub mod models;
