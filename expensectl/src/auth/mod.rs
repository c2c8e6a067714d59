//! Authentication and authorization.
//!
//! Users log in with email and password and receive a signed JWT. Every protected request carries
//! it as `Authorization: Bearer <token>`; the [`current_user`] extractors verify it without a
//! database round trip.
//!
//! # Authorization
//!
//! There are two roles. `USER` works with their own expenses; `HR` can additionally see and review
//! everyone's. Handlers ask for [`current_user::RequiresHr`] instead of checking the role by hand.
//!
//! # Modules
//!
//! - [`current_user`]: Extractors for getting the authenticated user in handlers
//! - [`password`]: Password hashing and verification using Argon2
//! - [`session`]: JWT creation and verification
//! - [`utils`]: Email and password format rules

pub mod current_user;
pub mod password;
pub mod session;
pub mod utils;
