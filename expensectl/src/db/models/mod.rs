//! Database record structures.

pub mod expenses;
pub mod users;
