//! Business logic services.
//!
//! - `auth` - Password authentication and the signed-in session

pub mod auth;
