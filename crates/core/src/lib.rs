//! CookMaster Core - Shared domain types.
//!
//! This crate provides common types used across all CookMaster components:
//! - `client` - Data-access layer over the hosted backend
//! - `cli` - Terminal front end driving the client repositories
//!
//! # Architecture
//!
//! The core crate contains only types and validation - no I/O, no HTTP
//! clients, no async runtime. This keeps it lightweight and allows it to be
//! used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, and
//!   client-side validation errors

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
