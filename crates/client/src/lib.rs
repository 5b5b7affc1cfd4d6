//! CookMaster client library.
//!
//! The data-access layer of the CookMaster recipe marketplace: typed
//! repositories over a hosted backend (Supabase auth, PostgREST tables and
//! object storage), with the in-memory collections a UI renders from.
//!
//! # Modules
//!
//! - [`backend`] - Backend traits, the Supabase HTTP client and an in-memory
//!   backend for tests
//! - [`db`] - Recipe, cart, purchase and home repositories
//! - [`services`] - Authentication
//! - [`notify`] - Transient notices for the presentation layer
//! - [`state`] - [`AppState`] wiring everything to one backend

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod persist;
pub mod services;
pub mod state;

pub use config::ClientConfig;
pub use error::{AppError, Result};
pub use notify::{Notice, NoticeLevel, Notifier};
pub use state::AppState;
