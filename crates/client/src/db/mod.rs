//! Repositories over the hosted backend.
//!
//! Each repository owns one in-memory collection, refreshes it from the
//! backend, and patches it after successful writes. Collections sit behind
//! `tokio::sync::RwLock` and no lock is held across a remote call.
//!
//! # Tables
//!
//! - `resep` - recipes ([`RecipeRepository`], [`HomeRepository`])
//! - `cart_items` - pending purchases ([`CartRepository`])
//! - `purchase_history` - completed purchases ([`PurchaseRepository`])
//!
//! # Failure policy
//!
//! - read failures are logged and leave the collection unchanged
//! - write failures are reported to Sentry and published as an error notice
//! - input is validated before any remote call

pub mod cart;
pub mod home;
pub mod purchases;
pub mod recipes;

pub use cart::{AddOutcome, CartRepository, CheckoutReceipt};
pub use home::HomeRepository;
pub use purchases::{OwnedRecipes, PurchaseRepository};
pub use recipes::RecipeRepository;

use tracing::warn;

use crate::backend::{BackendError, Row};
use crate::error::AppError;
use crate::notify::{Notice, Notifier};

/// Log a failed read and convert the error.
pub(crate) fn read_failed(operation: &str, err: impl Into<AppError>) -> AppError {
    let err = err.into();
    warn!(error = %err, operation, "Read failed, keeping previous state");
    err
}

/// Report a failed write and tell the user.
pub(crate) fn write_failed(
    notifier: &Notifier,
    operation: &str,
    title: &str,
    err: impl Into<AppError>,
) -> AppError {
    let err = err.into();
    err.report(operation);
    notifier.publish(Notice::error(title, err.user_message()));
    err
}

/// Decode rows, skipping (and logging) any that do not fit the model.
pub(crate) fn decode_rows<T>(
    table: &str,
    rows: Vec<Row>,
    decode: impl Fn(Row) -> Result<T, serde_json::Error>,
) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match decode(row) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(table, error = %err, "Skipping malformed row");
                None
            }
        })
        .collect()
}

/// Decode the single row a write returned.
pub(crate) fn decode_returned<T>(
    table: &str,
    rows: Vec<Row>,
    decode: impl Fn(Row) -> Result<T, serde_json::Error>,
) -> Result<T, AppError> {
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::NotFound(format!("{table}: write returned no row")))?;
    Ok(decode(row)?)
}
