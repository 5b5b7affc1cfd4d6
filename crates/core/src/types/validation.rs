//! Client-side validation performed before any remote call.

use thiserror::Error;

use super::email::EmailError;

/// Minimum password length accepted by the hosted auth service.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Input rejected locally, without contacting the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Recipe title is empty or whitespace.
    #[error("title cannot be empty")]
    EmptyTitle,

    /// Price is zero or negative.
    #[error("price must be greater than 0 (got {0})")]
    NonPositivePrice(i64),

    /// Price input could not be read as a number.
    #[error("invalid price: {0:?}")]
    InvalidPrice(String),

    /// Email failed syntactic validation.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Password is empty.
    #[error("password cannot be empty")]
    EmptyPassword,

    /// Password is shorter than the backend accepts.
    #[error("password must be at least {min} characters")]
    PasswordTooShort {
        /// Minimum accepted length.
        min: usize,
    },

    /// An attachment upload was given zero bytes.
    #[error("{0} file is empty")]
    EmptyFile(&'static str),
}

/// Validate a recipe title, returning it trimmed.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyTitle`] for empty or whitespace-only input.
pub fn validate_title(title: &str) -> Result<&str, ValidationError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(trimmed)
}

/// Validate a password for sign-up.
///
/// # Errors
///
/// Returns [`ValidationError::EmptyPassword`] or
/// [`ValidationError::PasswordTooShort`].
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::EmptyPassword);
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LENGTH,
        });
    }
    Ok(())
}
