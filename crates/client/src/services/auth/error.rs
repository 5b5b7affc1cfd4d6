//! Authentication error types.

use thiserror::Error;

use cookmaster_core::{EmailError, ValidationError};

use crate::backend::BackendError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Password rejected locally.
    #[error("password validation failed: {0}")]
    WeakPassword(ValidationError),

    /// Invalid credentials (wrong password or unknown account).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account with this email already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// The operation needs a signed-in user.
    #[error("not signed in")]
    NotSignedIn,

    /// The auth service failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl AuthError {
    /// Message safe to show to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidEmail(_) => "Invalid email address".to_string(),
            Self::WeakPassword(err) => err.to_string(),
            Self::InvalidCredentials => "Invalid email or password".to_string(),
            Self::UserAlreadyExists => "An account with this email already exists".to_string(),
            Self::NotSignedIn => "Please sign in first".to_string(),
            Self::Backend(BackendError::Api { message, .. }) => message.clone(),
            Self::Backend(_) => "Authentication failed, please try again".to_string(),
        }
    }

    /// Classify a sign-in failure.
    pub(crate) fn from_sign_in(err: BackendError) -> Self {
        match err {
            BackendError::Api { status: 400 | 401, .. } => Self::InvalidCredentials,
            other => Self::Backend(other),
        }
    }

    /// Classify a sign-up failure.
    pub(crate) fn from_sign_up(err: BackendError) -> Self {
        match err {
            BackendError::Api { ref message, .. }
                if message.to_lowercase().contains("already registered") =>
            {
                Self::UserAlreadyExists
            }
            other => Self::Backend(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_classification() {
        let err = AuthError::from_sign_in(BackendError::Api {
            status: 400,
            message: "Invalid login credentials".to_string(),
        });
        assert!(matches!(err, AuthError::InvalidCredentials));

        let err = AuthError::from_sign_in(BackendError::Api {
            status: 503,
            message: "unavailable".to_string(),
        });
        assert!(matches!(err, AuthError::Backend(_)));
    }

    #[test]
    fn test_sign_up_classification() {
        let err = AuthError::from_sign_up(BackendError::Api {
            status: 422,
            message: "User already registered".to_string(),
        });
        assert!(matches!(err, AuthError::UserAlreadyExists));
        assert_eq!(
            err.user_message(),
            "An account with this email already exists"
        );
    }
}
