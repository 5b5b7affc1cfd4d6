//! Unified error handling with Sentry integration.
//!
//! Every layer has its own `thiserror` enum; [`AppError`] composes them so
//! repository methods can return a single `Result<T>`. Presentation code
//! shows [`AppError::user_message`] and never the raw `Display` output.

use thiserror::Error;

use cookmaster_core::{RecipeId, ValidationError};

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::persist::PersistError;
use crate::services::auth::AuthError;

/// Application-level error type for the client.
#[derive(Debug, Error)]
pub enum AppError {
    /// Input rejected before any remote call.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Backend call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Authentication failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Configuration could not be loaded.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Local state could not be read or written.
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    /// The operation needs a signed-in user.
    #[error("Not signed in")]
    NotSignedIn,

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The recipe is already owned by the current user.
    #[error("Recipe {0} already purchased")]
    AlreadyPurchased(RecipeId),

    /// Another checkout is still running.
    #[error("Checkout already in progress")]
    CheckoutInProgress,

    /// Checkout stopped after recording some purchases.
    ///
    /// The cart is left untouched, so lines already paid for remain in it.
    #[error("Checkout failed after recording {recorded} of {total} purchases: {message}")]
    Checkout {
        /// Purchases recorded before the failure.
        recorded: usize,
        /// Lines in the cart at checkout.
        total: usize,
        /// Failure detail.
        message: String,
    },
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Backend(BackendError::Parse(err))
    }
}

impl AppError {
    /// Message safe to show to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(err) => capitalize(&err.to_string()),
            Self::Backend(BackendError::Api { message, .. }) => message.clone(),
            Self::Backend(BackendError::Unauthenticated) | Self::NotSignedIn => {
                "Please sign in first".to_string()
            }
            Self::Backend(BackendError::NotFound(_)) | Self::NotFound(_) => {
                "Not found".to_string()
            }
            Self::Backend(_) | Self::Persist(_) => {
                "Operation failed, please try again".to_string()
            }
            Self::Auth(err) => err.user_message(),
            Self::Config(err) => err.to_string(),
            Self::AlreadyPurchased(_) => "You already own this recipe".to_string(),
            Self::CheckoutInProgress => "Checkout is already in progress".to_string(),
            Self::Checkout {
                recorded, total, ..
            } => format!(
                "Checkout failed after {recorded} of {total} purchases were recorded. Your cart was not cleared."
            ),
        }
    }

    /// Whether the error reflects a failure worth reporting, as opposed to
    /// the user's own input or state.
    #[must_use]
    pub const fn is_reportable(&self) -> bool {
        matches!(
            self,
            Self::Backend(_) | Self::Persist(_) | Self::Checkout { .. }
        )
    }

    /// Log and send to Sentry when reportable.
    pub fn report(&self, operation: &str) {
        if self.is_reportable() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                operation,
                sentry_event_id = %event_id,
                "Operation failed"
            );
        } else {
            tracing::debug!(error = %self, operation, "Operation rejected");
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on sign-out to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added recipe to cart", Some(&[("recipe_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
