//! Authentication service.
//!
//! [`SessionManager`] holds the identity of the signed-in user. Credential
//! checks are delegated entirely to the hosted auth service; this layer only
//! validates input shape, tracks who is signed in, and tells the UI.

mod error;

pub use error::AuthError;

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use cookmaster_core::{Email, ValidationError, validate_password};

use crate::backend::Backend;
use crate::error::{add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::models::{AuthSession, CurrentUser};
use crate::notify::{Notice, Notifier};

/// Result of a sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    /// The account was created and is now signed in.
    SignedIn(CurrentUser),
    /// The account was created but must confirm its email before signing in.
    ConfirmationRequired {
        /// Address the confirmation was sent to.
        email: Email,
    },
}

/// Tracks the signed-in user.
pub struct SessionManager {
    backend: Arc<dyn Backend>,
    notifier: Notifier,
    current: RwLock<Option<CurrentUser>>,
}

impl SessionManager {
    /// Create a session manager with nobody signed in.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, notifier: Notifier) -> Self {
        Self {
            backend,
            notifier,
            current: RwLock::new(None),
        }
    }

    // =========================================================================
    // Password Authentication
    // =========================================================================

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` or `AuthError::WeakPassword` for
    /// input rejected locally (no remote call is made), and
    /// `AuthError::InvalidCredentials` when the backend refuses the pair.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<CurrentUser, AuthError> {
        let email = Email::parse(email)?;
        if password.is_empty() {
            return Err(AuthError::WeakPassword(ValidationError::EmptyPassword));
        }

        let result = self
            .backend
            .sign_in_with_password(email.as_str(), password)
            .await
            .map_err(AuthError::from_sign_in);

        match result {
            Ok(session) => {
                let user = self.adopt(session).await;
                info!(user_id = %user.id, "Signed in");
                add_breadcrumb("auth", "Signed in", None);
                self.notifier
                    .publish(Notice::success("Signed in", "Welcome back!"));
                Ok(user)
            }
            Err(err) => {
                warn!(error = %err, "Sign-in failed");
                self.notifier
                    .publish(Notice::error("Sign in failed", err.user_message()));
                Err(err)
            }
        }
    }

    /// Create an account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` or `AuthError::WeakPassword` for
    /// input rejected locally, `AuthError::UserAlreadyExists` when the email
    /// is taken.
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, AuthError> {
        let email = Email::parse(email)?;
        validate_password(password).map_err(AuthError::WeakPassword)?;

        let result = self
            .backend
            .sign_up(email.as_str(), password)
            .await
            .map_err(AuthError::from_sign_up);

        match result {
            Ok(Some(session)) => {
                let user = self.adopt(session).await;
                info!(user_id = %user.id, "Account created");
                self.notifier
                    .publish(Notice::success("Account created", "You are now signed in."));
                Ok(SignUpOutcome::SignedIn(user))
            }
            Ok(None) => {
                info!("Account created, awaiting email confirmation");
                self.notifier.publish(Notice::info(
                    "Check your email",
                    format!("We sent a confirmation link to {email}."),
                ));
                Ok(SignUpOutcome::ConfirmationRequired { email })
            }
            Err(err) => {
                warn!(error = %err, "Sign-up failed");
                self.notifier
                    .publish(Notice::error("Sign up failed", err.user_message()));
                Err(err)
            }
        }
    }

    /// Sign out.
    ///
    /// Local state is cleared even when the remote call fails.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Backend` if the auth service could not be told.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let remote = self.backend.sign_out().await;

        self.current.write().await.take();
        clear_sentry_user();
        add_breadcrumb("auth", "Signed out", None);

        match remote {
            Ok(()) => {
                info!("Signed out");
                self.notifier
                    .publish(Notice::success("Signed out", "See you soon!"));
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Remote sign-out failed, local session cleared");
                Err(AuthError::Backend(err))
            }
        }
    }

    /// Rehydrate the session persisted by the backend.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Backend` if the persisted session cannot be read.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<Option<CurrentUser>, AuthError> {
        match self.backend.get_session().await? {
            Some(session) => Ok(Some(self.adopt(session).await)),
            None => {
                self.current.write().await.take();
                Ok(None)
            }
        }
    }

    /// The signed-in user, if any.
    pub async fn current_user(&self) -> Option<CurrentUser> {
        self.current.read().await.clone()
    }

    /// Whether someone is signed in.
    pub async fn is_logged_in(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// The signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::NotSignedIn` when nobody is signed in.
    pub async fn require_user(&self) -> Result<CurrentUser, AuthError> {
        self.current_user().await.ok_or(AuthError::NotSignedIn)
    }

    async fn adopt(&self, session: AuthSession) -> CurrentUser {
        let user = session.user;
        set_sentry_user(&user.id, user.email.as_deref());
        *self.current.write().await = Some(user.clone());
        user
    }
}
