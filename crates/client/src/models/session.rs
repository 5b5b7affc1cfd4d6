//! Authentication session types.
//!
//! The backend owns credentials; the client only keeps the tokens it was
//! handed and the identity they belong to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cookmaster_core::UserId;

/// Identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// Backend user ID.
    pub id: UserId,
    /// Email the account was registered with, when the backend reports it.
    #[serde(default)]
    pub email: Option<String>,
}

/// A session issued by the backend auth service.
///
/// Persisted between runs so the app can restore it at start-up.
/// Implements `Debug` manually to redact tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Bearer token for row and storage requests.
    pub access_token: String,
    /// Token used to obtain a new access token once it expires.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token expiry, if known.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// The authenticated user.
    pub user: CurrentUser,
}

impl AuthSession {
    /// Whether the access token has expired as of `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}
