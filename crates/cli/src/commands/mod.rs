//! Command implementations.
//!
//! Every command runs after the persisted session has been restored. Output
//! goes to stdout; notices published by the repositories are printed as they
//! arrive by [`spawn_notice_printer`].

pub mod auth;
pub mod cart;
pub mod home;
pub mod purchases;
pub mod recipes;

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use cookmaster_client::{AppError, NoticeLevel, Notifier};

/// Errors that can end a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// A client operation failed.
    #[error(transparent)]
    App(#[from] AppError),

    /// A command-line argument is not a valid ID.
    #[error("Invalid {kind} ID: {value}")]
    InvalidId {
        /// What the ID names.
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// A local file could not be read.
    #[error("Cannot read {path}: {source}")]
    ReadFile {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl CliError {
    /// Message shown to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::App(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

impl From<cookmaster_client::services::auth::AuthError> for CliError {
    fn from(err: cookmaster_client::services::auth::AuthError) -> Self {
        Self::App(err.into())
    }
}

/// Parse a typed ID from a command-line argument.
pub(crate) fn parse_id<T: FromStr>(kind: &'static str, value: &str) -> Result<T, CliError> {
    value.parse().map_err(|_| CliError::InvalidId {
        kind,
        value: value.to_string(),
    })
}

/// Read a file given on the command line.
pub(crate) async fn read_file(path: PathBuf) -> Result<(Vec<u8>, String), CliError> {
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|source| CliError::ReadFile {
            path: path.clone(),
            source,
        })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((bytes, name))
}

/// Print notices until the channel closes.
pub fn spawn_notice_printer(notifier: &Notifier) -> JoinHandle<()> {
    let mut receiver = notifier.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(notice) => {
                    let marker = match notice.level {
                        NoticeLevel::Success => "ok",
                        NoticeLevel::Info => "info",
                        NoticeLevel::Error => "failed",
                    };
                    eprintln!("[{marker}] {}: {}", notice.title, notice.message);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notice printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cookmaster_core::RecipeId;

    use super::*;

    #[test]
    fn test_parse_id_rejects_garbage() {
        let err = parse_id::<RecipeId>("recipe", "nope").unwrap_err();
        assert_eq!(err.to_string(), "Invalid recipe ID: nope");
        assert!(parse_id::<RecipeId>("recipe", "6f1c1d2e-8f6a-4a55-9a57-0e5f3c1b2a90").is_ok());
    }
}
