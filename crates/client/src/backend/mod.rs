//! The hosted backend boundary.
//!
//! Repositories never talk HTTP directly. They go through three narrow
//! traits mirroring the services a hosted backend-as-a-service exposes:
//!
//! - [`AuthBackend`] - password sign-in, sign-up, sign-out, session lookup
//! - [`TableBackend`] - filtered row queries and writes
//! - [`StorageBackend`] - blob upload, public URLs, removal
//!
//! [`SupabaseClient`] implements them over the Supabase REST APIs,
//! [`InMemoryBackend`] implements them over in-process maps for tests and
//! offline runs.

pub mod memory;
pub mod query;
pub mod supabase;

pub use memory::{Call, InMemoryBackend, Operation};
pub use query::{Delete, Embed, Filter, Insert, Order, Projection, Row, Select, Update};
pub use supabase::SupabaseClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::AuthSession;
use crate::persist::PersistError;

/// Errors reported by a backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Best available message from the response body.
        message: String,
    },

    /// Response body did not have the expected shape.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A request URL could not be built.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The addressed object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The call needs a signed-in session.
    #[error("not authenticated")]
    Unauthenticated,

    /// The local session snapshot could not be read or written.
    #[error("session persistence error: {0}")]
    Persistence(#[from] PersistError),
}

/// Password authentication against the hosted auth service.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Exchange email and password for a session.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError>;

    /// Create an account. Returns `None` when the account must confirm its
    /// email before a session is issued.
    async fn sign_up(&self, email: &str, password: &str)
    -> Result<Option<AuthSession>, BackendError>;

    /// End the current session.
    async fn sign_out(&self) -> Result<(), BackendError>;

    /// Current session, rehydrated from storage and refreshed if expired.
    async fn get_session(&self) -> Result<Option<AuthSession>, BackendError>;
}

/// Row access to the hosted database.
#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Run a query.
    async fn select(&self, query: &Select) -> Result<Vec<Row>, BackendError>;

    /// Count rows of `table` matching every filter.
    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, BackendError>;

    /// Insert rows, returning them as stored.
    async fn insert(&self, insert: &Insert) -> Result<Vec<Row>, BackendError>;

    /// Patch matching rows, returning them as stored.
    async fn update(&self, update: &Update) -> Result<Vec<Row>, BackendError>;

    /// Delete matching rows, returning how many were removed.
    async fn delete(&self, delete: &Delete) -> Result<u64, BackendError>;
}

/// Blob storage organised in buckets.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store `bytes` at `path` inside `bucket`.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError>;

    /// Public URL of an object. Does not check the object exists.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    /// Remove objects. Missing paths are ignored.
    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), BackendError>;
}

/// Everything a repository may need from the backend.
pub trait Backend: AuthBackend + TableBackend + StorageBackend {}

impl<T> Backend for T where T: AuthBackend + TableBackend + StorageBackend + ?Sized {}

/// Marker segment between the host and the object path in public URLs.
const PUBLIC_OBJECT_MARKER: &str = "/object/public/";

/// Derive the storage path of an object from its public URL.
///
/// Returns `None` when the URL does not parse, does not point into `bucket`,
/// or names no object.
///
/// ```
/// use cookmaster_client::backend::object_path_from_public_url;
///
/// let url = "https://x.supabase.co/storage/v1/object/public/resep-images/dokumen/1_a%20b.pdf";
/// assert_eq!(
///     object_path_from_public_url(url, "resep-images").as_deref(),
///     Some("dokumen/1_a b.pdf")
/// );
/// assert!(object_path_from_public_url(url, "avatars").is_none());
/// assert!(object_path_from_public_url("not a url", "resep-images").is_none());
/// ```
#[must_use]
pub fn object_path_from_public_url(public_url: &str, bucket: &str) -> Option<String> {
    let parsed = url::Url::parse(public_url).ok()?;
    let path = parsed.path();

    let marker = format!("{PUBLIC_OBJECT_MARKER}{bucket}/");
    let start = path.find(&marker)? + marker.len();
    let encoded = path.get(start..)?;
    if encoded.is_empty() {
        return None;
    }

    urlencoding::decode(encoded).ok().map(|p| p.into_owned())
}
