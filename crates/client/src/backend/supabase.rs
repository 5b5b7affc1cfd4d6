//! Supabase backend over HTTP.
//!
//! Talks to the three services of a Supabase project:
//!
//! - `PostgREST` at `/rest/v1/<table>` for rows
//! - `GoTrue` at `/auth/v1/...` for password auth
//! - Storage at `/storage/v1/object/...` for blobs
//!
//! Every request carries the project anon key in `apikey` and a bearer token
//! that is the signed-in user's access token when a session exists, or the
//! anon key otherwise. The session is persisted so a restarted client stays
//! signed in, and refreshed through the refresh token once it expires.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use url::Url;

use cookmaster_core::UserId;

use super::{
    AuthBackend, BackendError, Delete, Filter, Insert, Row, Select, StorageBackend, TableBackend,
    Update,
};
use crate::config::ClientConfig;
use crate::models::{AuthSession, CurrentUser};
use crate::persist::JsonStore;

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: UserResponse,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: UserId,
    #[serde(default)]
    email: Option<String>,
}

impl TokenResponse {
    fn into_session(self) -> AuthSession {
        let expires_at = self
            .expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + TimeDelta::seconds(secs))
            });

        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: CurrentUser {
                id: self.user.id,
                email: self.user.email,
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP backend for a Supabase project.
#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<SupabaseClientInner>,
}

struct SupabaseClientInner {
    http: reqwest::Client,
    base_url: Url,
    anon_key: SecretString,
    session: RwLock<Option<AuthSession>>,
    session_store: JsonStore<AuthSession>,
}

impl SupabaseClient {
    /// Create a client persisting its session under the configured state dir.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_session_store(config, JsonStore::file(config.session_path()))
    }

    /// Create a client with an explicit session store.
    #[must_use]
    pub fn with_session_store(config: &ClientConfig, session_store: JsonStore<AuthSession>) -> Self {
        let mut base_url = config.supabase_url.clone();
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            inner: Arc::new(SupabaseClientInner {
                http: reqwest::Client::new(),
                base_url,
                anon_key: config.anon_key.clone(),
                session: RwLock::new(None),
                session_store,
            }),
        }
    }

    /// Project base URL, always ending in `/`.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Request Plumbing
    // ─────────────────────────────────────────────────────────────────────────

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| BackendError::InvalidUrl(format!("{path}: {e}")))
    }

    fn table_url(&self, table: &str, filters: &[Filter]) -> Result<Url, BackendError> {
        let mut url = self.endpoint(&format!("rest/v1/{}", urlencoding::encode(table)))?;
        {
            let mut pairs = url.query_pairs_mut();
            for filter in filters {
                let (key, value) = filter.to_query_pair();
                pairs.append_pair(&key, &value);
            }
        }
        Ok(url)
    }

    fn select_url(&self, query: &Select) -> Result<Url, BackendError> {
        let mut url = self.table_url(&query.table, &query.filters)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", &query.projection.render());
            if let Some(order) = &query.order {
                let direction = if order.ascending { "asc" } else { "desc" };
                pairs.append_pair("order", &format!("{}.{direction}", order.column));
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }

    fn object_url(&self, bucket: &str, path: &str) -> Result<Url, BackendError> {
        self.endpoint(&format!(
            "storage/v1/object/{}/{}",
            urlencoding::encode(bucket),
            encode_object_path(path)
        ))
    }

    async fn bearer_token(&self) -> String {
        self.inner.session.read().await.as_ref().map_or_else(
            || self.inner.anon_key.expose_secret().to_string(),
            |session| session.access_token.clone(),
        )
    }

    async fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let token = self.bearer_token().await;
        self.inner
            .http
            .request(method, url)
            .header("apikey", self.inner.anon_key.expose_secret())
            .bearer_auth(token)
    }

    fn anon_request(&self, method: Method, url: Url) -> RequestBuilder {
        self.inner
            .http
            .request(method, url)
            .header("apikey", self.inner.anon_key.expose_secret())
            .bearer_auth(self.inner.anon_key.expose_secret())
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, BackendError> {
        let response = check(request.send().await?).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn store_session(&self, session: &AuthSession) -> Result<(), BackendError> {
        *self.inner.session.write().await = Some(session.clone());
        self.inner.session_store.save(session).await?;
        Ok(())
    }

    async fn forget_session(&self) -> Result<(), BackendError> {
        self.inner.session.write().await.take();
        self.inner.session_store.clear().await?;
        Ok(())
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh(&self, refresh_token: &str) -> Result<AuthSession, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut()
            .append_pair("grant_type", "refresh_token");

        let token: TokenResponse = Self::send_json(
            self.anon_request(Method::POST, url)
                .json(&json!({ "refresh_token": refresh_token })),
        )
        .await?;

        let session = token.into_session();
        self.store_session(&session).await?;
        debug!(user_id = %session.user.id, "Session refreshed");
        Ok(session)
    }
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("anon_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl AuthBackend for SupabaseClient {
    #[instrument(skip(self, password))]
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let mut url = self.endpoint("auth/v1/token")?;
        url.query_pairs_mut().append_pair("grant_type", "password");

        let token: TokenResponse = Self::send_json(
            self.anon_request(Method::POST, url)
                .json(&json!({ "email": email, "password": password })),
        )
        .await?;

        let session = token.into_session();
        self.store_session(&session).await?;
        Ok(session)
    }

    #[instrument(skip(self, password))]
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<AuthSession>, BackendError> {
        let url = self.endpoint("auth/v1/signup")?;
        let body: Value = Self::send_json(
            self.anon_request(Method::POST, url)
                .json(&json!({ "email": email, "password": password })),
        )
        .await?;

        // Without auto-confirm the response is the bare user, no tokens.
        if body.get("access_token").is_none() {
            debug!("Sign-up requires email confirmation");
            return Ok(None);
        }

        let session = serde_json::from_value::<TokenResponse>(body)?.into_session();
        self.store_session(&session).await?;
        Ok(Some(session))
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), BackendError> {
        let token = self
            .inner
            .session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone());
        self.forget_session().await?;

        let Some(token) = token else {
            return Ok(());
        };

        let url = self.endpoint("auth/v1/logout")?;
        let request = self
            .inner
            .http
            .post(url)
            .header("apikey", self.inner.anon_key.expose_secret())
            .bearer_auth(token);
        check(request.send().await?).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_session(&self) -> Result<Option<AuthSession>, BackendError> {
        let current = self.inner.session.read().await.clone();
        let session = match current {
            Some(session) => session,
            None => match self.inner.session_store.load().await? {
                Some(stored) => {
                    debug!(user_id = %stored.user.id, "Rehydrated persisted session");
                    *self.inner.session.write().await = Some(stored.clone());
                    stored
                }
                None => return Ok(None),
            },
        };

        if !session.is_expired_at(Utc::now()) {
            return Ok(Some(session));
        }

        let Some(refresh_token) = session.refresh_token.clone() else {
            self.forget_session().await?;
            return Ok(None);
        };

        match self.refresh(&refresh_token).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(BackendError::Api { status, message }) if (400..500).contains(&status) => {
                warn!(status, %message, "Refresh token rejected, discarding session");
                self.forget_session().await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tables
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl TableBackend for SupabaseClient {
    #[instrument(skip(self, query), fields(table = %query.table))]
    async fn select(&self, query: &Select) -> Result<Vec<Row>, BackendError> {
        let url = self.select_url(query)?;
        Self::send_json(self.request(Method::GET, url).await).await
    }

    #[instrument(skip(self, filters))]
    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, BackendError> {
        let mut url = self.table_url(table, filters)?;
        url.query_pairs_mut().append_pair("select", "id");

        let response = check(
            self.request(Method::HEAD, url)
                .await
                .header("Prefer", "count=exact")
                .send()
                .await?,
        )
        .await?;

        let status = response.status().as_u16();
        response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| BackendError::Api {
                status,
                message: "response has no usable Content-Range header".to_string(),
            })
    }

    #[instrument(skip(self, insert), fields(table = %insert.table, rows = insert.rows.len()))]
    async fn insert(&self, insert: &Insert) -> Result<Vec<Row>, BackendError> {
        let mut url = self.table_url(&insert.table, &[])?;
        url.query_pairs_mut()
            .append_pair("select", &insert.returning.render());

        Self::send_json(
            self.request(Method::POST, url)
                .await
                .header("Prefer", "return=representation")
                .json(&insert.rows),
        )
        .await
    }

    #[instrument(skip(self, update), fields(table = %update.table))]
    async fn update(&self, update: &Update) -> Result<Vec<Row>, BackendError> {
        let url = self.table_url(&update.table, &update.filters)?;
        Self::send_json(
            self.request(Method::PATCH, url)
                .await
                .header("Prefer", "return=representation")
                .json(&update.patch),
        )
        .await
    }

    #[instrument(skip(self, delete), fields(table = %delete.table))]
    async fn delete(&self, delete: &Delete) -> Result<u64, BackendError> {
        let url = self.table_url(&delete.table, &delete.filters)?;
        let rows: Vec<Row> = Self::send_json(
            self.request(Method::DELETE, url)
                .await
                .header("Prefer", "return=representation"),
        )
        .await?;
        Ok(u64::try_from(rows.len()).unwrap_or(u64::MAX))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl StorageBackend for SupabaseClient {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        let url = self.object_url(bucket, path)?;
        let request = self
            .request(Method::POST, url)
            .await
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes);
        check(request.send().await?).await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}storage/v1/object/public/{}/{}",
            self.inner.base_url,
            urlencoding::encode(bucket),
            encode_object_path(path)
        )
    }

    #[instrument(skip(self))]
    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("storage/v1/object/{}", urlencoding::encode(bucket)))?;
        let request = self
            .request(Method::DELETE, url)
            .await
            .json(&json!({ "prefixes": paths }));
        check(request.send().await?).await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Turn a non-success response into [`BackendError::Api`].
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(BackendError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Pick the most useful message out of an error body.
///
/// The three services disagree on the field name, so try each in turn.
fn error_message(body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        ["message", "msg", "error_description", "error"]
            .iter()
            .find_map(|key| value.get(*key).and_then(Value::as_str).map(String::from))
    });

    from_json.unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            "request failed".to_string()
        } else {
            trimmed.to_string()
        }
    })
}

/// Total from a `Content-Range` header such as `0-9/42` or `*/0`.
fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.trim().parse().ok()
}

fn encode_object_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
