//! In-process backend.
//!
//! Evaluates the same typed queries as the HTTP backend over JSON rows held
//! in memory. Every call is logged, and a single failure can be scheduled per
//! operation, which lets tests assert exactly which remote effects a
//! repository produced and how it reacts when one of them fails.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

use cookmaster_core::UserId;

use super::{
    AuthBackend, BackendError, Delete, Filter, Insert, Projection, Row, Select, StorageBackend,
    TableBackend, Update,
};
use crate::models::{AuthSession, CurrentUser};

/// Backend operation, used in the call log and for failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Password sign-in.
    SignIn,
    /// Account creation.
    SignUp,
    /// Session termination.
    SignOut,
    /// Session lookup.
    GetSession,
    /// Row query.
    Select,
    /// Row count.
    Count,
    /// Row insert.
    Insert,
    /// Row update.
    Update,
    /// Row delete.
    Delete,
    /// Blob upload.
    Upload,
    /// Blob removal.
    Remove,
}

/// One logged backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// What was called.
    pub operation: Operation,
    /// Table, bucket, or email the call addressed.
    pub target: String,
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

#[derive(Debug, Clone)]
struct MemoryUser {
    id: UserId,
    password: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Row>>,
    buckets: HashMap<String, BTreeMap<String, StoredObject>>,
    users: HashMap<String, MemoryUser>,
    session: Option<AuthSession>,
    calls: Vec<Call>,
    failures: HashMap<Operation, String>,
    last_timestamp: Option<DateTime<Utc>>,
    require_email_confirmation: bool,
}

impl MemoryState {
    /// Log the call and consume a scheduled failure, if any.
    fn enter(&mut self, operation: Operation, target: &str) -> Result<(), BackendError> {
        self.calls.push(Call {
            operation,
            target: target.to_string(),
        });
        match self.failures.remove(&operation) {
            Some(message) => Err(BackendError::Api {
                status: 500,
                message,
            }),
            None => Ok(()),
        }
    }

    /// Strictly increasing timestamps so `created_at` ordering is total.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.last_timestamp {
            Some(last) if now <= last => last + TimeDelta::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(next);
        next
    }

    fn rows(&self, table: &str) -> &[Row] {
        self.tables.get(table).map_or(&[], Vec::as_slice)
    }

    fn project(&self, row: &Row, projection: &Projection) -> Row {
        let mut out = if projection.columns.is_empty() {
            row.clone()
        } else {
            projection
                .columns
                .iter()
                .map(|column| {
                    (
                        column.clone(),
                        row.get(column).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect()
        };

        for embed in &projection.embeds {
            let key = row.get(&embed.foreign_key).cloned().unwrap_or(Value::Null);
            let target = Filter::Eq("id".to_string(), key);
            let embedded = self
                .rows(&embed.table)
                .iter()
                .find(|candidate| target.matches(candidate))
                .map_or(Value::Null, |found| {
                    Value::Object(
                        embed
                            .columns
                            .iter()
                            .map(|c| (c.clone(), found.get(c).cloned().unwrap_or(Value::Null)))
                            .collect(),
                    )
                });
            out.insert(embed.alias.clone(), embedded);
        }
        out
    }

    fn issue_session(&self, id: UserId, email: &str) -> AuthSession {
        AuthSession {
            access_token: format!("memory-access-{}", Uuid::new_v4()),
            refresh_token: Some(format!("memory-refresh-{}", Uuid::new_v4())),
            expires_at: Some(Utc::now() + TimeDelta::hours(1)),
            user: CurrentUser {
                id,
                email: Some(email.to_string()),
            },
        }
    }
}

/// Deterministic backend living entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl InMemoryBackend {
    /// Base URL used for public object URLs.
    pub const BASE_URL: &'static str = "http://127.0.0.1:54321";

    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every async call by `latency`, so overlapping calls interleave.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(&self) {
        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }
    }

    /// Make the next call of `operation` fail with `message`.
    pub fn fail_next(&self, operation: Operation, message: &str) {
        self.state()
            .failures
            .insert(operation, message.to_string());
    }

    /// Every call made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Number of calls of `operation` addressed to `target`.
    #[must_use]
    pub fn call_count(&self, operation: Operation, target: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation == operation && c.target == target)
            .count()
    }

    /// Forget the call log.
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Require new accounts to confirm their email before receiving a session.
    pub fn set_require_email_confirmation(&self, required: bool) {
        self.state().require_email_confirmation = required;
    }

    /// Register an account directly, bypassing sign-up.
    pub fn add_user(&self, email: &str, password: &str) -> UserId {
        let id = UserId::new_v4();
        self.state().users.insert(
            email.to_lowercase(),
            MemoryUser {
                id,
                password: password.to_string(),
            },
        );
        id
    }

    /// Insert a row directly, assigning `id` and `created_at` when absent.
    /// Returns the stored row.
    pub fn seed(&self, table: &str, row: Value) -> Row {
        let mut state = self.state();
        let row = row.as_object().cloned().unwrap_or_default();
        let stored = complete_row(&mut state, row);
        state
            .tables
            .entry(table.to_string())
            .or_default()
            .push(stored.clone());
        stored
    }

    /// Current rows of `table`.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state().rows(table).to_vec()
    }

    /// Stored object bytes, if present.
    #[must_use]
    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.state()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(path))
            .map(|o| o.bytes.clone())
    }

    /// Content type an object was uploaded with.
    #[must_use]
    pub fn object_content_type(&self, bucket: &str, path: &str) -> Option<String> {
        self.state()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(path))
            .map(|o| o.content_type.clone())
    }

    /// Paths stored in `bucket`, sorted.
    #[must_use]
    pub fn object_paths(&self, bucket: &str) -> Vec<String> {
        self.state()
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn complete_row(state: &mut MemoryState, mut row: Row) -> Row {
    if !row.contains_key("id") {
        row.insert("id".into(), json!(Uuid::new_v4().to_string()));
    }
    if !row.contains_key("created_at") {
        let created_at = state
            .next_timestamp()
            .to_rfc3339_opts(SecondsFormat::Micros, true);
        row.insert("created_at".into(), json!(created_at));
    }
    row
}

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|f| f.matches(row))
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        // Nulls sort last ascending, like Postgres.
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

#[async_trait]
impl AuthBackend for InMemoryBackend {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        self.pause().await;
        let mut state = self.state();
        state.enter(Operation::SignIn, email)?;

        let key = email.to_lowercase();
        let user = state
            .users
            .get(&key)
            .filter(|u| u.password == password)
            .cloned()
            .ok_or_else(|| BackendError::Api {
                status: 400,
                message: "Invalid login credentials".to_string(),
            })?;

        let session = state.issue_session(user.id, &key);
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<AuthSession>, BackendError> {
        self.pause().await;
        let mut state = self.state();
        state.enter(Operation::SignUp, email)?;

        let key = email.to_lowercase();
        if state.users.contains_key(&key) {
            return Err(BackendError::Api {
                status: 422,
                message: "User already registered".to_string(),
            });
        }

        let id = UserId::new_v4();
        state.users.insert(
            key.clone(),
            MemoryUser {
                id,
                password: password.to_string(),
            },
        );

        if state.require_email_confirmation {
            return Ok(None);
        }
        let session = state.issue_session(id, &key);
        state.session = Some(session.clone());
        Ok(Some(session))
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.pause().await;
        let mut state = self.state();
        state.enter(Operation::SignOut, "session")?;
        state.session = None;
        Ok(())
    }

    async fn get_session(&self) -> Result<Option<AuthSession>, BackendError> {
        let mut state = self.state();
        state.enter(Operation::GetSession, "session")?;
        Ok(state.session.clone())
    }
}

#[async_trait]
impl TableBackend for InMemoryBackend {
    async fn select(&self, query: &Select) -> Result<Vec<Row>, BackendError> {
        self.pause().await;
        let mut state = self.state();
        state.enter(Operation::Select, &query.table)?;

        let mut rows: Vec<&Row> = state
            .rows(&query.table)
            .iter()
            .filter(|row| matches_all(row, &query.filters))
            .collect();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        Ok(rows
            .into_iter()
            .map(|row| state.project(row, &query.projection))
            .collect())
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, BackendError> {
        self.pause().await;
        let mut state = self.state();
        state.enter(Operation::Count, table)?;
        let count = state
            .rows(table)
            .iter()
            .filter(|row| matches_all(row, filters))
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn insert(&self, insert: &Insert) -> Result<Vec<Row>, BackendError> {
        self.pause().await;
        let mut state = self.state();
        state.enter(Operation::Insert, &insert.table)?;

        let stored: Vec<Row> = insert
            .rows
            .iter()
            .cloned()
            .map(|row| complete_row(&mut state, row))
            .collect();
        state
            .tables
            .entry(insert.table.clone())
            .or_default()
            .extend(stored.iter().cloned());

        Ok(stored
            .iter()
            .map(|row| state.project(row, &insert.returning))
            .collect())
    }

    async fn update(&self, update: &Update) -> Result<Vec<Row>, BackendError> {
        self.pause().await;
        let mut state = self.state();
        state.enter(Operation::Update, &update.table)?;

        let mut updated = Vec::new();
        if let Some(rows) = state.tables.get_mut(&update.table) {
            for row in rows.iter_mut().filter(|row| matches_all(row, &update.filters)) {
                for (column, value) in &update.patch {
                    row.insert(column.clone(), value.clone());
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, delete: &Delete) -> Result<u64, BackendError> {
        self.pause().await;
        let mut state = self.state();
        state.enter(Operation::Delete, &delete.table)?;

        let Some(rows) = state.tables.get_mut(&delete.table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !matches_all(row, &delete.filters));
        Ok(u64::try_from(before - rows.len()).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BackendError> {
        self.pause().await;
        let mut state = self.state();
        state.enter(Operation::Upload, bucket)?;
        state.buckets.entry(bucket.to_string()).or_default().insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{bucket}/{}",
            Self::BASE_URL,
            urlencoding::encode(path).replace("%2F", "/")
        )
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<(), BackendError> {
        self.pause().await;
        let mut state = self.state();
        state.enter(Operation::Remove, bucket)?;
        if let Some(objects) = state.buckets.get_mut(bucket) {
            for path in paths {
                objects.remove(path);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{Embed, object_path_from_public_url};

    #[tokio::test]
    async fn test_insert_assigns_id_and_increasing_created_at() {
        let backend = InMemoryBackend::new();
        let insert = Insert::one("resep", json!({"judul": "A"}).as_object().cloned().unwrap());
        let first = backend.insert(&insert).await.unwrap();
        let second = backend.insert(&insert).await.unwrap();

        let a = first[0]["created_at"].as_str().unwrap().to_string();
        let b = second[0]["created_at"].as_str().unwrap().to_string();
        assert!(a < b);
        assert_ne!(first[0]["id"], second[0]["id"]);
    }

    #[tokio::test]
    async fn test_select_filters_orders_limits_and_embeds() {
        let backend = InMemoryBackend::new();
        let recipe = backend.seed("resep", json!({"judul": "Soto", "harga": 15000}));
        backend.seed("cart_items", json!({"user_id": "u1", "resep_id": recipe["id"]}));
        backend.seed("cart_items", json!({"user_id": "u2", "resep_id": recipe["id"]}));

        let rows = backend
            .select(
                &Select::from("cart_items")
                    .project(Projection::columns(&["id", "user_id"]).embed(Embed::new(
                        "resep",
                        "resep",
                        "resep_id",
                        &["judul", "harga"],
                    )))
                    .eq("user_id", "u1"),
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["resep"]["judul"], json!("Soto"));
        assert!(!rows[0].contains_key("resep_id"));

        let newest = backend
            .select(&Select::from("cart_items").order("created_at", false).limit(1))
            .await
            .unwrap();
        assert_eq!(newest[0]["user_id"], json!("u2"));
    }

    #[tokio::test]
    async fn test_missing_embed_is_null() {
        let backend = InMemoryBackend::new();
        backend.seed("cart_items", json!({"resep_id": "gone"}));
        let rows = backend
            .select(&Select::from("cart_items").project(Projection::all().embed(Embed::new(
                "resep",
                "resep",
                "resep_id",
                &["judul"],
            ))))
            .await
            .unwrap();
        assert_eq!(rows[0]["resep"], Value::Null);
    }

    #[tokio::test]
    async fn test_fail_next_is_one_shot_and_logged() {
        let backend = InMemoryBackend::new();
        backend.fail_next(Operation::Count, "boom");

        let err = backend.count("resep", &[]).await.unwrap_err();
        assert!(matches!(err, BackendError::Api { status: 500, .. }));
        assert_eq!(backend.count("resep", &[]).await.unwrap(), 0);
        assert_eq!(backend.call_count(Operation::Count, "resep"), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let backend = InMemoryBackend::new();
        let row = backend.seed("resep", json!({"judul": "Lama"}));
        let id = row["id"].clone();

        let patch = json!({"judul": "Baru"}).as_object().cloned().unwrap();
        let updated = backend
            .update(&Update::table("resep", patch).eq("id", id.clone()))
            .await
            .unwrap();
        assert_eq!(updated[0]["judul"], json!("Baru"));

        let removed = backend
            .delete(&Delete::from("resep").any_of("id", vec![id]))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(backend.rows("resep").is_empty());
    }

    #[tokio::test]
    async fn test_storage_public_url_maps_back_to_path() {
        let backend = InMemoryBackend::new();
        backend
            .upload("resep-images", "dokumen/1_a b.pdf", vec![1], "application/pdf")
            .await
            .unwrap();

        let url = backend.public_url("resep-images", "dokumen/1_a b.pdf");
        let path = object_path_from_public_url(&url, "resep-images").unwrap();
        assert_eq!(path, "dokumen/1_a b.pdf");
        assert_eq!(
            backend.object_content_type("resep-images", &path).as_deref(),
            Some("application/pdf")
        );

        backend.remove("resep-images", &[path]).await.unwrap();
        assert!(backend.object_paths("resep-images").is_empty());
    }

    #[tokio::test]
    async fn test_auth_flow() {
        let backend = InMemoryBackend::new();
        assert!(backend.get_session().await.unwrap().is_none());

        let session = backend.sign_up("Koki@Example.com", "rahasia").await.unwrap();
        assert!(session.is_some());
        assert!(backend.sign_up("koki@example.com", "x").await.is_err());

        backend.sign_out().await.unwrap();
        assert!(backend.get_session().await.unwrap().is_none());

        assert!(
            backend
                .sign_in_with_password("koki@example.com", "salah")
                .await
                .is_err()
        );
        let session = backend
            .sign_in_with_password("koki@example.com", "rahasia")
            .await
            .unwrap();
        assert_eq!(session.user.email.as_deref(), Some("koki@example.com"));

        backend.set_require_email_confirmation(true);
        assert!(backend.sign_up("baru@example.com", "rahasia").await.unwrap().is_none());
    }
}
