//! Scenario tests for the CookMaster client.
//!
//! Tests drive a full [`AppState`] over [`InMemoryBackend`], so they run
//! without network access. The `live_supabase` tests talk to a real project
//! and are ignored unless asked for.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory scenarios
//! cargo test -p cookmaster-integration-tests
//!
//! # Against a real project (needs SUPABASE_URL and SUPABASE_ANON_KEY)
//! cargo test -p cookmaster-integration-tests -- --ignored
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;

use cookmaster_client::backend::InMemoryBackend;
use cookmaster_client::db::OwnedRecipes;
use cookmaster_client::models::CurrentUser;
use cookmaster_client::persist::JsonStore;
use cookmaster_client::{AppState, ClientConfig, Notice, NoticeLevel};
use cookmaster_core::RecipeId;

/// Default test account.
pub const EMAIL: &str = "koki@cookmaster.id";
/// Password of [`EMAIL`].
pub const PASSWORD: &str = "rahasia123";

/// An app wired to an in-memory backend, with a notice subscription.
pub struct TestContext {
    /// Backend shared by every repository.
    pub backend: Arc<InMemoryBackend>,
    /// Application state under test.
    pub state: AppState,
    notices: broadcast::Receiver<Notice>,
}

impl TestContext {
    /// Context over a fresh backend with a memory-backed owned cache.
    #[must_use]
    pub fn new() -> Self {
        Self::build(InMemoryBackend::new(), JsonStore::memory())
    }

    /// Context whose backend sleeps before every call, so concurrent calls
    /// overlap.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self {
        Self::build(InMemoryBackend::new().with_latency(latency), JsonStore::memory())
    }

    /// Context over an existing backend and owned-recipes store, e.g. to
    /// simulate an app restart.
    #[must_use]
    pub fn reopen(backend: Arc<InMemoryBackend>, owned: JsonStore<OwnedRecipes>) -> Self {
        let state = AppState::with_backend(config(), backend.clone(), owned);
        let notices = state.notifier().subscribe();
        Self {
            backend,
            state,
            notices,
        }
    }

    fn build(backend: InMemoryBackend, owned: JsonStore<OwnedRecipes>) -> Self {
        Self::reopen(Arc::new(backend), owned)
    }

    /// Register [`EMAIL`] and sign in.
    ///
    /// # Panics
    ///
    /// Panics if sign-in fails.
    pub async fn signed_in(&self) -> CurrentUser {
        self.backend.add_user(EMAIL, PASSWORD);
        match self.state.session().sign_in(EMAIL, PASSWORD).await {
            Ok(user) => user,
            Err(err) => panic!("sign-in failed: {err}"),
        }
    }

    /// Insert a recipe row directly and return its ID.
    ///
    /// # Panics
    ///
    /// Panics if the backend assigned an unparsable ID.
    #[must_use]
    pub fn seed_recipe(&self, title: &str, price: i64) -> RecipeId {
        let row = self.backend.seed(
            "resep",
            json!({"judul": title, "deskripsi": format!("{title} khas"), "harga": price}),
        );
        row.get("id")
            .and_then(|id| id.as_str())
            .and_then(|id| id.parse().ok())
            .unwrap_or_else(|| panic!("seeded recipe has no id"))
    }

    /// Notices published since the last call.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        let mut drained = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            drained.push(notice);
        }
        drained
    }

    /// Titles of drained notices at `level`.
    pub fn notice_titles(&mut self, level: NoticeLevel) -> Vec<String> {
        self.drain_notices()
            .into_iter()
            .filter(|n| n.level == level)
            .map(|n| n.title)
            .collect()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Test configuration: local URL, no payment delay.
///
/// # Panics
///
/// Panics if the fixed URL fails to parse.
#[must_use]
pub fn config() -> ClientConfig {
    match ClientConfig::new(InMemoryBackend::BASE_URL, "test-anon-key") {
        Ok(config) => config.with_payment_delay(Duration::ZERO),
        Err(err) => panic!("test config: {err}"),
    }
}
