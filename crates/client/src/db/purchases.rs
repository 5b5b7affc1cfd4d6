//! Purchase repository and owned-recipes cache.
//!
//! The remote `purchase_history` table is the only source of truth for
//! ownership. The persisted set of owned recipe IDs is a read-through cache
//! in front of it, bound to a single user:
//!
//! - a cache hit answers "owned" without a remote call
//! - a miss asks the table and caches a positive answer
//! - fetching history replaces the cache wholesale, dropping stale entries
//! - signing out clears it

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use cookmaster_core::{Price, PurchaseId, RecipeId, UserId};

use super::{decode_returned, decode_rows, read_failed, write_failed};
use crate::backend::{Backend, Filter, Insert, Row, Select};
use crate::error::{AppError, Result, add_breadcrumb};
use crate::models::purchase::{self, PurchaseRecord, PurchaseWithRecipe};
use crate::notify::{Notice, Notifier};
use crate::persist::JsonStore;

/// Persisted owned-recipes cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedRecipes {
    /// User the set belongs to.
    pub user_id: Option<UserId>,
    /// Recipes known to be owned.
    pub recipe_ids: BTreeSet<RecipeId>,
}

impl OwnedRecipes {
    fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            recipe_ids: BTreeSet::new(),
        }
    }
}

/// Purchase history of the signed-in user.
pub struct PurchaseRepository {
    backend: Arc<dyn Backend>,
    notifier: Notifier,
    payment_delay: Duration,
    history: RwLock<Vec<PurchaseRecord>>,
    owned: RwLock<OwnedRecipes>,
    store: JsonStore<OwnedRecipes>,
}

impl PurchaseRepository {
    /// Create a repository persisting its cache to `store`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn Backend>,
        notifier: Notifier,
        store: JsonStore<OwnedRecipes>,
        payment_delay: Duration,
    ) -> Self {
        Self {
            backend,
            notifier,
            payment_delay,
            history: RwLock::new(Vec::new()),
            owned: RwLock::new(OwnedRecipes::default()),
            store,
        }
    }

    /// Snapshot of the held history, newest first.
    pub async fn history(&self) -> Vec<PurchaseRecord> {
        self.history.read().await.clone()
    }

    /// Record a purchase.
    ///
    /// This is the bare write used by checkout and direct buys. It publishes
    /// no notice; callers report the outcome of the whole flow.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Backend` if the insert fails.
    #[instrument(skip(self), fields(user_id = %user_id, recipe_id = %recipe_id))]
    pub async fn record(
        &self,
        user_id: UserId,
        recipe_id: RecipeId,
        price: Price,
    ) -> Result<PurchaseRecord> {
        let mut row = Row::new();
        row.insert("user_id".into(), json!(user_id.to_string()));
        row.insert("recipe_id".into(), json!(recipe_id.to_string()));
        row.insert("price".into(), json!(price.amount()));

        let rows = self
            .backend
            .insert(&Insert::one(purchase::TABLE, row))
            .await?;
        let record = decode_returned(purchase::TABLE, rows, PurchaseRecord::from_row)?;
        debug!(purchase_id = %record.id, "Purchase recorded");

        self.history.write().await.insert(0, record.clone());
        self.remember(user_id, recipe_id).await;
        Ok(record)
    }

    /// Replace the held history and the owned cache from the backend.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Backend` if the query fails; held state is kept.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn fetch_history(&self, user_id: UserId) -> Result<Vec<PurchaseRecord>> {
        let rows = self
            .backend
            .select(
                &Select::from(purchase::TABLE)
                    .eq("user_id", user_id.to_string())
                    .order("created_at", false),
            )
            .await
            .map_err(|e| read_failed("purchases.fetch_history", e))?;

        let records = decode_rows(purchase::TABLE, rows, PurchaseRecord::from_row);
        *self.history.write().await = records.clone();
        self.replace_owned(user_id, records.iter().map(|r| r.recipe_id))
            .await;
        Ok(records)
    }

    /// History joined with recipe title, image and description.
    ///
    /// Also refreshes the held history and the owned cache.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Backend` if the query fails; held state is kept.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn fetch_history_with_recipes(
        &self,
        user_id: UserId,
    ) -> Result<Vec<PurchaseWithRecipe>> {
        let rows = self
            .backend
            .select(
                &Select::from(purchase::TABLE)
                    .project(purchase::projection_with_recipe())
                    .eq("user_id", user_id.to_string())
                    .order("created_at", false),
            )
            .await
            .map_err(|e| read_failed("purchases.fetch_history_with_recipes", e))?;

        let items = decode_rows(purchase::TABLE, rows, PurchaseWithRecipe::from_row);
        *self.history.write().await = items.iter().map(|i| i.purchase.clone()).collect();
        self.replace_owned(user_id, items.iter().map(|i| i.purchase.recipe_id))
            .await;
        Ok(items)
    }

    /// Whether `user_id` owns `recipe_id`.
    ///
    /// Answers from the owned cache when it says yes; otherwise asks the
    /// backend and caches a positive answer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Backend` if the remote check fails.
    #[instrument(skip(self), fields(user_id = %user_id, recipe_id = %recipe_id))]
    pub async fn is_purchased(&self, user_id: UserId, recipe_id: RecipeId) -> Result<bool> {
        if self.load_owned(user_id).await.recipe_ids.contains(&recipe_id) {
            debug!("Cache hit for owned recipe");
            return Ok(true);
        }

        let filters = [
            Filter::Eq("user_id".to_string(), json!(user_id.to_string())),
            Filter::Eq("recipe_id".to_string(), json!(recipe_id.to_string())),
        ];
        let count = self
            .backend
            .count(purchase::TABLE, &filters)
            .await
            .map_err(|e| read_failed("purchases.is_purchased", e))?;

        if count > 0 {
            self.remember(user_id, recipe_id).await;
        }
        Ok(count > 0)
    }

    /// Cache-only ownership check. Never calls the backend.
    ///
    /// Loads the persisted set on first use, so the answer survives a
    /// restart. A cache bound to another user answers `false`.
    pub async fn is_purchased_cached(&self, user_id: UserId, recipe_id: RecipeId) -> bool {
        self.load_owned(user_id).await.recipe_ids.contains(&recipe_id)
    }

    /// Find a purchase, answering from held history when possible.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Backend` if the remote lookup fails.
    #[instrument(skip(self), fields(purchase_id = %id))]
    pub async fn get_by_id(&self, id: PurchaseId) -> Result<Option<PurchaseRecord>> {
        let cached = self
            .history
            .read()
            .await
            .iter()
            .find(|p| p.id == id)
            .cloned();
        if cached.is_some() {
            return Ok(cached);
        }

        let rows = self
            .backend
            .select(
                &Select::from(purchase::TABLE)
                    .eq("id", id.to_string())
                    .limit(1),
            )
            .await
            .map_err(|e| read_failed("purchases.get_by_id", e))?;

        Ok(rows
            .into_iter()
            .next()
            .map(PurchaseRecord::from_row)
            .transpose()?)
    }

    /// Buy a single recipe right away.
    ///
    /// Waits out the simulated payment delay, then records the purchase.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AlreadyPurchased` if the user owns the recipe,
    /// `AppError::Backend` if the ownership check or the insert fails.
    #[instrument(skip(self), fields(user_id = %user_id, recipe_id = %recipe_id))]
    pub async fn buy_now(
        &self,
        user_id: UserId,
        recipe_id: RecipeId,
        price: Price,
    ) -> Result<PurchaseRecord> {
        match self.try_buy_now(user_id, recipe_id, price).await {
            Ok(record) => {
                info!(purchase_id = %record.id, "Recipe purchased");
                add_breadcrumb(
                    "purchase",
                    "Bought recipe",
                    Some(&[("recipe_id", &recipe_id.to_string())]),
                );
                self.notifier.publish(Notice::success(
                    "Purchase complete",
                    format!("Paid {price}. The recipe is now yours."),
                ));
                Ok(record)
            }
            Err(err @ AppError::AlreadyPurchased(_)) => {
                self.notifier
                    .publish(Notice::info("Already owned", err.user_message()));
                Err(err)
            }
            Err(err) => Err(write_failed(
                &self.notifier,
                "purchases.buy_now",
                "Purchase failed",
                err,
            )),
        }
    }

    async fn try_buy_now(
        &self,
        user_id: UserId,
        recipe_id: RecipeId,
        price: Price,
    ) -> Result<PurchaseRecord> {
        if self.is_purchased(user_id, recipe_id).await? {
            return Err(AppError::AlreadyPurchased(recipe_id));
        }

        if !self.payment_delay.is_zero() {
            debug!(delay = ?self.payment_delay, "Processing payment");
            tokio::time::sleep(self.payment_delay).await;
        }

        self.record(user_id, recipe_id, price).await
    }

    /// Forget the history and the owned cache, including its persisted copy.
    #[instrument(skip(self))]
    pub async fn reset(&self) {
        self.history.write().await.clear();
        *self.owned.write().await = OwnedRecipes::default();
        if let Err(err) = self.store.clear().await {
            warn!(error = %err, "Failed to clear owned-recipes cache");
        }
    }

    /// Owned cache for `user_id`, loading the persisted copy on first use.
    async fn load_owned(&self, user_id: UserId) -> OwnedRecipes {
        {
            let held = self.owned.read().await;
            if held.user_id == Some(user_id) {
                return held.clone();
            }
        }
        let mut held = self.owned.write().await;
        self.bind_owned(&mut held, user_id).await;
        held.clone()
    }

    /// Point `held` at `user_id`, swapping in the persisted set if it matches.
    async fn bind_owned(&self, held: &mut OwnedRecipes, user_id: UserId) {
        if held.user_id == Some(user_id) {
            return;
        }
        let stored = match self.store.load().await {
            Ok(stored) => stored,
            Err(err) => {
                warn!(error = %err, "Ignoring unreadable owned-recipes cache");
                None
            }
        };
        *held = stored
            .filter(|s| s.user_id == Some(user_id))
            .unwrap_or_else(|| OwnedRecipes::for_user(user_id));
    }

    // The write guard spans load, insert and save so concurrent records
    // cannot overwrite each other's entries.
    async fn remember(&self, user_id: UserId, recipe_id: RecipeId) {
        let mut held = self.owned.write().await;
        self.bind_owned(&mut held, user_id).await;
        if held.recipe_ids.insert(recipe_id) {
            self.persist_owned(&held).await;
        }
    }

    async fn replace_owned(&self, user_id: UserId, recipe_ids: impl Iterator<Item = RecipeId>) {
        let mut held = self.owned.write().await;
        *held = OwnedRecipes {
            user_id: Some(user_id),
            recipe_ids: recipe_ids.collect(),
        };
        self.persist_owned(&held).await;
    }

    async fn persist_owned(&self, owned: &OwnedRecipes) {
        if let Err(err) = self.store.save(owned).await {
            warn!(error = %err, "Failed to persist owned-recipes cache");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::backend::{InMemoryBackend, Operation};

    fn repo_with(store: JsonStore<OwnedRecipes>) -> (Arc<InMemoryBackend>, PurchaseRepository) {
        let backend = Arc::new(InMemoryBackend::new());
        let repo = PurchaseRepository::new(backend.clone(), Notifier::new(), store, Duration::ZERO);
        (backend, repo)
    }

    fn repo() -> (Arc<InMemoryBackend>, PurchaseRepository) {
        repo_with(JsonStore::memory())
    }

    #[tokio::test]
    async fn test_record_updates_history_and_cache() {
        let (backend, repo) = repo();
        let user = UserId::new_v4();
        let recipe = RecipeId::new_v4();

        let record = repo.record(user, recipe, Price::new(20_000)).await.unwrap();
        assert_eq!(record.price, Price::new(20_000));
        assert_eq!(repo.history().await.len(), 1);
        assert!(repo.is_purchased_cached(user, recipe).await);

        let rows = backend.rows("purchase_history");
        assert_eq!(rows[0]["price"], Value::from(20_000));
        assert_eq!(rows[0]["recipe_id"], Value::from(recipe.to_string()));
    }

    #[tokio::test]
    async fn test_is_purchased_reads_through_and_caches() {
        let (backend, repo) = repo();
        let user = UserId::new_v4();
        let recipe = RecipeId::new_v4();
        backend.seed(
            "purchase_history",
            json!({"user_id": user.to_string(), "recipe_id": recipe.to_string(), "price": 5000}),
        );

        assert!(!repo.is_purchased_cached(user, recipe).await);
        assert!(repo.is_purchased(user, recipe).await.unwrap());
        assert_eq!(backend.call_count(Operation::Count, "purchase_history"), 1);

        assert!(repo.is_purchased(user, recipe).await.unwrap());
        assert_eq!(backend.call_count(Operation::Count, "purchase_history"), 1);

        assert!(!repo.is_purchased(user, RecipeId::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_history_invalidates_stale_cache_entries() {
        let store = JsonStore::memory();
        let user = UserId::new_v4();
        let stale = RecipeId::new_v4();
        store
            .save(&OwnedRecipes {
                user_id: Some(user),
                recipe_ids: [stale].into(),
            })
            .await
            .unwrap();

        let (backend, repo) = repo_with(store.clone());
        let owned = RecipeId::new_v4();
        backend.seed(
            "purchase_history",
            json!({"user_id": user.to_string(), "recipe_id": owned.to_string(), "price": 1}),
        );

        assert!(repo.is_purchased(user, stale).await.unwrap());
        repo.fetch_history(user).await.unwrap();

        assert!(!repo.is_purchased_cached(user, stale).await);
        assert!(repo.is_purchased_cached(user, owned).await);
        assert_eq!(
            store.load().await.unwrap().unwrap().recipe_ids,
            [owned].into()
        );
    }

    #[tokio::test]
    async fn test_cache_of_other_user_is_ignored() {
        let store = JsonStore::memory();
        let recipe = RecipeId::new_v4();
        store
            .save(&OwnedRecipes {
                user_id: Some(UserId::new_v4()),
                recipe_ids: [recipe].into(),
            })
            .await
            .unwrap();

        let (_backend, repo) = repo_with(store);
        assert!(!repo.is_purchased(UserId::new_v4(), recipe).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_history_with_recipes_joins_details() {
        let (backend, repo) = repo();
        let user = UserId::new_v4();
        let recipe = backend.seed("resep", json!({"judul": "Rendang", "deskripsi": "Pedas", "harga": 20000}));
        backend.seed(
            "purchase_history",
            json!({"user_id": user.to_string(), "recipe_id": recipe["id"], "price": 20000}),
        );

        let items = repo.fetch_history_with_recipes(user).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].recipe.as_ref().unwrap().title, "Rendang");
        assert_eq!(repo.history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_buy_now_rejects_owned_recipe() {
        let (backend, repo) = repo();
        let user = UserId::new_v4();
        let recipe = RecipeId::new_v4();

        repo.buy_now(user, recipe, Price::new(15_000)).await.unwrap();
        let err = repo.buy_now(user, recipe, Price::new(15_000)).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyPurchased(id) if id == recipe));
        assert_eq!(backend.rows("purchase_history").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buy_now_waits_for_payment_delay() {
        let backend = Arc::new(InMemoryBackend::new());
        let repo = PurchaseRepository::new(
            backend.clone(),
            Notifier::new(),
            JsonStore::memory(),
            Duration::from_millis(2000),
        );

        let started = tokio::time::Instant::now();
        repo.buy_now(UserId::new_v4(), RecipeId::new_v4(), Price::new(1000))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_get_by_id_prefers_history() {
        let (backend, repo) = repo();
        let record = repo
            .record(UserId::new_v4(), RecipeId::new_v4(), Price::new(1))
            .await
            .unwrap();
        backend.clear_calls();

        assert_eq!(repo.get_by_id(record.id).await.unwrap(), Some(record));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let store = JsonStore::memory();
        let (_backend, repo) = repo_with(store.clone());
        let user = UserId::new_v4();
        let recipe = RecipeId::new_v4();
        repo.record(user, recipe, Price::new(1)).await.unwrap();

        repo.reset().await;
        assert!(repo.history().await.is_empty());
        assert!(!repo.is_purchased_cached(user, recipe).await);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cached_check_survives_restart_without_remote_call() {
        let store = JsonStore::memory();
        let user = UserId::new_v4();
        let recipe = RecipeId::new_v4();
        {
            let (_backend, repo) = repo_with(store.clone());
            repo.record(user, recipe, Price::new(1)).await.unwrap();
        }

        let (backend, restarted) = repo_with(store);
        assert!(restarted.is_purchased_cached(user, recipe).await);
        assert!(!restarted.is_purchased_cached(UserId::new_v4(), recipe).await);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_records_keep_every_cache_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::file(dir.path().join("owned.json"));
        let backend = Arc::new(InMemoryBackend::new().with_latency(Duration::from_millis(5)));
        let repo = PurchaseRepository::new(
            backend.clone(),
            Notifier::new(),
            store.clone(),
            Duration::ZERO,
        );
        let user = UserId::new_v4();
        let recipes: Vec<RecipeId> = (0..4).map(|_| RecipeId::new_v4()).collect();

        let (a, b, c, d) = tokio::join!(
            repo.record(user, recipes[0], Price::new(1)),
            repo.record(user, recipes[1], Price::new(2)),
            repo.record(user, recipes[2], Price::new(3)),
            repo.record(user, recipes[3], Price::new(4)),
        );
        for result in [a, b, c, d] {
            result.unwrap();
        }

        let persisted = store.load().await.unwrap().unwrap();
        assert_eq!(persisted.recipe_ids, recipes.iter().copied().collect());
        for recipe in &recipes {
            assert!(repo.is_purchased_cached(user, *recipe).await);
        }
    }
}
