//! Application state shared across screens and commands.

use std::sync::Arc;

use tracing::instrument;

use crate::backend::{Backend, SupabaseClient};
use crate::config::ClientConfig;
use crate::db::{
    CartRepository, HomeRepository, OwnedRecipes, PurchaseRepository, RecipeRepository,
};
use crate::error::Result;
use crate::models::CurrentUser;
use crate::notify::Notifier;
use crate::persist::JsonStore;
use crate::services::auth::SessionManager;

/// Application state shared across all front ends.
///
/// This struct is cheaply cloneable via `Arc`. Every repository talks to the
/// same backend and publishes on the same [`Notifier`].
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ClientConfig,
    notifier: Notifier,
    session: SessionManager,
    recipes: RecipeRepository,
    cart: CartRepository,
    purchases: Arc<PurchaseRepository>,
    home: HomeRepository,
}

impl AppState {
    /// Create state backed by the hosted backend.
    ///
    /// The auth session and the owned-recipes cache are persisted under
    /// `config.state_dir`.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let backend = Arc::new(SupabaseClient::new(&config));
        let owned = JsonStore::file(config.owned_recipes_path());
        Self::with_backend(config, backend, owned)
    }

    /// Create state over any backend, e.g. `InMemoryBackend` in tests.
    #[must_use]
    pub fn with_backend(
        config: ClientConfig,
        backend: Arc<dyn Backend>,
        owned: JsonStore<OwnedRecipes>,
    ) -> Self {
        let notifier = Notifier::new();
        let purchases = Arc::new(PurchaseRepository::new(
            backend.clone(),
            notifier.clone(),
            owned,
            config.payment_delay,
        ));

        Self {
            inner: Arc::new(AppStateInner {
                session: SessionManager::new(backend.clone(), notifier.clone()),
                recipes: RecipeRepository::new(
                    backend.clone(),
                    notifier.clone(),
                    config.storage_bucket.clone(),
                ),
                cart: CartRepository::new(backend.clone(), notifier.clone(), purchases.clone()),
                home: HomeRepository::new(backend.clone()),
                purchases,
                notifier,
                config,
            }),
        }
    }

    /// Get a reference to the client configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Get a reference to the notice channel.
    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.inner.notifier
    }

    /// Get a reference to the session manager.
    #[must_use]
    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    /// Get a reference to the recipe repository.
    #[must_use]
    pub fn recipes(&self) -> &RecipeRepository {
        &self.inner.recipes
    }

    /// Get a reference to the cart repository.
    #[must_use]
    pub fn cart(&self) -> &CartRepository {
        &self.inner.cart
    }

    /// Get a reference to the purchase repository.
    #[must_use]
    pub fn purchases(&self) -> &PurchaseRepository {
        &self.inner.purchases
    }

    /// Get a reference to the home repository.
    #[must_use]
    pub fn home(&self) -> &HomeRepository {
        &self.inner.home
    }

    /// Rehydrate the persisted session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` if the persisted session cannot be read.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<Option<CurrentUser>> {
        Ok(self.inner.session.restore().await?)
    }

    /// The signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` when nobody is signed in.
    pub async fn require_user(&self) -> Result<CurrentUser> {
        Ok(self.inner.session.require_user().await?)
    }

    /// Sign out and drop every per-user collection.
    ///
    /// The cart and the owned-recipes cache are cleared even if the remote
    /// sign-out fails.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` if the auth service could not be told.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<()> {
        let result = self.inner.session.sign_out().await;
        self.inner.cart.clear_local().await;
        self.inner.purchases.reset().await;
        Ok(result?)
    }
}
