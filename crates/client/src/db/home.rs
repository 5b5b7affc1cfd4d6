//! Home screen statistics.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{decode_rows, read_failed};
use crate::backend::{Backend, Projection, Select};
use crate::error::Result;
use crate::models::home::{HomeStats, LATEST_COUNT, estimate_favorites};
use crate::models::recipe::{self, RecipeSummary};

/// Catalog counters and the newest recipes.
pub struct HomeRepository {
    backend: Arc<dyn Backend>,
    stats: RwLock<HomeStats>,
}

impl HomeRepository {
    /// Create a repository with zeroed stats.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            stats: RwLock::new(HomeStats::default()),
        }
    }

    /// Last fetched stats.
    pub async fn stats(&self) -> HomeStats {
        self.stats.read().await.clone()
    }

    /// Count the catalog and load the newest recipes.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Backend` if either query fails; held stats are kept.
    #[instrument(skip(self))]
    pub async fn fetch_stats(&self) -> Result<HomeStats> {
        let total_recipes = self
            .backend
            .count(recipe::TABLE, &[])
            .await
            .map_err(|e| read_failed("home.count", e))?;

        let rows = self
            .backend
            .select(
                &Select::from(recipe::TABLE)
                    .project(Projection::columns(&["id", "judul", "gambar", "created_at"]))
                    .order("created_at", false)
                    .limit(LATEST_COUNT),
            )
            .await
            .map_err(|e| read_failed("home.latest", e))?;

        let stats = HomeStats {
            total_recipes,
            total_favorites: estimate_favorites(total_recipes),
            latest: decode_rows(recipe::TABLE, rows, RecipeSummary::from_row),
        };
        debug!(total = total_recipes, "Home stats fetched");

        *self.stats.write().await = stats.clone();
        Ok(stats)
    }
}
