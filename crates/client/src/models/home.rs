//! Home screen statistics.

use serde::{Deserialize, Serialize};

use super::recipe::RecipeSummary;

/// Share of recipes reported as favorites until real favorites exist.
pub const FAVORITE_RATIO_PERCENT: u64 = 60;

/// Number of recipes listed under "latest".
pub const LATEST_COUNT: usize = 3;

/// Counters and the newest recipes shown on the home screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeStats {
    /// Number of recipes in the catalog.
    pub total_recipes: u64,
    /// Estimated favorites, derived from the recipe count.
    pub total_favorites: u64,
    /// Newest recipes, newest first.
    pub latest: Vec<RecipeSummary>,
}

/// Favorite estimate: 60% of the recipe count, rounded down.
#[must_use]
pub const fn estimate_favorites(total_recipes: u64) -> u64 {
    total_recipes.saturating_mul(FAVORITE_RATIO_PERCENT) / 100
}
