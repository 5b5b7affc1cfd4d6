//! Purchase history records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cookmaster_core::{Price, PurchaseId, RecipeId, UserId};

use super::recipe::{self, non_empty};
use crate::backend::{Embed, Projection, Row};

/// Backend table holding purchase history.
pub const TABLE: &str = "purchase_history";

/// Projection for history rows joined with recipe details.
#[must_use]
pub fn projection_with_recipe() -> Projection {
    Projection::all().embed(Embed::new(
        "recipe",
        recipe::TABLE,
        "recipe_id",
        &["judul", "gambar", "deskripsi"],
    ))
}

/// Durable proof that a user bought a recipe at a given price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    /// Purchase ID.
    pub id: PurchaseId,
    /// Buyer.
    pub user_id: UserId,
    /// Purchased recipe.
    pub recipe_id: RecipeId,
    /// Price paid in Rupiah.
    pub price: Price,
    /// When the purchase happened, if the backend records it separately.
    #[serde(default)]
    pub purchase_date: Option<DateTime<Utc>>,
    /// Row creation timestamp.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Row update timestamp.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PurchaseRecord {
    /// Decode a `purchase_history` row.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if required columns are missing.
    pub fn from_row(row: Row) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(row))
    }
}

/// Recipe details shown next to a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasedRecipe {
    /// Recipe title.
    pub title: String,
    /// Cover image URL.
    pub image_url: Option<String>,
    /// Recipe description.
    pub description: String,
}

/// A purchase joined with its recipe, for the "my recipes" list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseWithRecipe {
    /// The purchase.
    pub purchase: PurchaseRecord,
    /// Recipe details, absent if the recipe was deleted.
    pub recipe: Option<PurchasedRecipe>,
}

impl PurchaseWithRecipe {
    /// Decode a row selected with [`projection_with_recipe`].
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the purchase columns are missing.
    pub fn from_row(mut row: Row) -> Result<Self, serde_json::Error> {
        let embedded = match row.remove("recipe") {
            Some(Value::Array(items)) => items.into_iter().next(),
            other => other,
        };
        let recipe = embedded
            .and_then(|value| serde_json::from_value::<PurchasedRecipeRow>(value).ok())
            .map(|r| PurchasedRecipe {
                title: r.judul.unwrap_or_default(),
                image_url: non_empty(r.gambar),
                description: r.deskripsi.unwrap_or_default(),
            });

        Ok(Self {
            purchase: PurchaseRecord::from_row(row)?,
            recipe,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PurchasedRecipeRow {
    #[serde(default)]
    judul: Option<String>,
    #[serde(default)]
    gambar: Option<String>,
    #[serde(default)]
    deskripsi: Option<String>,
}
