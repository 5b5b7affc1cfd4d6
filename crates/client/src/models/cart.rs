//! Cart lines joined with recipe summary fields.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cookmaster_core::{CartLineId, Price, RecipeId, UserId};

use super::recipe::{self, non_empty, price_from_value};
use crate::backend::{Embed, Projection, Row};

/// Backend table holding cart lines.
pub const TABLE: &str = "cart_items";

/// Title shown when the referenced recipe row is gone.
pub const FALLBACK_TITLE: &str = "Untitled";

/// Image shown when the referenced recipe has no cover image.
pub const PLACEHOLDER_IMAGE: &str = "https://via.placeholder.com/300x200?text=No+Image";

/// Projection used for every cart read: line columns plus the recipe
/// summary embedded through `resep_id`.
#[must_use]
pub fn projection() -> Projection {
    Projection::columns(&["id", "user_id", "resep_id", "quantity"]).embed(Embed::new(
        "resep",
        recipe::TABLE,
        "resep_id",
        &["judul", "gambar", "harga"],
    ))
}

/// A pending purchase of one recipe by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Cart line ID (not the recipe ID).
    pub id: CartLineId,
    /// Owning user.
    pub user_id: Option<UserId>,
    /// Referenced recipe.
    pub recipe_id: RecipeId,
    /// Quantity; recipes are sold once so this is 1 in practice.
    pub quantity: u32,
    /// Recipe title captured at fetch time.
    pub title: String,
    /// Recipe image captured at fetch time.
    pub image_url: String,
    /// Recipe price captured at fetch time.
    pub price: Price,
}

impl CartLine {
    /// Decode a row selected with [`projection`].
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the line or recipe IDs are missing.
    pub fn from_row(row: Row) -> Result<Self, serde_json::Error> {
        let row: CartLineRow = serde_json::from_value(Value::Object(row))?;

        // The embed arrives as an object, or as a one-element array when the
        // relationship is not declared as to-one.
        let summary = match row.resep {
            Some(Value::Array(items)) => items.into_iter().next(),
            other => other,
        }
        .and_then(|value| serde_json::from_value::<RecipeSummaryRow>(value).ok());

        let (title, image_url, price) = summary.map_or_else(
            || (None, None, Price::ZERO),
            |s| {
                (
                    non_empty(s.judul),
                    non_empty(s.gambar),
                    s.harga.as_ref().map_or(Price::ZERO, price_from_value),
                )
            },
        );

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            recipe_id: row.resep_id,
            quantity: row.quantity.unwrap_or(1),
            title: title.unwrap_or_else(|| FALLBACK_TITLE.to_string()),
            image_url: image_url.unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string()),
            price,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CartLineRow {
    id: CartLineId,
    #[serde(default)]
    user_id: Option<UserId>,
    resep_id: RecipeId,
    #[serde(default)]
    quantity: Option<u32>,
    #[serde(default)]
    resep: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RecipeSummaryRow {
    #[serde(default)]
    judul: Option<String>,
    #[serde(default)]
    gambar: Option<String>,
    #[serde(default)]
    harga: Option<Value>,
}
