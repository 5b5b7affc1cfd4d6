//! Recipe records and their wire representation.
//!
//! The `resep` table predates this client and keeps its Indonesian column
//! names. Its `bahan` column is overloaded: older rows hold plain ingredient
//! text while newer rows hold a JSON array whose first element is the URL of
//! the attached recipe document. [`Recipe`] splits that into two typed
//! fields, and [`decode_ingredients`]/[`encode_ingredients`] translate
//! between the two shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use cookmaster_core::{Price, RecipeId, ValidationError, validate_title};

use crate::backend::Row;

/// Backend table holding recipes.
pub const TABLE: &str = "resep";

/// A sellable recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    /// Recipe ID.
    pub id: RecipeId,
    /// Title shown in listings.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Price in Rupiah.
    pub price: Price,
    /// Public URL of the cover image.
    pub image_url: Option<String>,
    /// Ingredient lines.
    pub ingredients: Vec<String>,
    /// Public URL of the attached recipe document (PDF).
    pub document_url: Option<String>,
    /// Preparation steps.
    pub steps: Vec<String>,
    /// Label of the creator, if recorded.
    pub created_by: Option<String>,
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
}

impl Recipe {
    /// Case-insensitive match against title or description.
    ///
    /// A blank query matches everything.
    #[must_use]
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&query)
            || self.description.to_lowercase().contains(&query)
    }

    /// Attachment URLs owned by this recipe, image first.
    #[must_use]
    pub fn attachment_urls(&self) -> Vec<&str> {
        self.image_url
            .iter()
            .chain(self.document_url.iter())
            .map(String::as_str)
            .collect()
    }

    /// Decode a backend row.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the row has no usable `id`.
    pub fn from_row(row: Row) -> Result<Self, serde_json::Error> {
        let row: RecipeRow = serde_json::from_value(Value::Object(row))?;
        let (ingredients, document_url) = decode_ingredients(&row.bahan);

        Ok(Self {
            id: row.id,
            title: row.judul.unwrap_or_default(),
            description: row.deskripsi.unwrap_or_default(),
            price: row.harga.as_ref().map_or(Price::ZERO, price_from_value),
            image_url: non_empty(row.gambar),
            ingredients,
            document_url,
            steps: row.langkah.unwrap_or_default(),
            created_by: non_empty(row.dibuat_oleh),
            created_at: row.created_at,
        })
    }
}

/// Short form used by the home screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeSummary {
    /// Recipe ID.
    pub id: RecipeId,
    /// Title.
    pub title: String,
    /// Cover image URL.
    pub image_url: Option<String>,
    /// Creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
}

impl RecipeSummary {
    /// Decode a row selected with `id, judul, gambar, created_at`.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the row has no usable `id`.
    pub fn from_row(row: Row) -> Result<Self, serde_json::Error> {
        let row: RecipeRow = serde_json::from_value(Value::Object(row))?;
        Ok(Self {
            id: row.id,
            title: row.judul.unwrap_or_default(),
            image_url: non_empty(row.gambar),
            created_at: row.created_at,
        })
    }
}

/// Input for creating a recipe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewRecipe {
    /// Title (required, non-blank).
    pub title: String,
    /// Description.
    pub description: String,
    /// Price in Rupiah (required, positive).
    pub price: i64,
    /// Uploaded cover image URL.
    pub image_url: Option<String>,
    /// Ingredient lines.
    pub ingredients: Vec<String>,
    /// Uploaded recipe document URL.
    pub document_url: Option<String>,
    /// Preparation steps.
    pub steps: Vec<String>,
    /// Creator label.
    pub created_by: Option<String>,
}

impl NewRecipe {
    /// Validate and encode as an insert row.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for a blank title or non-positive price.
    pub fn to_row(&self) -> Result<Row, ValidationError> {
        let title = validate_title(&self.title)?;
        let price = Price::positive(self.price)?;

        let mut row = Row::new();
        row.insert("judul".into(), json!(title));
        row.insert("deskripsi".into(), json!(self.description.trim()));
        row.insert("harga".into(), json!(price.amount()));
        row.insert(
            "gambar".into(),
            json!(self.image_url.clone().unwrap_or_default()),
        );
        row.insert(
            "bahan".into(),
            encode_ingredients(&self.ingredients, self.document_url.as_deref()),
        );
        row.insert("langkah".into(), json!(self.steps));
        if let Some(created_by) = &self.created_by {
            row.insert("dibuat_oleh".into(), json!(created_by));
        }
        Ok(row)
    }
}

/// Partial update of a recipe. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipePatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New price in Rupiah.
    pub price: Option<i64>,
    /// New cover image URL.
    pub image_url: Option<String>,
    /// New ingredient lines.
    pub ingredients: Option<Vec<String>>,
    /// New document URL.
    pub document_url: Option<String>,
    /// New steps.
    pub steps: Option<Vec<String>>,
}

impl RecipePatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Validate and encode as an update row.
    ///
    /// `current` supplies the untouched half of the `bahan` column when only
    /// the ingredients or only the document changes.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] for a blank title or non-positive price.
    pub fn to_row(&self, current: Option<&Recipe>) -> Result<Row, ValidationError> {
        let mut row = Row::new();

        if let Some(title) = &self.title {
            row.insert("judul".into(), json!(validate_title(title)?));
        }
        if let Some(price) = self.price {
            row.insert("harga".into(), json!(Price::positive(price)?.amount()));
        }
        if let Some(description) = &self.description {
            row.insert("deskripsi".into(), json!(description.trim()));
        }
        if let Some(image_url) = &self.image_url {
            row.insert("gambar".into(), json!(image_url));
        }
        if self.ingredients.is_some() || self.document_url.is_some() {
            let ingredients = self
                .ingredients
                .as_deref()
                .or_else(|| current.map(|r| r.ingredients.as_slice()))
                .unwrap_or_default();
            let document_url = self
                .document_url
                .as_deref()
                .or_else(|| current.and_then(|r| r.document_url.as_deref()));
            row.insert(
                "bahan".into(),
                encode_ingredients(ingredients, document_url),
            );
        }
        if let Some(steps) = &self.steps {
            row.insert("langkah".into(), json!(steps));
        }
        Ok(row)
    }
}

/// Raw `resep` row.
#[derive(Debug, Deserialize)]
struct RecipeRow {
    id: RecipeId,
    #[serde(default)]
    judul: Option<String>,
    #[serde(default)]
    deskripsi: Option<String>,
    #[serde(default)]
    harga: Option<Value>,
    #[serde(default)]
    gambar: Option<String>,
    #[serde(default)]
    bahan: Value,
    #[serde(default)]
    langkah: Option<Vec<String>>,
    #[serde(default)]
    dibuat_oleh: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// Split the legacy `bahan` column into `(ingredients, document_url)`.
///
/// - array whose first element is empty or an http(s) URL: that element is
///   the document slot, the rest are ingredients
/// - any other array: every string element is an ingredient
/// - string: one ingredient per non-blank line
/// - anything else: nothing
#[must_use]
pub fn decode_ingredients(bahan: &Value) -> (Vec<String>, Option<String>) {
    match bahan {
        Value::Array(items) => {
            let strings: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            match strings.split_first() {
                Some((first, rest)) if first.is_empty() || is_http_url(first) => (
                    rest.iter().map(ToString::to_string).collect(),
                    non_empty(Some((*first).to_string())),
                ),
                _ => (strings.iter().map(ToString::to_string).collect(), None),
            }
        }
        Value::String(text) => (
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(ToString::to_string)
                .collect(),
            None,
        ),
        _ => (Vec::new(), None),
    }
}

/// Encode ingredients and document URL into the legacy `bahan` shape.
///
/// The first element is always the document slot so older readers that
/// take `bahan[0]` as the document keep working.
#[must_use]
pub fn encode_ingredients(ingredients: &[String], document_url: Option<&str>) -> Value {
    let mut items = Vec::with_capacity(ingredients.len() + 1);
    items.push(Value::String(document_url.unwrap_or_default().to_string()));
    items.extend(ingredients.iter().cloned().map(Value::String));
    Value::Array(items)
}

/// Read a price column that may arrive as an integer, float or string.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn price_from_value(value: &Value) -> Price {
    let amount = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    amount.map_or(Price::ZERO, Price::new)
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_decode_document_first_array() {
        let (ingredients, document) = decode_ingredients(&json!([
            "https://x.supabase.co/storage/v1/object/public/resep-images/dokumen/1_a.pdf",
            "2 butir telur"
        ]));
        assert_eq!(ingredients, vec!["2 butir telur"]);
        assert_eq!(
            document.as_deref(),
            Some("https://x.supabase.co/storage/v1/object/public/resep-images/dokumen/1_a.pdf")
        );
    }

    #[test]
    fn test_decode_empty_document_slot() {
        let (ingredients, document) = decode_ingredients(&json!([""]));
        assert!(ingredients.is_empty());
        assert!(document.is_none());
    }

    #[test]
    fn test_decode_plain_ingredient_array() {
        let (ingredients, document) = decode_ingredients(&json!(["nasi", "kecap"]));
        assert_eq!(ingredients, vec!["nasi", "kecap"]);
        assert!(document.is_none());
    }

    #[test]
    fn test_decode_plain_text() {
        let (ingredients, document) = decode_ingredients(&json!("nasi\n\n kecap manis \n"));
        assert_eq!(ingredients, vec!["nasi", "kecap manis"]);
        assert!(document.is_none());
    }

    #[test]
    fn test_decode_null() {
        assert_eq!(decode_ingredients(&Value::Null), (Vec::new(), None));
    }

    #[test]
    fn test_encode_keeps_document_slot_first() {
        let encoded = encode_ingredients(&["garam".to_string()], Some("https://doc"));
        assert_eq!(encoded, json!(["https://doc", "garam"]));
        assert_eq!(encode_ingredients(&[], None), json!([""]));
    }

    #[test]
    fn test_recipe_from_row() {
        let id = RecipeId::new_v4();
        let recipe = Recipe::from_row(row(json!({
            "id": id.to_string(),
            "judul": "Rendang",
            "deskripsi": "Daging sapi",
            "harga": 20000,
            "gambar": "",
            "bahan": ["https://doc.pdf"],
            "langkah": ["File PDF: rendang.pdf"],
            "created_at": "2025-01-02T03:04:05.123456+00:00"
        })))
        .unwrap();

        assert_eq!(recipe.id, id);
        assert_eq!(recipe.price, Price::new(20_000));
        assert!(recipe.image_url.is_none());
        assert_eq!(recipe.document_url.as_deref(), Some("https://doc.pdf"));
        assert_eq!(recipe.steps.len(), 1);
        assert!(recipe.created_at.is_some());
    }

    #[test]
    fn test_price_from_float_column() {
        assert_eq!(price_from_value(&json!(15000.0)), Price::new(15_000));
        assert_eq!(price_from_value(&json!("12000")), Price::new(12_000));
        assert_eq!(price_from_value(&Value::Null), Price::ZERO);
    }

    #[test]
    fn test_new_recipe_validation() {
        let mut input = NewRecipe {
            title: "  ".to_string(),
            price: 10_000,
            ..NewRecipe::default()
        };
        assert_eq!(input.to_row(), Err(ValidationError::EmptyTitle));

        input.title = "Soto".to_string();
        input.price = 0;
        assert_eq!(input.to_row(), Err(ValidationError::NonPositivePrice(0)));

        input.price = 12_000;
        let row = input.to_row().unwrap();
        assert_eq!(row.get("judul"), Some(&json!("Soto")));
        assert_eq!(row.get("bahan"), Some(&json!([""])));
    }

    #[test]
    fn test_patch_merges_document_with_current_ingredients() {
        let current = Recipe {
            id: RecipeId::new_v4(),
            title: "Soto".into(),
            description: String::new(),
            price: Price::new(10_000),
            image_url: None,
            ingredients: vec!["ayam".into()],
            document_url: Some("https://old.pdf".into()),
            steps: Vec::new(),
            created_by: None,
            created_at: None,
        };
        let patch = RecipePatch {
            document_url: Some("https://new.pdf".into()),
            ..RecipePatch::default()
        };
        let row = patch.to_row(Some(&current)).unwrap();
        assert_eq!(row.get("bahan"), Some(&json!(["https://new.pdf", "ayam"])));
        assert!(!row.contains_key("judul"));
    }

    #[test]
    fn test_patch_is_empty() {
        assert!(RecipePatch::default().is_empty());
        let patch = RecipePatch {
            steps: Some(Vec::new()),
            ..RecipePatch::default()
        };
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_search_matches() {
        let recipe = Recipe {
            id: RecipeId::new_v4(),
            title: "Nasi Goreng Spesial".into(),
            description: "Pedas manis".into(),
            price: Price::new(1),
            image_url: None,
            ingredients: Vec::new(),
            document_url: None,
            steps: Vec::new(),
            created_by: None,
            created_at: None,
        };
        assert!(recipe.matches("goreng"));
        assert!(recipe.matches("PEDAS"));
        assert!(recipe.matches("  "));
        assert!(!recipe.matches("soto"));
    }
}
