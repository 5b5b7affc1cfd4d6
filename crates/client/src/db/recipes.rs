//! Recipe repository.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use cookmaster_core::{RecipeId, ValidationError};

use super::{decode_returned, decode_rows, read_failed, write_failed};
use crate::backend::{Backend, Delete, Insert, Select, Update, object_path_from_public_url};
use crate::error::{AppError, Result};
use crate::models::recipe::{self, NewRecipe, Recipe, RecipePatch};
use crate::notify::{Notice, Notifier};

/// Recipes, newest first.
pub struct RecipeRepository {
    backend: Arc<dyn Backend>,
    notifier: Notifier,
    bucket: String,
    recipes: RwLock<Vec<Recipe>>,
}

impl RecipeRepository {
    /// Create an empty repository storing attachments in `bucket`.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, notifier: Notifier, bucket: impl Into<String>) -> Self {
        Self {
            backend,
            notifier,
            bucket: bucket.into(),
            recipes: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of the held recipes.
    pub async fn list(&self) -> Vec<Recipe> {
        self.recipes.read().await.clone()
    }

    /// Held recipes whose title or description contains `query`,
    /// ignoring case. A blank query returns everything.
    pub async fn search(&self, query: &str) -> Vec<Recipe> {
        self.recipes
            .read()
            .await
            .iter()
            .filter(|r| r.matches(query))
            .cloned()
            .collect()
    }

    /// Replace the held list with every recipe, newest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Backend` if the query fails; the held list is kept.
    #[instrument(skip(self))]
    pub async fn fetch_all(&self) -> Result<Vec<Recipe>> {
        let rows = self
            .backend
            .select(&Select::from(recipe::TABLE).order("created_at", false))
            .await
            .map_err(|e| read_failed("recipes.fetch_all", e))?;

        let recipes = decode_rows(recipe::TABLE, rows, Recipe::from_row);
        debug!(count = recipes.len(), "Fetched recipes");
        *self.recipes.write().await = recipes.clone();
        Ok(recipes)
    }

    /// Find a recipe, answering from the held list when possible.
    ///
    /// A held recipe is returned as-is, even if the remote row changed since
    /// the last [`fetch_all`](Self::fetch_all).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Backend` if the remote lookup fails.
    #[instrument(skip(self), fields(recipe_id = %id))]
    pub async fn get_by_id(&self, id: RecipeId) -> Result<Option<Recipe>> {
        let cached = self.cached(id).await;
        if cached.is_some() {
            debug!("Cache hit for recipe");
            return Ok(cached);
        }

        let rows = self
            .backend
            .select(
                &Select::from(recipe::TABLE)
                    .eq("id", id.to_string())
                    .limit(1),
            )
            .await
            .map_err(|e| read_failed("recipes.get_by_id", e))?;

        Ok(rows
            .into_iter()
            .next()
            .map(Recipe::from_row)
            .transpose()?)
    }

    /// Create a recipe and put it at the front of the held list.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a blank title or non-positive price
    /// (nothing is sent), `AppError::Backend` if the insert fails.
    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create(&self, input: NewRecipe) -> Result<Recipe> {
        match self.try_create(&input).await {
            Ok(recipe) => {
                info!(recipe_id = %recipe.id, "Recipe created");
                self.notifier.publish(Notice::success(
                    "Recipe saved",
                    format!("\"{}\" is now listed.", recipe.title),
                ));
                Ok(recipe)
            }
            Err(err) => Err(write_failed(
                &self.notifier,
                "recipes.create",
                "Could not save recipe",
                err,
            )),
        }
    }

    async fn try_create(&self, input: &NewRecipe) -> Result<Recipe> {
        let row = input.to_row()?;
        let rows = self
            .backend
            .insert(&Insert::one(recipe::TABLE, row))
            .await?;
        let recipe = decode_returned(recipe::TABLE, rows, Recipe::from_row)?;
        self.recipes.write().await.insert(0, recipe.clone());
        Ok(recipe)
    }

    /// Apply a partial update and refresh the held copy.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for invalid fields (nothing is sent),
    /// `AppError::NotFound` if no row matched, `AppError::Backend` if the
    /// update fails.
    #[instrument(skip(self, patch), fields(recipe_id = %id))]
    pub async fn update(&self, id: RecipeId, patch: RecipePatch) -> Result<Recipe> {
        match self.try_update(id, &patch).await {
            Ok(recipe) => {
                info!("Recipe updated");
                self.notifier
                    .publish(Notice::success("Recipe updated", "Changes saved."));
                Ok(recipe)
            }
            Err(err) => Err(write_failed(
                &self.notifier,
                "recipes.update",
                "Could not update recipe",
                err,
            )),
        }
    }

    async fn try_update(&self, id: RecipeId, patch: &RecipePatch) -> Result<Recipe> {
        // Changing only one half of the legacy `bahan` column needs the other.
        let needs_current = patch.ingredients.is_some() != patch.document_url.is_some();
        let current = if needs_current {
            self.get_by_id(id).await?
        } else {
            self.cached(id).await
        };

        let row = patch.to_row(current.as_ref())?;
        if row.is_empty() {
            return current.ok_or_else(|| AppError::NotFound(format!("recipe {id}")));
        }

        let rows = self
            .backend
            .update(&Update::table(recipe::TABLE, row).eq("id", id.to_string()))
            .await?;
        if rows.is_empty() {
            return Err(AppError::NotFound(format!("recipe {id}")));
        }
        let updated = decode_returned(recipe::TABLE, rows, Recipe::from_row)?;

        if let Some(held) = self
            .recipes
            .write()
            .await
            .iter_mut()
            .find(|r| r.id == id)
        {
            *held = updated.clone();
        }
        Ok(updated)
    }

    /// Delete a recipe and its attachments.
    ///
    /// Attachments go first. If storage removal fails the row is kept, so a
    /// retried delete still finds the same URLs. Attachment URLs whose
    /// storage path cannot be derived are skipped, and a recipe without
    /// attachments makes no storage call.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown recipe, `AppError::Backend`
    /// if file removal or the row delete fails.
    #[instrument(skip(self), fields(recipe_id = %id))]
    pub async fn delete(&self, id: RecipeId) -> Result<()> {
        match self.try_delete(id).await {
            Ok(()) => {
                info!("Recipe deleted");
                self.notifier
                    .publish(Notice::success("Recipe deleted", "The recipe was removed."));
                Ok(())
            }
            Err(err) => Err(write_failed(
                &self.notifier,
                "recipes.delete",
                "Could not delete recipe",
                err,
            )),
        }
    }

    async fn try_delete(&self, id: RecipeId) -> Result<()> {
        let recipe = self
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("recipe {id}")))?;

        let paths: Vec<String> = recipe
            .attachment_urls()
            .into_iter()
            .filter_map(|url| {
                let path = object_path_from_public_url(url, &self.bucket);
                if path.is_none() {
                    debug!(url, "Skipping attachment outside the bucket");
                }
                path
            })
            .collect();

        if !paths.is_empty() {
            self.backend.remove(&self.bucket, &paths).await?;
            debug!(count = paths.len(), "Removed attachments");
        }

        self.backend
            .delete(&Delete::from(recipe::TABLE).eq("id", id.to_string()))
            .await?;

        self.recipes.write().await.retain(|r| r.id != id);
        Ok(())
    }

    /// Upload a JPEG cover image and return its public URL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for empty input, `AppError::Backend` if
    /// the upload fails.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_image(&self, bytes: Vec<u8>) -> Result<String> {
        let path = format!("resep_{}.jpg", Utc::now().timestamp_millis());
        self.upload(bytes, &path, "image/jpeg", "image").await
    }

    /// Upload a PDF recipe document and return its public URL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for empty input, `AppError::Backend` if
    /// the upload fails.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_document(&self, bytes: Vec<u8>, file_name: &str) -> Result<String> {
        let path = format!(
            "dokumen/{}_{}",
            Utc::now().timestamp_millis(),
            sanitize_file_name(file_name)
        );
        self.upload(bytes, &path, "application/pdf", "document")
            .await
    }

    async fn upload(
        &self,
        bytes: Vec<u8>,
        path: &str,
        content_type: &str,
        kind: &'static str,
    ) -> Result<String> {
        let result: Result<String> = async {
            if bytes.is_empty() {
                return Err(AppError::from(ValidationError::EmptyFile(kind)));
            }
            self.backend
                .upload(&self.bucket, path, bytes, content_type)
                .await?;
            Ok(self.backend.public_url(&self.bucket, path))
        }
        .await;

        result.map_err(|err| {
            write_failed(&self.notifier, "recipes.upload", "Upload failed", err)
        })
    }

    async fn cached(&self, id: RecipeId) -> Option<Recipe> {
        self.recipes
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }
}

/// Keep a user-supplied file name inside its storage folder.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() {
        "document.pdf".to_string()
    } else {
        base.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::{InMemoryBackend, Operation};
    use crate::notify::NoticeLevel;

    const BUCKET: &str = "resep-images";

    fn repo() -> (Arc<InMemoryBackend>, RecipeRepository) {
        let backend = Arc::new(InMemoryBackend::new());
        let repo = RecipeRepository::new(backend.clone(), Notifier::new(), BUCKET);
        (backend, repo)
    }

    fn new_recipe(title: &str, price: i64) -> NewRecipe {
        NewRecipe {
            title: title.to_string(),
            description: "Enak".to_string(),
            price,
            ..NewRecipe::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_all_newest_first() {
        let (backend, repo) = repo();
        backend.seed("resep", json!({"judul": "Lama", "harga": 1000}));
        backend.seed("resep", json!({"judul": "Baru", "harga": 2000}));

        let recipes = repo.fetch_all().await.unwrap();
        let titles: Vec<_> = recipes.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Baru", "Lama"]);
        assert_eq!(repo.list().await.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_list() {
        let (backend, repo) = repo();
        backend.seed("resep", json!({"judul": "Soto", "harga": 1000}));
        repo.fetch_all().await.unwrap();

        backend.fail_next(Operation::Select, "offline");
        assert!(repo.fetch_all().await.is_err());
        assert_eq!(repo.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_get_by_id_cache_hit_issues_no_query() {
        let (backend, repo) = repo();
        let row = backend.seed("resep", json!({"judul": "Soto", "harga": 1000}));
        repo.fetch_all().await.unwrap();
        backend.clear_calls();

        let id: RecipeId = row["id"].as_str().unwrap().parse().unwrap();
        let found = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(found.title, "Soto");
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_get_by_id_miss_queries_backend() {
        let (backend, repo) = repo();
        let row = backend.seed("resep", json!({"judul": "Soto", "harga": 1000}));
        let id: RecipeId = row["id"].as_str().unwrap().parse().unwrap();

        assert!(repo.get_by_id(id).await.unwrap().is_some());
        assert_eq!(backend.call_count(Operation::Select, "resep"), 1);
        assert!(repo.get_by_id(RecipeId::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_prepends_and_validates_first() {
        let (backend, repo) = repo();
        repo.create(new_recipe("Pertama", 1000)).await.unwrap();
        let second = repo.create(new_recipe("Kedua", 2000)).await.unwrap();
        assert_eq!(repo.list().await[0].id, second.id);

        backend.clear_calls();
        let err = repo.create(new_recipe("  ", 1000)).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::EmptyTitle)
        ));
        let err = repo.create(new_recipe("Soto", 0)).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::NonPositivePrice(0))
        ));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_held_copy() {
        let (_backend, repo) = repo();
        let created = repo.create(new_recipe("Soto", 1000)).await.unwrap();

        let updated = repo
            .update(
                created.id,
                RecipePatch {
                    title: Some("Soto Betawi".to_string()),
                    price: Some(25_000),
                    ..RecipePatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "Soto Betawi");
        let held = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(held.price.amount(), 25_000);
        assert_eq!(held.description, "Enak");
    }

    #[tokio::test]
    async fn test_update_unknown_recipe_is_not_found() {
        let (_backend, repo) = repo();
        let err = repo
            .update(
                RecipeId::new_v4(),
                RecipePatch {
                    title: Some("X".to_string()),
                    ..RecipePatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_without_attachments_makes_no_storage_call() {
        let (backend, repo) = repo();
        let created = repo.create(new_recipe("Soto", 1000)).await.unwrap();
        backend.clear_calls();

        repo.delete(created.id).await.unwrap();
        assert_eq!(backend.call_count(Operation::Remove, BUCKET), 0);
        assert!(backend.rows("resep").is_empty());
        assert!(repo.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_files_before_row() {
        let (backend, repo) = repo();
        let image = repo.upload_image(vec![0xFF, 0xD8]).await.unwrap();
        let document = repo
            .upload_document(b"%PDF".to_vec(), "Resep Ibu.pdf")
            .await
            .unwrap();
        let created = repo
            .create(NewRecipe {
                image_url: Some(image),
                document_url: Some(document),
                ..new_recipe("Rendang", 20_000)
            })
            .await
            .unwrap();
        assert_eq!(backend.object_paths(BUCKET).len(), 2);
        backend.clear_calls();

        repo.delete(created.id).await.unwrap();

        let operations: Vec<Operation> = backend.calls().iter().map(|c| c.operation).collect();
        assert_eq!(operations, vec![Operation::Remove, Operation::Delete]);
        assert!(backend.object_paths(BUCKET).is_empty());
    }

    #[tokio::test]
    async fn test_delete_aborts_when_storage_fails() {
        let (backend, repo) = repo();
        let image = repo.upload_image(vec![1]).await.unwrap();
        let created = repo
            .create(NewRecipe {
                image_url: Some(image),
                ..new_recipe("Rendang", 20_000)
            })
            .await
            .unwrap();

        let mut notices = repo.notifier.subscribe();
        backend.fail_next(Operation::Remove, "storage down");
        assert!(repo.delete(created.id).await.is_err());

        assert_eq!(backend.rows("resep").len(), 1);
        assert_eq!(repo.list().await.len(), 1);
        assert_eq!(notices.recv().await.unwrap().level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn test_delete_skips_foreign_urls() {
        let (backend, repo) = repo();
        let created = repo
            .create(NewRecipe {
                image_url: Some("https://cdn.example.com/soto.jpg".to_string()),
                ..new_recipe("Soto", 1000)
            })
            .await
            .unwrap();
        backend.clear_calls();

        repo.delete(created.id).await.unwrap();
        assert_eq!(backend.call_count(Operation::Remove, BUCKET), 0);
    }

    #[tokio::test]
    async fn test_upload_paths_and_content_types() {
        let (backend, repo) = repo();
        let url = repo
            .upload_document(b"%PDF".to_vec(), "../secret/Resep.pdf")
            .await
            .unwrap();
        let path = object_path_from_public_url(&url, BUCKET).unwrap();
        assert!(path.starts_with("dokumen/"));
        assert!(path.ends_with("_Resep.pdf"));
        assert_eq!(
            backend.object_content_type(BUCKET, &path).as_deref(),
            Some("application/pdf")
        );

        let err = repo.upload_image(Vec::new()).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::EmptyFile("image"))
        ));
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let (backend, repo) = repo();
        backend.seed("resep", json!({"judul": "Nasi Goreng", "deskripsi": "Pedas", "harga": 1}));
        backend.seed("resep", json!({"judul": "Es Teh", "deskripsi": "Manis", "harga": 1}));
        repo.fetch_all().await.unwrap();

        assert_eq!(repo.search("GORENG").await.len(), 1);
        assert_eq!(repo.search("manis").await.len(), 1);
        assert_eq!(repo.search("").await.len(), 2);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("a/b/c.pdf"), "c.pdf");
        assert_eq!(sanitize_file_name("C:\\x\\y.pdf"), "y.pdf");
        assert_eq!(sanitize_file_name("  "), "document.pdf");
    }
}
