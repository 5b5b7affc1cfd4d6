//! Recipe catalog and attachment scenarios.

#![allow(clippy::unwrap_used)]

use cookmaster_client::backend::{Operation, object_path_from_public_url};
use cookmaster_client::models::{NewRecipe, RecipePatch};
use cookmaster_client::{AppError, NoticeLevel};
use cookmaster_core::{Price, ValidationError};
use cookmaster_integration_tests::TestContext;

const BUCKET: &str = "resep-images";

fn rendang() -> NewRecipe {
    NewRecipe {
        title: "Rendang".to_string(),
        description: "Rendang daging sapi".to_string(),
        price: 25_000,
        ingredients: vec!["1 kg daging".to_string(), "santan".to_string()],
        steps: vec!["Masak perlahan".to_string()],
        ..NewRecipe::default()
    }
}

#[tokio::test]
async fn test_publish_with_attachments_then_delete() {
    let ctx = TestContext::new();
    ctx.signed_in().await;

    let image_url = ctx.state.recipes().upload_image(vec![0xFF, 0xD8]).await.unwrap();
    let document_url = ctx
        .state
        .recipes()
        .upload_document(b"%PDF-1.7".to_vec(), "rendang.pdf")
        .await
        .unwrap();

    let recipe = ctx
        .state
        .recipes()
        .create(NewRecipe {
            image_url: Some(image_url),
            document_url: Some(document_url.clone()),
            ..rendang()
        })
        .await
        .unwrap();
    assert_eq!(recipe.document_url.as_deref(), Some(document_url.as_str()));
    assert_eq!(recipe.ingredients.len(), 2);
    assert_eq!(ctx.backend.object_paths(BUCKET).len(), 2);
    let document_path = object_path_from_public_url(&document_url, BUCKET).unwrap();
    assert_eq!(
        ctx.backend.object(BUCKET, &document_path).as_deref(),
        Some(b"%PDF-1.7".as_slice())
    );

    ctx.state.recipes().delete(recipe.id).await.unwrap();

    assert!(ctx.backend.object_paths(BUCKET).is_empty());
    assert!(ctx.backend.rows("resep").is_empty());
    assert!(ctx.state.recipes().list().await.is_empty());
}

#[tokio::test]
async fn test_storage_failure_keeps_recipe_row() {
    let ctx = TestContext::new();
    let image_url = ctx.state.recipes().upload_image(vec![1, 2, 3]).await.unwrap();
    let recipe = ctx
        .state
        .recipes()
        .create(NewRecipe {
            image_url: Some(image_url),
            ..rendang()
        })
        .await
        .unwrap();

    ctx.backend.fail_next(Operation::Remove, "storage unavailable");
    assert!(ctx.state.recipes().delete(recipe.id).await.is_err());

    assert_eq!(ctx.backend.rows("resep").len(), 1);
    assert_eq!(ctx.backend.object_paths(BUCKET).len(), 1);
}

#[tokio::test]
async fn test_invalid_input_sends_nothing() {
    let mut ctx = TestContext::new();
    ctx.backend.clear_calls();

    let err = ctx
        .state
        .recipes()
        .create(NewRecipe {
            price: 0,
            ..rendang()
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::Validation(ValidationError::NonPositivePrice(0))
    ));
    assert!(ctx.backend.calls().is_empty());
    assert_eq!(ctx.notice_titles(NoticeLevel::Error).len(), 1);
}

#[tokio::test]
async fn test_update_and_search() {
    let ctx = TestContext::new();
    let recipe = ctx.state.recipes().create(rendang()).await.unwrap();
    ctx.state.recipes().create(NewRecipe {
        title: "Soto Ayam".to_string(),
        ..rendang()
    })
    .await
    .unwrap();

    let updated = ctx
        .state
        .recipes()
        .update(
            recipe.id,
            RecipePatch {
                price: Some(30_000),
                ..RecipePatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.price, Price::new(30_000));
    assert_eq!(updated.ingredients, recipe.ingredients);

    ctx.state.recipes().fetch_all().await.unwrap();
    let found = ctx.state.recipes().search("soto").await;
    assert_eq!(found.len(), 1);
    assert_eq!(ctx.state.recipes().search("").await.len(), 2);
}

#[tokio::test]
async fn test_home_stats() {
    let ctx = TestContext::new();
    for title in ["A", "B", "C", "D"] {
        ctx.seed_recipe(title, 1_000);
    }

    let stats = ctx.state.home().fetch_stats().await.unwrap();

    assert_eq!(stats.total_recipes, 4);
    assert_eq!(stats.total_favorites, 2);
    assert_eq!(stats.latest.len(), 3);
    assert_eq!(stats.latest[0].title, "D");
}
