//! Direct buys, purchase history and the owned-recipes cache.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use cookmaster_client::backend::{InMemoryBackend, Operation};
use cookmaster_client::persist::JsonStore;
use cookmaster_client::{AppError, NoticeLevel};
use cookmaster_core::Price;
use cookmaster_integration_tests::TestContext;
use serde_json::json;

#[tokio::test]
async fn test_buy_now_then_reject_second_buy() {
    let mut ctx = TestContext::new();
    let user = ctx.signed_in().await;
    let recipe = ctx.seed_recipe("Rendang", 20_000);
    ctx.drain_notices();

    let record = ctx
        .state
        .purchases()
        .buy_now(user.id, recipe, Price::new(20_000))
        .await
        .unwrap();
    assert_eq!(record.recipe_id, recipe);
    assert_eq!(ctx.notice_titles(NoticeLevel::Success), ["Purchase complete"]);

    let err = ctx
        .state
        .purchases()
        .buy_now(user.id, recipe, Price::new(20_000))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyPurchased(id) if id == recipe));
    assert_eq!(ctx.backend.rows("purchase_history").len(), 1);
}

#[tokio::test]
async fn test_owned_cache_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonStore::file(dir.path().join("owned_recipes.json"));

    let ctx = TestContext::reopen(Arc::new(InMemoryBackend::new()), store.clone());
    let user = ctx.signed_in().await;
    let recipe = ctx.seed_recipe("Soto", 15_000);
    ctx.state
        .purchases()
        .record(user.id, recipe, Price::new(15_000))
        .await
        .unwrap();

    let reopened = TestContext::reopen(ctx.backend.clone(), JsonStore::file(store.path().unwrap()));
    reopened.backend.clear_calls();

    assert!(reopened
        .state
        .purchases()
        .is_purchased(user.id, recipe)
        .await
        .unwrap());
    assert_eq!(
        reopened.backend.call_count(Operation::Count, "purchase_history"),
        0
    );
}

#[tokio::test]
async fn test_remote_table_is_the_source_of_truth() {
    let ctx = TestContext::new();
    let user = ctx.signed_in().await;
    let recipe = ctx.seed_recipe("Pecel", 9_000);

    // Bought on another device: not cached yet, found remotely
    ctx.backend.seed(
        "purchase_history",
        json!({
            "user_id": user.id.to_string(),
            "recipe_id": recipe.to_string(),
            "price": 9000
        }),
    );
    assert!(!ctx.state.purchases().is_purchased_cached(user.id, recipe).await);
    assert!(ctx.state.purchases().is_purchased(user.id, recipe).await.unwrap());
    assert!(ctx.state.purchases().is_purchased_cached(user.id, recipe).await);
}

#[tokio::test]
async fn test_history_with_recipe_details() {
    let ctx = TestContext::new();
    let user = ctx.signed_in().await;
    let a = ctx.seed_recipe("Nasi Goreng", 12_000);
    let b = ctx.seed_recipe("Sate", 18_000);
    for (id, price) in [(a, 12_000), (b, 18_000)] {
        ctx.state
            .purchases()
            .record(user.id, id, Price::new(price))
            .await
            .unwrap();
    }

    let items = ctx
        .state
        .purchases()
        .fetch_history_with_recipes(user.id)
        .await
        .unwrap();

    let titles: Vec<_> = items
        .iter()
        .map(|i| i.recipe.as_ref().unwrap().title.as_str())
        .collect();
    assert_eq!(titles, ["Sate", "Nasi Goreng"]);
    assert_eq!(
        items[0].recipe.as_ref().unwrap().description,
        "Sate khas"
    );
}

#[tokio::test]
async fn test_history_read_failure_keeps_previous_history() {
    let ctx = TestContext::new();
    let user = ctx.signed_in().await;
    let recipe = ctx.seed_recipe("Opor", 11_000);
    ctx.state
        .purchases()
        .record(user.id, recipe, Price::new(11_000))
        .await
        .unwrap();

    ctx.backend.fail_next(Operation::Select, "offline");
    assert!(ctx.state.purchases().fetch_history(user.id).await.is_err());
    assert_eq!(ctx.state.purchases().history().await.len(), 1);
}

#[tokio::test]
async fn test_sign_out_clears_owned_cache() {
    let ctx = TestContext::new();
    let user = ctx.signed_in().await;
    let recipe = ctx.seed_recipe("Bakso", 10_000);
    ctx.state
        .purchases()
        .record(user.id, recipe, Price::new(10_000))
        .await
        .unwrap();

    ctx.state.sign_out().await.unwrap();

    assert!(!ctx.state.purchases().is_purchased_cached(user.id, recipe).await);
    assert!(ctx.state.purchases().history().await.is_empty());
}
