//! Purchase commands.

use cookmaster_client::{AppError, AppState};
use cookmaster_core::RecipeId;

use super::{CliError, parse_id};

/// Buy one recipe at its current price.
pub async fn buy(state: &AppState, id: &str) -> Result<(), CliError> {
    let recipe_id: RecipeId = parse_id("recipe", id)?;
    let user = state.require_user().await?;
    let recipe = state
        .recipes()
        .get_by_id(recipe_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("recipe {recipe_id}")))?;

    println!("Processing payment for {} ({})...", recipe.title, recipe.price);
    let record = state
        .purchases()
        .buy_now(user.id, recipe_id, recipe.price)
        .await?;
    println!("{}", record.id);
    Ok(())
}

/// Print purchase history, newest first.
pub async fn history(state: &AppState, details: bool) -> Result<(), CliError> {
    let user = state.require_user().await?;

    if details {
        let items = state.purchases().fetch_history_with_recipes(user.id).await?;
        if items.is_empty() {
            println!("No purchases yet");
        }
        for item in &items {
            let when = item
                .purchase
                .created_at
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            match &item.recipe {
                Some(recipe) => {
                    println!("{when}  {:<32} {}", recipe.title, item.purchase.price);
                    if !recipe.description.is_empty() {
                        println!("            {}", recipe.description);
                    }
                }
                None => println!(
                    "{when}  {:<32} {}",
                    "(recipe removed)", item.purchase.price
                ),
            }
        }
        return Ok(());
    }

    let records = state.purchases().fetch_history(user.id).await?;
    if records.is_empty() {
        println!("No purchases yet");
    }
    for record in &records {
        println!("{}  {}  {}", record.id, record.recipe_id, record.price);
    }
    Ok(())
}
