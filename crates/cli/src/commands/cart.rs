//! Cart commands.

use cookmaster_client::AppState;
use cookmaster_client::db::AddOutcome;
use cookmaster_core::{CartLineId, RecipeId};

use super::{CliError, parse_id};

/// Print the cart and its total.
pub async fn list(state: &AppState) -> Result<(), CliError> {
    let user = state.require_user().await?;
    let lines = state.cart().fetch(user.id).await?;

    if lines.is_empty() {
        println!("Your cart is empty");
        return Ok(());
    }
    for line in &lines {
        println!("{}  {:<32} {}", line.id, line.title, line.price);
    }
    println!("Total: {}", state.cart().total().await);
    Ok(())
}

/// Add a recipe to the cart.
pub async fn add(state: &AppState, id: &str) -> Result<(), CliError> {
    let recipe_id: RecipeId = parse_id("recipe", id)?;
    let user = state.require_user().await?;

    // Duplicate suppression checks the held lines
    state.cart().fetch(user.id).await?;
    if let AddOutcome::Added(line) = state.cart().add(user.id, recipe_id).await? {
        println!("{}", line.id);
    }
    Ok(())
}

/// Remove a cart line.
pub async fn remove(state: &AppState, line: &str) -> Result<(), CliError> {
    let line_id: CartLineId = parse_id("cart line", line)?;
    state.require_user().await?;
    state.cart().remove(line_id).await?;
    Ok(())
}

/// Buy everything in the cart.
pub async fn checkout(state: &AppState) -> Result<(), CliError> {
    let user = state.require_user().await?;
    state.cart().fetch(user.id).await?;

    let receipt = state.cart().checkout(user.id).await?;
    if receipt.purchases.is_empty() {
        println!("Your cart is empty");
        return Ok(());
    }
    for purchase in &receipt.purchases {
        println!("{}  {}", purchase.recipe_id, purchase.price);
    }
    println!("Paid: {}", receipt.total);
    Ok(())
}
