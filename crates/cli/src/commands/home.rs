//! Home screen.

use cookmaster_client::AppState;

use super::CliError;

/// Print catalog counters and the newest recipes.
pub async fn show(state: &AppState) -> Result<(), CliError> {
    let stats = state.home().fetch_stats().await?;

    if let Some(user) = state.session().current_user().await {
        println!("Welcome back, {}", user.email.as_deref().unwrap_or("chef"));
    }
    println!("Recipes:   {}", stats.total_recipes);
    println!("Favorites: {}", stats.total_favorites);

    if !stats.latest.is_empty() {
        println!("\nNewest:");
        for recipe in &stats.latest {
            println!("  {}  {}", recipe.id, recipe.title);
        }
    }
    Ok(())
}
