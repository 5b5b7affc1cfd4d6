//! Recipe commands.

use std::path::PathBuf;

use cookmaster_client::models::{NewRecipe, Recipe, RecipePatch};
use cookmaster_client::{AppError, AppState};
use cookmaster_core::{Price, RecipeId, validate_title};

use super::{CliError, parse_id, read_file};

/// Recipe fields given on the command line. `None` leaves a field alone.
#[derive(Debug, Default)]
pub struct RecipeForm {
    pub title: Option<String>,
    pub price: Option<String>,
    pub description: Option<String>,
    pub ingredients: Option<Vec<String>>,
    pub steps: Option<Vec<String>>,
    pub image: Option<PathBuf>,
    pub document: Option<PathBuf>,
}

/// List recipes, optionally filtered.
pub async fn list(state: &AppState, search: Option<&str>) -> Result<(), CliError> {
    state.recipes().fetch_all().await?;
    let recipes = state.recipes().search(search.unwrap_or_default()).await;

    if recipes.is_empty() {
        println!("No recipes found");
        return Ok(());
    }
    for recipe in &recipes {
        println!("{}  {:<32} {}", recipe.id, recipe.title, recipe.price);
    }
    Ok(())
}

/// Show one recipe. Ingredients, steps and the document are only shown to
/// owners.
pub async fn show(state: &AppState, id: &str) -> Result<(), CliError> {
    let id: RecipeId = parse_id("recipe", id)?;
    let recipe = state
        .recipes()
        .get_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("recipe {id}")))?;

    let owned = match state.session().current_user().await {
        Some(user) => state.purchases().is_purchased(user.id, id).await?,
        None => false,
    };

    print_recipe(&recipe, owned);
    Ok(())
}

fn print_recipe(recipe: &Recipe, owned: bool) {
    println!("{}", recipe.title);
    println!("{}", recipe.price);
    if !recipe.description.is_empty() {
        println!("\n{}", recipe.description);
    }
    if let Some(image) = &recipe.image_url {
        println!("\nImage: {image}");
    }

    if !owned {
        println!("\nBuy this recipe to see ingredients and steps.");
        return;
    }

    if !recipe.ingredients.is_empty() {
        println!("\nIngredients:");
        for item in &recipe.ingredients {
            println!("  - {item}");
        }
    }
    if !recipe.steps.is_empty() {
        println!("\nSteps:");
        for (n, step) in recipe.steps.iter().enumerate() {
            println!("  {}. {step}", n + 1);
        }
    }
    if let Some(document) = &recipe.document_url {
        println!("\nDocument: {document}");
    }
}

/// Publish a recipe, uploading attachments first.
pub async fn add(state: &AppState, form: RecipeForm) -> Result<(), CliError> {
    let user = state.require_user().await?;
    validate_title(form.title.as_deref().unwrap_or_default()).map_err(AppError::from)?;
    let price = parse_price(form.price.as_deref().unwrap_or_default())?;
    let (image_url, document_url) = upload_attachments(state, form.image, form.document).await?;

    let recipe = state
        .recipes()
        .create(NewRecipe {
            title: form.title.unwrap_or_default(),
            description: form.description.unwrap_or_default(),
            price: price.amount(),
            image_url,
            ingredients: form.ingredients.unwrap_or_default(),
            document_url,
            steps: form.steps.unwrap_or_default(),
            created_by: user.email,
        })
        .await?;

    println!("{}", recipe.id);
    Ok(())
}

/// Change fields of a recipe.
pub async fn edit(state: &AppState, id: &str, form: RecipeForm) -> Result<(), CliError> {
    let id: RecipeId = parse_id("recipe", id)?;
    state.require_user().await?;
    if let Some(title) = &form.title {
        validate_title(title).map_err(AppError::from)?;
    }
    let price = form.price.as_deref().map(parse_price).transpose()?;

    let mut patch = RecipePatch {
        title: form.title,
        description: form.description,
        price: price.map(|p| p.amount()),
        ingredients: form.ingredients,
        steps: form.steps,
        ..RecipePatch::default()
    };
    if patch.is_empty() && form.image.is_none() && form.document.is_none() {
        println!("Nothing to change");
        return Ok(());
    }
    (patch.image_url, patch.document_url) =
        upload_attachments(state, form.image, form.document).await?;

    let recipe = state.recipes().update(id, patch).await?;

    print_recipe(&recipe, true);
    Ok(())
}

/// Delete a recipe.
pub async fn delete(state: &AppState, id: &str) -> Result<(), CliError> {
    let id: RecipeId = parse_id("recipe", id)?;
    state.require_user().await?;
    state.recipes().delete(id).await?;
    Ok(())
}

fn parse_price(input: &str) -> Result<Price, CliError> {
    Ok(Price::parse_positive(input).map_err(AppError::from)?)
}

async fn upload_attachments(
    state: &AppState,
    image: Option<PathBuf>,
    document: Option<PathBuf>,
) -> Result<(Option<String>, Option<String>), CliError> {
    let image_url = match image {
        Some(path) => {
            let (bytes, _) = read_file(path).await?;
            Some(state.recipes().upload_image(bytes).await?)
        }
        None => None,
    };
    let document_url = match document {
        Some(path) => {
            let (bytes, name) = read_file(path).await?;
            Some(state.recipes().upload_document(bytes, &name).await?)
        }
        None => None,
    };
    Ok((image_url, document_url))
}
