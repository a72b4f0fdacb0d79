use std::collections::HashSet;

use tracing::{info, warn};

use super::{
    dto::{RecipeListQuery, RecipeResponse, RecipeSummary, RecipeWriteRequest},
    extract::RecipeForm,
    repo_types::{AmountEntry, Recipe, RecipeDraft, RecipeFilter},
};
use crate::{
    error::ApiError,
    images::{self, ImageUpload},
    pagination::PageWindow,
    relations::RelationKind,
    state::AppState,
    users::services::user_response,
};

pub const MAX_NAME_LEN: usize = 200;
/// Upper bound of cooking time and amounts.
pub const MAX_QUANTITY: i64 = i16::MAX as i64;

fn quantity(value: i64, what: &str) -> Result<i32, ApiError> {
    if value < 1 {
        return Err(ApiError::validation(format!("{what} must be at least 1.")));
    }
    if value > MAX_QUANTITY {
        return Err(ApiError::validation(format!(
            "{what} must be at most {MAX_QUANTITY}."
        )));
    }
    Ok(value as i32)
}

/// Field-level checks of the write shape. References to tags and
/// ingredients are checked separately against the repositories.
pub fn validate(req: &RecipeWriteRequest) -> Result<RecipeDraft, ApiError> {
    let name = req.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::validation(format!(
            "Name must be 1 to {MAX_NAME_LEN} characters."
        )));
    }
    if req.text.trim().is_empty() {
        return Err(ApiError::validation("Text must not be empty."));
    }
    let cooking_time = quantity(req.cooking_time, "Cooking time")?;

    if req.tags.is_empty() {
        return Err(ApiError::validation("At least one tag is required."));
    }
    let mut seen = HashSet::new();
    if !req.tags.iter().all(|id| seen.insert(*id)) {
        return Err(ApiError::validation("Tags must not repeat."));
    }

    if req.ingredients.is_empty() {
        return Err(ApiError::validation("At least one ingredient is required."));
    }
    let mut seen = HashSet::new();
    let mut ingredients = Vec::with_capacity(req.ingredients.len());
    for item in &req.ingredients {
        if !seen.insert(item.id) {
            return Err(ApiError::validation("Ingredients must not repeat."));
        }
        ingredients.push(AmountEntry {
            ingredient_id: item.id,
            amount: quantity(item.amount, "Amount")?,
        });
    }

    Ok(RecipeDraft {
        name: name.to_string(),
        image: None,
        text: req.text.clone(),
        cooking_time,
        tag_ids: req.tags.clone(),
        ingredients,
    })
}

async fn check_references(st: &AppState, draft: &RecipeDraft) -> Result<(), ApiError> {
    let found: HashSet<i64> = st
        .tags
        .find_many(&draft.tag_ids)
        .await?
        .into_iter()
        .map(|t| t.id)
        .collect();
    if let Some(missing) = draft.tag_ids.iter().find(|id| !found.contains(id)) {
        return Err(ApiError::validation(format!("Tag {missing} does not exist.")));
    }

    let ids: Vec<i64> = draft.ingredients.iter().map(|e| e.ingredient_id).collect();
    let found: HashSet<i64> = st
        .ingredients
        .find_many(&ids)
        .await?
        .into_iter()
        .map(|i| i.id)
        .collect();
    if let Some(missing) = ids.iter().find(|id| !found.contains(id)) {
        return Err(ApiError::validation(format!(
            "Ingredient {missing} does not exist."
        )));
    }
    Ok(())
}

async fn prepare(st: &AppState, form: &RecipeForm) -> Result<RecipeDraft, ApiError> {
    let draft = validate(&form.data)?;
    check_references(st, &draft).await?;
    if let Some(upload) = &form.image {
        images::services::check_upload(upload)?;
    }
    Ok(draft)
}

async fn upload(st: &AppState, image: Option<ImageUpload>) -> Result<Option<String>, ApiError> {
    match image {
        Some(upload) => Ok(Some(images::store_image(st, upload).await?)),
        None => Ok(None),
    }
}

pub async fn find_recipe(st: &AppState, id: i64) -> Result<Recipe, ApiError> {
    st.recipes
        .find(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Recipe not found."))
}

fn ensure_author(recipe: &Recipe, actor: i64) -> Result<(), ApiError> {
    if recipe.author_id != actor {
        warn!(recipe_id = recipe.id, actor, "non-author tried to modify recipe");
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

pub async fn create_recipe(
    st: &AppState,
    author_id: i64,
    form: RecipeForm,
) -> Result<Recipe, ApiError> {
    let mut draft = prepare(st, &form).await?;
    if form.image.is_none() {
        return Err(ApiError::validation("Image is required."));
    }
    draft.image = upload(st, form.image).await?;

    let recipe = match st.recipes.create(author_id, &draft).await {
        Ok(r) => r,
        Err(e) => {
            if let Some(key) = &draft.image {
                images::delete_image(st, key).await;
            }
            return Err(e.into());
        }
    };
    info!(recipe_id = recipe.id, author_id, "recipe created");
    Ok(recipe)
}

pub async fn update_recipe(
    st: &AppState,
    actor: i64,
    recipe_id: i64,
    form: RecipeForm,
) -> Result<Recipe, ApiError> {
    let current = find_recipe(st, recipe_id).await?;
    ensure_author(&current, actor)?;

    let mut draft = prepare(st, &form).await?;
    draft.image = upload(st, form.image).await?;

    let updated = match st.recipes.update(recipe_id, &draft).await {
        Ok(r) => r,
        Err(e) => {
            if let Some(key) = &draft.image {
                images::delete_image(st, key).await;
            }
            return Err(e.into());
        }
    };

    if let (Some(_), Some(old)) = (&draft.image, &current.image) {
        images::delete_image(st, old).await;
    }
    info!(recipe_id, "recipe updated");
    Ok(updated)
}

pub async fn delete_recipe(st: &AppState, actor: i64, recipe_id: i64) -> Result<(), ApiError> {
    let recipe = find_recipe(st, recipe_id).await?;
    ensure_author(&recipe, actor)?;

    if !st.recipes.delete(recipe_id).await? {
        return Err(ApiError::not_found("Recipe not found."));
    }
    if let Some(key) = &recipe.image {
        images::delete_image(st, key).await;
    }
    info!(recipe_id, "recipe deleted");
    Ok(())
}

pub async fn recipe_summary(st: &AppState, recipe: &Recipe) -> Result<RecipeSummary, ApiError> {
    Ok(RecipeSummary {
        id: recipe.id,
        name: recipe.name.clone(),
        image: images::image_url(st, recipe.image.as_deref()).await?,
        cooking_time: recipe.cooking_time,
    })
}

pub async fn recipe_response(
    st: &AppState,
    recipe: &Recipe,
    viewer: Option<i64>,
) -> Result<RecipeResponse, ApiError> {
    let author = st
        .users
        .find_by_id(recipe.author_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("author {} of recipe {} is missing", recipe.author_id, recipe.id))?;

    let (is_favorited, is_in_shopping_cart) = match viewer {
        Some(user_id) => (
            st.relations
                .exists(RelationKind::Favorite, user_id, recipe.id)
                .await?,
            st.relations
                .exists(RelationKind::Cart, user_id, recipe.id)
                .await?,
        ),
        None => (false, false),
    };

    Ok(RecipeResponse {
        id: recipe.id,
        tags: st.recipes.tags(recipe.id).await?,
        author: user_response(st, &author, viewer).await?,
        ingredients: st.recipes.ingredients(recipe.id).await?,
        is_favorited,
        is_in_shopping_cart,
        name: recipe.name.clone(),
        image: images::image_url(st, recipe.image.as_deref()).await?,
        text: recipe.text.clone(),
        cooking_time: recipe.cooking_time,
    })
}

pub async fn list_recipes(
    st: &AppState,
    query: &RecipeListQuery,
    window: PageWindow,
    viewer: Option<i64>,
) -> Result<(Vec<RecipeResponse>, i64), ApiError> {
    // Relation filters mean nothing for anonymous callers.
    if viewer.is_none() && (query.is_favorited || query.is_in_shopping_cart) {
        return Ok((Vec::new(), 0));
    }

    let filter = RecipeFilter {
        author_id: query.author,
        tag_slugs: query.tags.clone(),
        favorited_by: viewer.filter(|_| query.is_favorited),
        in_cart_of: viewer.filter(|_| query.is_in_shopping_cart),
        limit: window.limit,
        offset: window.offset(),
    };
    let (recipes, count) = st.recipes.list(&filter).await?;

    let mut out = Vec::with_capacity(recipes.len());
    for recipe in &recipes {
        out.push(recipe_response(st, recipe, viewer).await?);
    }
    Ok((out, count))
}
