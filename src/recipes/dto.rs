use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::repo_types::RecipeIngredient;
use crate::{error::ApiError, tags::repo::Tag, users::dto::UserResponse};

/// Read shape of a recipe.
#[derive(Debug, Serialize)]
pub struct RecipeResponse {
    pub id: i64,
    pub tags: Vec<Tag>,
    pub author: UserResponse,
    pub ingredients: Vec<RecipeIngredient>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: Option<String>,
    pub text: String,
    pub cooking_time: i32,
}

/// Short shape used by favorites, cart and subscriptions.
#[derive(Debug, Serialize)]
pub struct RecipeSummary {
    pub id: i64,
    pub name: String,
    pub image: Option<String>,
    pub cooking_time: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngredientAmountRequest {
    pub id: i64,
    pub amount: i64,
}

/// Write shape for create and update. `image` is a base64 data URI; it is
/// taken out by the request extractor before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeWriteRequest {
    pub tags: Vec<i64>,
    pub ingredients: Vec<IngredientAmountRequest>,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub text: String,
    pub cooking_time: i64,
}

/// Query of `GET /recipes/`. Parsed from raw pairs so `tags` may repeat.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecipeListQuery {
    pub author: Option<i64>,
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

fn truthy(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true")
}

impl RecipeListQuery {
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, ApiError> {
        let mut q = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "author" => {
                    let id = value
                        .trim()
                        .parse()
                        .map_err(|_| ApiError::validation("author: a valid integer is required."))?;
                    q.author = Some(id);
                }
                "tags" => q.tags.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from),
                ),
                "is_favorited" => q.is_favorited = truthy(value),
                "is_in_shopping_cart" => q.is_in_shopping_cart = truthy(value),
                _ => {}
            }
        }
        // First occurrence wins.
        let mut seen = HashSet::new();
        q.tags.retain(|slug| seen.insert(slug.clone()));
        Ok(q)
    }
}
