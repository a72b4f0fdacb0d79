use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Recipe {
    pub id: i64,
    pub author_id: i64,
    pub name: String,
    pub image: Option<String>, // object storage key
    pub text: String,
    pub cooking_time: i32,
    pub pub_date: OffsetDateTime,
}

/// Amount entry joined with its ingredient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct RecipeIngredient {
    pub id: i64,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountEntry {
    pub ingredient_id: i64,
    pub amount: i32,
}

/// Validated write-side recipe. On update `image: None` keeps the stored image.
#[derive(Debug, Clone)]
pub struct RecipeDraft {
    pub name: String,
    pub image: Option<String>,
    pub text: String,
    pub cooking_time: i32,
    pub tag_ids: Vec<i64>,
    pub ingredients: Vec<AmountEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct RecipeFilter {
    pub author_id: Option<i64>,
    /// Matches recipes carrying any of these tag slugs.
    pub tag_slugs: Vec<String>,
    pub favorited_by: Option<i64>,
    pub in_cart_of: Option<i64>,
    pub limit: i64,
    pub offset: i64,
}

/// One amount entry of a recipe in somebody's cart, not yet aggregated.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CartLine {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}
