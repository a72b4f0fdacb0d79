use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;

use super::repo::Ingredient;
use crate::{error::ApiError, extract::ApiQuery, state::AppState};

#[derive(Debug, Deserialize)]
pub struct IngredientQuery {
    /// Case-insensitive name prefix.
    pub name: Option<String>,
}

pub fn ingredient_routes() -> Router<AppState> {
    Router::new()
        .route("/ingredients/", get(list_ingredients))
        .route("/ingredients/:id/", get(get_ingredient))
}

#[instrument(skip(state))]
pub async fn list_ingredients(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<IngredientQuery>,
) -> Result<Json<Vec<Ingredient>>, ApiError> {
    let prefix = q.name.as_deref().map(str::trim).filter(|p| !p.is_empty());
    Ok(Json(state.ingredients.search(prefix).await?))
}

#[instrument(skip(state))]
pub async fn get_ingredient(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Ingredient>, ApiError> {
    state
        .ingredients
        .find(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Ingredient not found."))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::testing::Fixture;

    #[tokio::test]
    async fn name_filter_is_case_insensitive_prefix() {
        let fx = Fixture::new();
        for name in ["Apple", "Appricot", "Grape", "Pineapple"] {
            fx.ingredient(name, "g").await;
        }

        let (status, rows) = fx
            .json(Method::GET, "/api/ingredients/?name=App", None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = rows
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["Apple", "Appricot"]);

        let (_, rows) = fx
            .json(Method::GET, "/api/ingredients/?name=gr", None, None)
            .await;
        assert_eq!(rows[0]["name"], "Grape");

        let (_, rows) = fx.json(Method::GET, "/api/ingredients/", None, None).await;
        assert_eq!(rows.as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn get_by_id() {
        let fx = Fixture::new();
        let salt = fx.ingredient("Salt", "g").await;

        let (status, row) = fx
            .json(Method::GET, &format!("/api/ingredients/{}/", salt.id), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(row["measurement_unit"], "g");

        let (status, err) = fx
            .json(Method::GET, "/api/ingredients/42/", None, None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err["detail"], "Ingredient not found.");
    }
}
