use axum::{
    extract::{DefaultBodyLimit, OriginalUri, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument};

use super::{
    dto::{RecipeListQuery, RecipeResponse, RecipeSummary},
    extract::RecipeForm,
    services,
};
use crate::{
    auth::{AuthUser, MaybeAuthUser},
    error::ApiError,
    extract::ApiQuery,
    pagination::{Page, PageParams},
    relations::{self, services::Resolved, RelationKind},
    shopping,
    state::AppState,
};

const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

pub fn recipe_routes() -> Router<AppState> {
    Router::new()
        .route("/recipes/", get(list_recipes).post(create_recipe))
        .route(
            "/recipes/download_shopping_cart/",
            get(download_shopping_cart),
        )
        .route(
            "/recipes/:id/",
            get(get_recipe).patch(update_recipe).delete(delete_recipe),
        )
        .route(
            "/recipes/:id/favorite/",
            post(add_favorite).delete(remove_favorite),
        )
        .route(
            "/recipes/:id/shopping_cart/",
            post(add_to_cart).delete(remove_from_cart),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
}

#[instrument(skip(state, pairs))]
pub async fn list_recipes(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(pairs): ApiQuery<Vec<(String, String)>>,
) -> Result<Json<Page<RecipeResponse>>, ApiError> {
    let query = RecipeListQuery::from_pairs(&pairs)?;
    let window = PageParams::from_pairs(&pairs)?.window(state.config.page_size);
    let (results, count) = services::list_recipes(&state, &query, window, viewer).await?;
    Ok(Json(Page::new(results, count, window, &uri)))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<i64>,
) -> Result<Json<RecipeResponse>, ApiError> {
    let recipe = services::find_recipe(&state, id).await?;
    Ok(Json(services::recipe_response(&state, &recipe, viewer).await?))
}

#[instrument(skip(state, form))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    form: RecipeForm,
) -> Result<(StatusCode, Json<RecipeResponse>), ApiError> {
    let recipe = services::create_recipe(&state, user_id, form).await?;
    let body = services::recipe_response(&state, &recipe, Some(user_id)).await?;
    Ok((StatusCode::CREATED, Json(body)))
}

#[instrument(skip(state, form))]
pub async fn update_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    form: RecipeForm,
) -> Result<Json<RecipeResponse>, ApiError> {
    let recipe = services::update_recipe(&state, user_id, id, form).await?;
    Ok(Json(
        services::recipe_response(&state, &recipe, Some(user_id)).await?,
    ))
}

#[instrument(skip(state))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    services::delete_recipe(&state, user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_recipe_relation(
    state: &AppState,
    kind: RelationKind,
    user_id: i64,
    recipe_id: i64,
) -> Result<(StatusCode, Json<RecipeSummary>), ApiError> {
    match relations::services::add(state, kind, user_id, recipe_id).await? {
        Resolved::Recipe(recipe) => Ok((
            StatusCode::CREATED,
            Json(services::recipe_summary(state, &recipe).await?),
        )),
        Resolved::User(_) => {
            error!(?kind, "relation kind does not target recipes");
            Err(anyhow::anyhow!("{kind:?} does not target recipes").into())
        }
    }
}

#[instrument(skip(state))]
pub async fn add_favorite(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<RecipeSummary>), ApiError> {
    add_recipe_relation(&state, RelationKind::Favorite, user_id, id).await
}

#[instrument(skip(state))]
pub async fn remove_favorite(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    relations::services::remove(&state, RelationKind::Favorite, user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn add_to_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<RecipeSummary>), ApiError> {
    add_recipe_relation(&state, RelationKind::Cart, user_id, id).await
}

#[instrument(skip(state))]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    relations::services::remove(&state, RelationKind::Cart, user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn download_shopping_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let text = shopping::shopping_list(&state, user_id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", shopping::FILENAME),
            ),
        ],
        text,
    ))
}
