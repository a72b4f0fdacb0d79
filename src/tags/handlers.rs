use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tracing::instrument;

use super::repo::Tag;
use crate::{error::ApiError, state::AppState};

pub fn tag_routes() -> Router<AppState> {
    Router::new()
        .route("/tags/", get(list_tags))
        .route("/tags/:id/", get(get_tag))
}

#[instrument(skip(state))]
pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<Tag>>, ApiError> {
    Ok(Json(state.tags.list().await?))
}

#[instrument(skip(state))]
pub async fn get_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Tag>, ApiError> {
    state
        .tags
        .find(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Tag not found."))
}
