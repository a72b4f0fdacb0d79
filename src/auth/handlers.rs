use axum::{
    extract::{FromRef, State},
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{LoginRequest, RefreshRequest, TokenPair},
    jwt::JwtKeys,
    password::verify_password,
};
use crate::{error::ApiError, extract::ApiJson, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/token/login/", post(login))
        .route("/auth/token/refresh/", post(refresh))
}

fn invalid_credentials() -> ApiError {
    ApiError::validation("Unable to log in with provided credentials.")
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let email = payload.email.trim().to_lowercase();

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(invalid_credentials());
    };

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = user.id, "login invalid password");
        return Err(invalid_credentials());
    }

    let tokens = JwtKeys::from_ref(&state).issue_pair(user.id)?;
    info!(user_id = user.id, "user logged in");
    Ok(Json(tokens))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_refresh(&payload.refresh_token).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        ApiError::Unauthorized("Invalid or expired token".into())
    })?;

    // The account may have been removed since the token was issued.
    if state.users.find_by_id(claims.sub).await?.is_none() {
        return Err(ApiError::Unauthorized("User not found".into()));
    }

    Ok(Json(keys.issue_pair(claims.sub)?))
}
