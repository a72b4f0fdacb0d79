use axum::{
    extract::{OriginalUri, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::{
    dto::{
        RegisterRequest, RegisteredUser, SetPasswordRequest, SubscriptionResponse,
        SubscriptionsQuery, UserResponse,
    },
    repo_types::NewUser,
    services::{subscription_response, user_response, validate_registration},
};
use crate::{
    auth::{
        password::{check_new_password, hash_password, verify_password},
        AuthUser, MaybeAuthUser,
    },
    error::ApiError,
    extract::{ApiJson, ApiQuery},
    pagination::{Page, PageParams},
    relations::{self, services::Resolved, RelationKind},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/", get(list_users).post(register))
        .route("/users/me/", get(get_me))
        .route("/users/set_password/", post(set_password))
        .route("/users/subscriptions/", get(list_subscriptions))
        .route("/users/:id/", get(get_user))
        .route("/users/:id/subscribe/", post(subscribe).delete(unsubscribe))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(mut payload): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisteredUser>), ApiError> {
    if let Err(e) = validate_registration(&mut payload) {
        warn!(error = %e, "registration rejected");
        return Err(e);
    }

    // Ensure email and username are not taken
    if state.users.find_by_email(&payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::validation("A user with that email already exists."));
    }
    if state.users.find_by_username(&payload.username).await?.is_some() {
        warn!(username = %payload.username, "username already taken");
        return Err(ApiError::validation("A user with that username already exists."));
    }

    let password_hash = hash_password(&payload.password)?;
    let user = state
        .users
        .create(&NewUser {
            email: payload.email,
            username: payload.username,
            first_name: payload.first_name,
            last_name: payload.last_name,
            password_hash,
        })
        .await?
        .ok_or_else(|| {
            // Lost a race with a concurrent registration.
            warn!("user insert hit a unique constraint");
            ApiError::validation("A user with that email or username already exists.")
        })?;

    info!(user_id = user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisteredUser {
            id: user.id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
        }),
    ))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(params): ApiQuery<PageParams>,
) -> Result<Json<Page<UserResponse>>, ApiError> {
    let window = params.window(state.config.page_size);
    let (users, count) = state.users.list(window.limit, window.offset()).await?;

    let mut results = Vec::with_capacity(users.len());
    for user in &users {
        results.push(user_response(&state, user, viewer).await?);
    }
    Ok(Json(Page::new(results, count, window, &uri)))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    MaybeAuthUser(viewer): MaybeAuthUser,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;
    Ok(Json(user_response(&state, &user, viewer).await?))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;
    Ok(Json(user_response(&state, &user, Some(user_id)).await?))
}

#[instrument(skip(state, payload))]
pub async fn set_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    ApiJson(payload): ApiJson<SetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".into()))?;

    if !verify_password(&payload.current_password, &user.password_hash)? {
        warn!(user_id, "set_password with wrong current password");
        return Err(ApiError::validation("Invalid password."));
    }
    check_new_password(&payload.new_password)?;

    let hash = hash_password(&payload.new_password)?;
    state.users.set_password(user_id, &hash).await?;
    info!(user_id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn subscribe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    ApiQuery(q): ApiQuery<SubscriptionsQuery>,
) -> Result<(StatusCode, Json<SubscriptionResponse>), ApiError> {
    match relations::services::add(&state, RelationKind::Subscription, user_id, id).await? {
        Resolved::User(author) => Ok((
            StatusCode::CREATED,
            Json(subscription_response(&state, &author, Some(user_id), q.recipes_limit).await?),
        )),
        Resolved::Recipe(_) => {
            Err(anyhow::anyhow!("subscription resolved to a recipe").into())
        }
    }
}

#[instrument(skip(state))]
pub async fn unsubscribe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    relations::services::remove(&state, RelationKind::Subscription, user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_subscriptions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    OriginalUri(uri): OriginalUri,
    ApiQuery(q): ApiQuery<SubscriptionsQuery>,
) -> Result<Json<Page<SubscriptionResponse>>, ApiError> {
    let window = PageParams {
        page: q.page,
        limit: q.limit,
    }
    .window(state.config.page_size);

    let (authors, count) = state
        .relations
        .subscribed_authors(user_id, window.limit, window.offset())
        .await?;

    let mut results = Vec::with_capacity(authors.len());
    for author in &authors {
        results.push(subscription_response(&state, author, Some(user_id), q.recipes_limit).await?);
    }
    Ok(Json(Page::new(results, count, window, &uri)))
}
