use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::jwt::JwtKeys;
use crate::error::ApiError;

/// Authenticated caller; rejects the request with 401 otherwise.
pub struct AuthUser(pub i64);

/// Caller id when a valid bearer token is present. A missing header yields
/// `None`; a malformed or expired token is still rejected.
pub struct MaybeAuthUser(pub Option<i64>);

fn bearer_token(parts: &Parts) -> Result<Option<&str>, ApiError> {
    let Some(header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };
    let header = header
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid Authorization header".into()))?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Invalid Authorization header".into()))?;
    Ok(Some(token))
}

fn authenticate(keys: &JwtKeys, token: &str) -> Result<i64, ApiError> {
    match keys.verify_access(token) {
        Ok(claims) => Ok(claims.sub),
        Err(e) => {
            warn!(error = %e, "invalid or expired token");
            Err(ApiError::Unauthorized("Invalid or expired token".into()))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?.ok_or_else(|| {
            ApiError::Unauthorized("Authentication credentials were not provided.".into())
        })?;
        let keys = JwtKeys::from_ref(state);
        Ok(AuthUser(authenticate(&keys, token)?))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            Some(token) => {
                let keys = JwtKeys::from_ref(state);
                Ok(MaybeAuthUser(Some(authenticate(&keys, token)?)))
            }
            None => Ok(MaybeAuthUser(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use axum::http::{Request, StatusCode};

    fn parts_with(auth: Option<&str>) -> Parts {
        let mut req = Request::builder().uri("/");
        if let Some(value) = auth {
            req = req.header(axum::http::header::AUTHORIZATION, value);
        }
        req.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn auth_user_requires_header() {
        let state = AppState::fake();
        let mut parts = parts_with(None);
        let err = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .err()
            .unwrap();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn auth_user_accepts_access_token_only() {
        let state = AppState::fake();
        let keys = JwtKeys::from_ref(&state);

        let access = format!("Bearer {}", keys.sign_access(3).unwrap());
        let mut parts = parts_with(Some(&access));
        let AuthUser(id) = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .ok()
            .unwrap();
        assert_eq!(id, 3);

        let refresh = format!("Bearer {}", keys.sign_refresh(3).unwrap());
        let mut parts = parts_with(Some(&refresh));
        assert!(AuthUser::from_request_parts(&mut parts, &state).await.is_err());
    }

    #[tokio::test]
    async fn maybe_auth_user_is_anonymous_without_header() {
        let state = AppState::fake();
        let mut parts = parts_with(None);
        let MaybeAuthUser(id) = MaybeAuthUser::from_request_parts(&mut parts, &state)
            .await
            .ok()
            .unwrap();
        assert_eq!(id, None);

        let mut parts = parts_with(Some("Bearer garbage"));
        assert!(MaybeAuthUser::from_request_parts(&mut parts, &state)
            .await
            .is_err());
    }
}
