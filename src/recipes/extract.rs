use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Json,
};
use tracing::warn;

use super::dto::RecipeWriteRequest;
use crate::{
    error::ApiError,
    images::{parse_data_uri, ImageUpload},
};

/// Recipe write payload in either of its two encodings:
///
/// * `application/json` with `image` as a base64 data URI;
/// * `multipart/form-data` with a `recipe` part holding the same JSON
///   (without `image`) and an `image` file part.
#[derive(Debug)]
pub struct RecipeForm {
    pub data: RecipeWriteRequest,
    pub image: Option<ImageUpload>,
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false)
}

#[async_trait]
impl<S> FromRequest<S> for RecipeForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_multipart(&req) {
            let mp = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::validation(e.body_text()))?;
            return from_multipart(mp).await;
        }

        let Json(mut data) = Json::<RecipeWriteRequest>::from_request(req, state)
            .await
            .map_err(|e| {
                warn!(error = %e.body_text(), "bad recipe payload");
                ApiError::validation(e.body_text())
            })?;
        let image = match data.image.take() {
            Some(uri) if !uri.is_empty() => Some(parse_data_uri(&uri)?),
            _ => None,
        };
        Ok(RecipeForm { data, image })
    }
}

async fn from_multipart(mut mp: Multipart) -> Result<RecipeForm, ApiError> {
    let bad = |e: axum::extract::multipart::MultipartError| ApiError::validation(e.body_text());

    let mut data: Option<RecipeWriteRequest> = None;
    let mut image = None;
    while let Some(field) = mp.next_field().await.map_err(bad)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("recipe") => {
                let raw = field.bytes().await.map_err(bad)?;
                let parsed = serde_json::from_slice::<RecipeWriteRequest>(&raw)
                    .map_err(|e| ApiError::validation(format!("Invalid recipe part: {e}")))?;
                data = Some(parsed);
            }
            Some("image") => {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_ascii_lowercase())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field.bytes().await.map_err(bad)?;
                image = Some(ImageUpload { body, content_type });
            }
            _ => {}
        }
    }

    let mut data = data.ok_or_else(|| ApiError::validation("Missing `recipe` part."))?;
    // A data URI inside the JSON part is honoured when no file part was sent.
    if image.is_none() {
        if let Some(uri) = data.image.take().filter(|u| !u.is_empty()) {
            image = Some(parse_data_uri(&uri)?);
        }
    }
    data.image = None;
    Ok(RecipeForm { data, image })
}
