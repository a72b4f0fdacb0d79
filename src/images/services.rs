use anyhow::Context;
use base64ct::{Base64, Encoding};
use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

/// Raw image bytes with their declared mime type.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub body: Bytes,
    pub content_type: String,
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Decodes `data:image/<ext>;base64,<payload>`.
pub fn parse_data_uri(value: &str) -> Result<ImageUpload, ApiError> {
    let malformed = || ApiError::validation("Image must be a base64 data URI.");

    let rest = value.strip_prefix("data:").ok_or_else(malformed)?;
    let (mime, payload) = rest.split_once(";base64,").ok_or_else(malformed)?;
    let mime = mime.trim().to_ascii_lowercase();
    if !mime.starts_with("image/") {
        return Err(malformed());
    }
    if ext_from_mime(&mime).is_none() {
        return Err(ApiError::validation(format!("Unsupported image type: {mime}")));
    }

    let body = Base64::decode_vec(payload.trim())
        .map_err(|_| ApiError::validation("Image payload is not valid base64."))?;
    if body.is_empty() {
        return Err(ApiError::validation("Image payload is empty."));
    }

    Ok(ImageUpload {
        body: Bytes::from(body),
        content_type: mime,
    })
}

pub fn check_upload(upload: &ImageUpload) -> Result<(), ApiError> {
    if ext_from_mime(&upload.content_type).is_none() {
        return Err(ApiError::validation(format!(
            "Unsupported image type: {}",
            upload.content_type
        )));
    }
    if upload.body.is_empty() {
        return Err(ApiError::validation("Image payload is empty."));
    }
    Ok(())
}

/// Uploads the image and returns its storage key.
pub async fn store_image(st: &AppState, upload: ImageUpload) -> Result<String, ApiError> {
    check_upload(&upload)?;
    let ext = ext_from_mime(&upload.content_type).unwrap_or("bin");
    let key = format!("recipes/images/{}.{}", Uuid::new_v4(), ext);
    st.storage
        .put_object(&key, upload.body, &upload.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    debug!(%key, "image stored");
    Ok(key)
}

pub async fn image_url(st: &AppState, key: Option<&str>) -> anyhow::Result<Option<String>> {
    let Some(key) = key else {
        return Ok(None);
    };
    let url = st
        .storage
        .presign_get(key, st.config.storage.url_ttl_secs)
        .await
        .with_context(|| format!("presign url for {}", key))?;
    Ok(Some(url))
}

/// Best effort; a leftover object is only logged.
pub async fn delete_image(st: &AppState, key: &str) {
    if let Err(e) = st.storage.delete_object(key).await {
        warn!(error = %e, %key, "failed to delete image");
    }
}
