use axum::http::Uri;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const MAX_LIMIT: i64 = 100;

/// Highest page whose offset still fits in an `i64` at any allowed limit.
pub const MAX_PAGE: i64 = i64::MAX / MAX_LIMIT;

/// `?page=<n>&limit=<n>`; page is 1-based.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub limit: i64,
}

impl PageWindow {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl PageParams {
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, ApiError> {
        let get = |key: &str| -> Result<Option<i64>, ApiError> {
            match pairs.iter().find(|(k, _)| k == key) {
                None => Ok(None),
                Some((_, v)) => v
                    .parse::<i64>()
                    .map(Some)
                    .map_err(|_| ApiError::validation(format!("{key}: a valid integer is required."))),
            }
        };
        Ok(Self {
            page: get("page")?,
            limit: get("limit")?,
        })
    }

    pub fn window(&self, default_limit: i64) -> PageWindow {
        PageWindow {
            page: self.page.unwrap_or(1).clamp(1, MAX_PAGE),
            limit: self.limit.unwrap_or(default_limit).clamp(1, MAX_LIMIT),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(results: Vec<T>, count: i64, window: PageWindow, uri: &Uri) -> Self {
        let has_next = window.page.saturating_mul(window.limit) < count;
        Self {
            count,
            next: has_next.then(|| page_link(uri, window.page + 1)),
            previous: (window.page > 1).then(|| page_link(uri, window.page - 1)),
            results,
        }
    }
}

/// Same path and query with `page` replaced.
fn page_link(uri: &Uri, page: i64) -> String {
    let mut parts: Vec<&str> = uri
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|p| !p.is_empty() && !p.starts_with("page="))
        .collect();
    let page = format!("page={page}");
    parts.push(&page);
    format!("{}?{}", uri.path(), parts.join("&"))
}
