use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, header},
    response::IntoResponse,
};

use super::response::ApiError;
use crate::media::{MediaError, content_type_for};
use crate::server::AppState;

pub const MEDIA_ROUTE: &str = "/media";

/// Absolute URL prefix for stored media, e.g. `http://localhost:8080/media`.
#[must_use]
pub fn media_base(state: &AppState, headers: &HeaderMap) -> String {
    let base = match &state.public_base_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => get_host_from_headers(headers),
    };
    format!("{base}{MEDIA_ROUTE}")
}

#[must_use]
fn get_host_from_headers(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");

    format!("{scheme}://{host}")
}

/// GET /media/{*path}
pub async fn serve_media(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> impl IntoResponse {
    let data = match state.media.get(&path).await {
        Ok(data) => data,
        Err(MediaError::NotFound | MediaError::InvalidPath) => {
            return Err(ApiError::not_found("File not found"));
        }
        Err(e) => {
            tracing::error!("Failed to read media file {path}: {e}");
            return Err(ApiError::internal("Failed to read file"));
        }
    };

    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type_for(&path)),
        ),
        (
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ),
    ];

    Ok::<_, ApiError>((headers, data))
}
