use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::admin::admin_router;
use super::attrs::attrs_router;
use super::media::{MEDIA_ROUTE, serve_media};
use super::recipes::recipes_router;
use super::users::users_router;
use crate::admin::AdminRegistry;
use crate::config::ServerConfig;
use crate::media::ImageStorage;
use crate::store::Store;
use crate::types::AttrKind;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub media: ImageStorage,
    pub admin: AdminRegistry,
    /// Public base URL for external access. Used for image URLs.
    pub public_base_url: Option<String>,
    pub max_upload_bytes: usize,
}

impl AppState {
    /// State for `config`, with media under `<data_dir>/media` and the
    /// standard admin registry.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: &ServerConfig) -> Self {
        Self {
            store,
            media: ImageStorage::new(&config.media_dir()),
            admin: AdminRegistry::standard(),
            public_base_url: config.public_base_url.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let recipes = recipes_router(state.max_upload_bytes)
        .merge(attrs_router(AttrKind::Tag))
        .merge(attrs_router(AttrKind::Ingredient));

    Router::new()
        .route("/api/health-check", get(health))
        .nest("/api/users", users_router())
        .nest("/api/recipes", recipes)
        .merge(admin_router())
        .route(&format!("{MEDIA_ROUTE}/{{*path}}"), get(serve_media))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
