mod handlers;
pub mod payload;
pub mod view;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

use crate::server::AppState;

pub use view::RecipeView;

/// Multipart framing allowance on top of the image size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn recipes_router(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/recipes",
            get(handlers::list_recipes).post(handlers::create_recipe),
        )
        .route(
            "/recipes/{id}",
            get(handlers::get_recipe)
                .patch(handlers::patch_recipe)
                .put(handlers::put_recipe)
                .delete(handlers::delete_recipe),
        )
        .route(
            "/recipes/{id}/upload-image",
            post(handlers::upload_image)
                .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD)),
        )
}
