mod entities;
mod users;

use std::sync::Arc;

use axum::{Router, routing::get};

use crate::server::AppState;

/// Staff-only routes under `/api/admin`. Listing is driven by the admin
/// registry in `AppState`.
pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/admin", get(entities::list_entities))
        .route(
            "/api/admin/users/{id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route("/api/admin/{entity}", get(entities::list_rows))
}
