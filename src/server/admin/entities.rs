use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::Value;

use crate::admin::AdminSource;
use crate::auth::RequireStaff;
use crate::server::AppState;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};

/// GET /api/admin
pub async fn list_entities(
    _staff: RequireStaff,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    Json(ApiResponse::success(state.admin.entities().to_vec()))
}

/// GET /api/admin/{entity}
pub async fn list_rows(
    _staff: RequireStaff,
    State(state): State<Arc<AppState>>,
    Path(entity): Path<String>,
) -> impl IntoResponse {
    let entity = state
        .admin
        .get(&entity)
        .or_not_found("Unknown admin entity")?;

    let rows = match entity.source {
        AdminSource::Users => to_rows(state.store.list_users().api_err("Failed to list users")?),
        AdminSource::Recipes => to_rows(
            state
                .store
                .list_all_recipes()
                .api_err("Failed to list recipes")?,
        ),
    }?;

    Ok::<_, ApiError>(Json(ApiResponse::success(entity.project(rows))))
}

fn to_rows<T: serde::Serialize>(items: Vec<T>) -> Result<Vec<Value>, ApiError> {
    items
        .into_iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            tracing::error!("Failed to serialize admin rows: {e}");
            ApiError::internal("Failed to serialize rows")
        })
}
