use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireStaff;
use crate::server::AppState;
use crate::server::dto::AdminUpdateUserRequest;
use crate::server::extract::{ApiJson, parse_path_id};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::validate_optional_text;

const USER_NOT_FOUND: &str = "User not found";

/// GET /api/admin/users/{id}
pub async fn get_user(
    _staff: RequireStaff,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = parse_path_id(&id, USER_NOT_FOUND)?;

    let user = state
        .store
        .get_user(id)
        .api_err("Failed to get user")?
        .or_not_found(USER_NOT_FOUND)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

/// PATCH /api/admin/users/{id}
pub async fn update_user(
    staff: RequireStaff,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<AdminUpdateUserRequest>,
) -> impl IntoResponse {
    let id = parse_path_id(&id, USER_NOT_FOUND)?;

    let mut user = state
        .store
        .get_user(id)
        .api_err("Failed to get user")?
        .or_not_found(USER_NOT_FOUND)?;

    if let Some(name) = req.name {
        validate_optional_text(&name).map_err(|msg| ApiError::field("name", msg))?;
        user.name = name;
    }
    if let Some(is_active) = req.is_active {
        if !is_active && user.id == staff.user.id {
            return Err(ApiError::bad_request("You cannot deactivate yourself"));
        }
        user.is_active = is_active;
    }
    if let Some(is_staff) = req.is_staff {
        user.is_staff = is_staff;
    }

    state
        .store
        .update_user(&user)
        .api_err("Failed to update user")?;

    tracing::info!("Staff user {} updated user {}", staff.user.id, user.id);

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}

/// DELETE /api/admin/users/{id}
///
/// Deleting a user removes their recipes, tags, ingredients and tokens.
pub async fn delete_user(
    staff: RequireStaff,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = parse_path_id(&id, USER_NOT_FOUND)?;

    let user = state
        .store
        .get_user(id)
        .api_err("Failed to get user")?
        .or_not_found(USER_NOT_FOUND)?;

    let images = state
        .store
        .list_recipe_images(user.id)
        .api_err("Failed to list recipe images")?;

    state
        .store
        .delete_user(user.id)
        .api_err("Failed to delete user")?;

    for image in &images {
        state.media.discard(image).await;
    }

    tracing::info!("Staff user {} deleted user {}", staff.user.id, user.id);

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
