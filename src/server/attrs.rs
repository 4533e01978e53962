//! Tag and ingredient endpoints. Both kinds share these handlers; the router
//! for each kind carries its `AttrKind` as an extension.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
};

use super::dto::{ListAttrsParams, UpdateAttrRequest};
use super::extract::{ApiJson, parse_path_id};
use super::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use super::validation::{NOT_NULL, REQUIRED, validate_required_text};
use crate::auth::RequireUser;
use crate::error::Error;
use crate::server::AppState;
use crate::types::{Attr, AttrKind};

/// Routes for one kind, mounted at `/{table}` (`/tags` or `/ingredients`).
pub fn attrs_router(kind: AttrKind) -> Router<Arc<AppState>> {
    let collection = format!("/{}", kind.table());
    let item = format!("{collection}/{{id}}");

    Router::new()
        .route(&collection, get(list_attrs))
        .route(
            &item,
            patch(patch_attr)
                .put(put_attr)
                .delete(delete_attr),
        )
        .layer(Extension(kind))
}

fn not_found_message(kind: AttrKind) -> &'static str {
    match kind {
        AttrKind::Tag => "Tag not found",
        AttrKind::Ingredient => "Ingredient not found",
    }
}

/// `assigned_only` must be an integer; non-zero turns the filter on.
fn parse_assigned_only(raw: Option<&str>) -> Result<bool, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(false),
        Some(value) => value
            .parse::<i64>()
            .map(|n| n != 0)
            .map_err(|_| ApiError::field("assigned_only", "A valid integer is required.")),
    }
}

/// GET /api/recipes/{tags|ingredients}?assigned_only=1
pub async fn list_attrs(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<AttrKind>,
    Query(params): Query<ListAttrsParams>,
) -> impl IntoResponse {
    let assigned_only = parse_assigned_only(params.assigned_only.as_deref())?;

    let attrs = state
        .store
        .list_attrs(kind, auth.user.id, assigned_only)
        .api_err("Failed to list entries")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(attrs)))
}

/// PATCH /api/recipes/{tags|ingredients}/{id}
pub async fn patch_attr(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<AttrKind>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateAttrRequest>,
) -> impl IntoResponse {
    update_attr(&state, &auth, kind, &id, req, false)
}

/// PUT /api/recipes/{tags|ingredients}/{id}; `name` is required.
pub async fn put_attr(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<AttrKind>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateAttrRequest>,
) -> impl IntoResponse {
    update_attr(&state, &auth, kind, &id, req, true)
}

fn update_attr(
    state: &AppState,
    auth: &RequireUser,
    kind: AttrKind,
    id: &str,
    req: UpdateAttrRequest,
    full: bool,
) -> Result<Json<ApiResponse<Attr>>, ApiError> {
    let id = parse_path_id(id, not_found_message(kind))?;

    let attr = state
        .store
        .get_attr(kind, auth.user.id, id)
        .api_err("Failed to get entry")?
        .or_not_found(not_found_message(kind))?;

    let name = match req.name {
        Some(Some(name)) => name.trim().to_string(),
        Some(None) => return Err(ApiError::field("name", NOT_NULL)),
        None if full => return Err(ApiError::field("name", REQUIRED)),
        None => return Ok(Json(ApiResponse::success(attr))),
    };
    validate_required_text(&name).map_err(|msg| ApiError::field("name", msg))?;

    if name == attr.name {
        return Ok(Json(ApiResponse::success(attr)));
    }

    let renamed = match state.store.rename_attr(kind, auth.user.id, id, &name) {
        Ok(renamed) => renamed,
        Err(Error::AlreadyExists) => {
            return Err(ApiError::conflict(format!(
                "{} with this name already exists",
                kind.label()
            )));
        }
        Err(e) => return Err(ApiError::from_store(e, "Failed to update entry")),
    };

    tracing::debug!(
        "User {} renamed {} {} to '{}'",
        auth.user.id,
        kind.label(),
        id,
        renamed.name
    );

    Ok(Json(ApiResponse::success(renamed)))
}

/// DELETE /api/recipes/{tags|ingredients}/{id}
///
/// The entry is detached from every recipe that used it.
pub async fn delete_attr(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Extension(kind): Extension<AttrKind>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = parse_path_id(&id, not_found_message(kind))?;

    let attr = state
        .store
        .get_attr(kind, auth.user.id, id)
        .api_err("Failed to get entry")?
        .or_not_found(not_found_message(kind))?;

    let recipe_count = state
        .store
        .count_attr_recipes(kind, attr.id)
        .api_err("Failed to count recipes")?;

    state
        .store
        .delete_attr(kind, auth.user.id, attr.id)
        .api_err("Failed to delete entry")?;

    tracing::info!(
        "User {} deleted {} '{}', detached from {} recipes",
        auth.user.id,
        kind.label(),
        attr.name,
        recipe_count
    );

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}
