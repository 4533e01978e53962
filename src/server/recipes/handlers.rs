use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde_json::Value;

use super::payload::{PayloadMode, RecipeInput};
use super::view::RecipeView;
use crate::auth::RequireUser;
use crate::media::MediaError;
use crate::server::AppState;
use crate::server::dto::ListRecipesParams;
use crate::server::extract::{ApiJson, parse_path_id};
use crate::server::media::media_base;
use crate::server::response::{
    ApiError, ApiResponse, FieldErrors, StoreOptionExt, StoreResultExt, push_field_error,
};
use crate::types::RecipeFilter;

const RECIPE_NOT_FOUND: &str = "Recipe not found";

/// Parses a comma-separated id list. An absent or blank value means no filter.
fn parse_id_list(raw: Option<&str>) -> Result<Option<Vec<i64>>, String> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    raw.split(',')
        .map(|token| {
            let token = token.trim();
            token
                .parse::<i64>()
                .map_err(|_| format!("'{token}' is not a valid id."))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// GET /api/recipes/recipes?tags=1,2&ingredients=3
pub async fn list_recipes(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<ListRecipesParams>,
) -> impl IntoResponse {
    let mut errors = FieldErrors::new();
    let mut filter = RecipeFilter::default();

    match parse_id_list(params.tags.as_deref()) {
        Ok(ids) => filter.tag_ids = ids,
        Err(msg) => push_field_error(&mut errors, "tags", msg),
    }
    match parse_id_list(params.ingredients.as_deref()) {
        Ok(ids) => filter.ingredient_ids = ids,
        Err(msg) => push_field_error(&mut errors, "ingredients", msg),
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let recipes = state
        .store
        .list_recipes(auth.user.id, &filter)
        .api_err("Failed to list recipes")?;

    let base = media_base(&state, &headers);
    let body: Vec<_> = recipes
        .iter()
        .map(|detail| RecipeView::List.render(detail, &base))
        .collect();

    Ok::<_, ApiError>(Json(ApiResponse::success(body)).into_response())
}

/// POST /api/recipes/recipes
pub async fn create_recipe(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<Value>,
) -> impl IntoResponse {
    let recipe = RecipeInput::parse(&body, PayloadMode::Create)?.into_new_recipe()?;

    let detail = state
        .store
        .create_recipe(auth.user.id, &recipe)
        .api_err("Failed to create recipe")?;

    tracing::info!(
        "User {} created recipe {} with {} tags and {} ingredients",
        auth.user.id,
        detail.recipe.id,
        detail.tags.len(),
        detail.ingredients.len()
    );

    let base = media_base(&state, &headers);
    Ok::<_, ApiError>(
        (
            StatusCode::CREATED,
            Json(ApiResponse::success(RecipeView::Detail.render(&detail, &base))),
        )
            .into_response(),
    )
}

/// GET /api/recipes/recipes/{id}
pub async fn get_recipe(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = parse_path_id(&id, RECIPE_NOT_FOUND)?;

    let detail = state
        .store
        .get_recipe(auth.user.id, id)
        .api_err("Failed to get recipe")?
        .or_not_found(RECIPE_NOT_FOUND)?;

    let base = media_base(&state, &headers);
    Ok::<_, ApiError>(
        Json(ApiResponse::success(RecipeView::Detail.render(&detail, &base))).into_response(),
    )
}

/// PATCH /api/recipes/recipes/{id}
pub async fn patch_recipe(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<Value>,
) -> impl IntoResponse {
    update_recipe(&state, &auth, &headers, &id, &body, PayloadMode::Partial)
}

/// PUT /api/recipes/recipes/{id}
pub async fn put_recipe(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<Value>,
) -> impl IntoResponse {
    update_recipe(&state, &auth, &headers, &id, &body, PayloadMode::Replace)
}

fn update_recipe(
    state: &AppState,
    auth: &RequireUser,
    headers: &HeaderMap,
    id: &str,
    body: &Value,
    mode: PayloadMode,
) -> Result<axum::response::Response, ApiError> {
    let id = parse_path_id(id, RECIPE_NOT_FOUND)?;
    let changes = RecipeInput::parse(body, mode)?.into_changes();

    let detail = state
        .store
        .update_recipe(auth.user.id, id, &changes)
        .api_err("Failed to update recipe")?;

    tracing::debug!("User {} updated recipe {}", auth.user.id, id);

    let base = media_base(state, headers);
    Ok(Json(ApiResponse::success(RecipeView::Detail.render(&detail, &base))).into_response())
}

/// DELETE /api/recipes/recipes/{id}
pub async fn delete_recipe(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let id = parse_path_id(&id, RECIPE_NOT_FOUND)?;

    let detail = state
        .store
        .get_recipe(auth.user.id, id)
        .api_err("Failed to get recipe")?
        .or_not_found(RECIPE_NOT_FOUND)?;

    if !state
        .store
        .delete_recipe(auth.user.id, id)
        .api_err("Failed to delete recipe")?
    {
        return Err(ApiError::not_found(RECIPE_NOT_FOUND));
    }

    if let Some(image) = &detail.recipe.image {
        state.media.discard(image).await;
    }

    tracing::info!("User {} deleted recipe {}", auth.user.id, id);

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

/// Reads the `image` field of an upload form.
/// Returns the original file name and the bytes.
async fn read_image_field(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> Result<(Option<String>, Vec<u8>), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::payload_too_large(format!("Upload exceeds {max_bytes} bytes"))
        } else {
            ApiError::bad_request(format!("Failed to read multipart: {e}"))
        }
    })? {
        if field.name() != Some("image") {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.map_err(|e| {
            if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ApiError::payload_too_large(format!("Upload exceeds {max_bytes} bytes"))
            } else {
                ApiError::bad_request(format!("Failed to read image: {e}"))
            }
        })?;

        if data.len() > max_bytes {
            return Err(ApiError::payload_too_large(format!(
                "Image size ({} bytes) exceeds maximum allowed size ({max_bytes} bytes)",
                data.len()
            )));
        }
        if data.is_empty() {
            return Err(ApiError::field("image", "The submitted file is empty."));
        }

        return Ok((file_name, data.to_vec()));
    }

    Err(ApiError::field("image", "No file was submitted."))
}

/// POST /api/recipes/recipes/{id}/upload-image
///
/// The row is pointed at the new file only once it is fully written; the
/// replaced file is removed afterwards.
pub async fn upload_image(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let id = parse_path_id(&id, RECIPE_NOT_FOUND)?;

    state
        .store
        .get_recipe(auth.user.id, id)
        .api_err("Failed to get recipe")?
        .or_not_found(RECIPE_NOT_FOUND)?;

    let (file_name, data) = read_image_field(&mut multipart, state.max_upload_bytes).await?;

    let path = match state.media.put(file_name.as_deref(), &data).await {
        Ok(path) => path,
        Err(MediaError::InvalidImage) => {
            return Err(ApiError::field("image", MediaError::InvalidImage.to_string()));
        }
        Err(e) => {
            tracing::error!("Failed to store image for recipe {id}: {e}");
            return Err(ApiError::internal("Failed to store image"));
        }
    };

    let previous = match state.store.set_recipe_image(auth.user.id, id, &path) {
        Ok(previous) => previous,
        Err(e) => {
            state.media.discard(&path).await;
            return Err(ApiError::from_store(e, "Failed to update recipe image"));
        }
    };

    if let Some(previous) = previous {
        state.media.discard(&previous).await;
    }

    let detail = state
        .store
        .get_recipe(auth.user.id, id)
        .api_err("Failed to get recipe")?
        .or_not_found(RECIPE_NOT_FOUND)?;

    tracing::info!("User {} uploaded image {} for recipe {}", auth.user.id, path, id);

    let base = media_base(&state, &headers);
    Ok::<_, ApiError>(
        Json(ApiResponse::success(RecipeView::Image.render(&detail, &base))).into_response(),
    )
}
