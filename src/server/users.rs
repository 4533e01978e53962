use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use super::dto::{
    CreateTokenRequest, CreateTokenResponse, CreateUserRequest, UpdateUserRequest, UserProfile,
};
use super::extract::ApiJson;
use super::response::{
    ApiError, ApiResponse, FieldErrors, StoreResultExt, push_field_error,
};
use super::validation::{
    BLANK, REQUIRED, normalize_email, validate_email, validate_optional_text, validate_password,
};
use crate::auth::{RequireUser, TokenGenerator, hash_password, verify_password};
use crate::error::Error;
use crate::server::AppState;
use crate::types::{NewUser, User};

const BAD_CREDENTIALS: &str = "Unable to authenticate with provided credentials.";
const DUPLICATE_EMAIL: &str = "user with this email already exists.";

pub fn users_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/create", post(create_user))
        .route("/token", post(create_token))
        .route("/me", get(get_me).patch(patch_me).put(put_me))
}

/// Checks an optional email, password and name, collecting every problem.
/// `required` marks email and password as mandatory.
fn check_user_fields(
    email: Option<&str>,
    password: Option<&str>,
    name: Option<&str>,
    required: bool,
) -> Result<Option<String>, ApiError> {
    let mut errors = FieldErrors::new();

    let email = email.map(normalize_email);
    match &email {
        Some(email) => {
            if let Err(msg) = validate_email(email) {
                push_field_error(&mut errors, "email", msg);
            }
        }
        None if required => push_field_error(&mut errors, "email", REQUIRED),
        None => {}
    }

    match password {
        Some(password) => {
            if let Err(msg) = validate_password(password) {
                push_field_error(&mut errors, "password", msg);
            }
        }
        None if required => push_field_error(&mut errors, "password", REQUIRED),
        None => {}
    }

    if let Some(Err(msg)) = name.map(validate_optional_text) {
        push_field_error(&mut errors, "name", msg);
    }

    if errors.is_empty() {
        Ok(email)
    } else {
        Err(ApiError::validation(errors))
    }
}

/// POST /api/users/create
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> impl IntoResponse {
    let email = check_user_fields(
        req.email.as_deref(),
        req.password.as_deref(),
        req.name.as_deref(),
        true,
    )?
    .ok_or_else(|| ApiError::field("email", REQUIRED))?;
    let password = req
        .password
        .ok_or_else(|| ApiError::field("password", REQUIRED))?;

    let password_hash = hash_password(&password).api_err("Failed to hash password")?;

    let user = match state.store.create_user(&NewUser {
        email,
        name: req.name.unwrap_or_default(),
        password_hash,
        is_staff: false,
        is_superuser: false,
    }) {
        Ok(user) => user,
        Err(Error::AlreadyExists) => return Err(ApiError::field("email", DUPLICATE_EMAIL)),
        Err(e) => {
            tracing::error!("Failed to create user: {e}");
            return Err(ApiError::internal("Failed to create user"));
        }
    };

    tracing::info!("Created user {} ({})", user.id, user.email);

    Ok::<_, ApiError>((
        StatusCode::CREATED,
        Json(ApiResponse::success(UserProfile::from(user))),
    ))
}

/// POST /api/users/token
///
/// Every successful call issues a new token; stored tokens are hashed and
/// cannot be shown again.
pub async fn create_token(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateTokenRequest>,
) -> impl IntoResponse {
    let mut errors = FieldErrors::new();
    for (field, value) in [("email", &req.email), ("password", &req.password)] {
        match value.as_deref() {
            None => push_field_error(&mut errors, field, REQUIRED),
            Some("") => push_field_error(&mut errors, field, BLANK),
            Some(_) => {}
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }

    let email = normalize_email(req.email.as_deref().unwrap_or_default());
    let password = req.password.unwrap_or_default();

    let user = state
        .store
        .get_user_by_email(&email)
        .api_err("Failed to look up user")?
        .filter(|user| user.is_active)
        .ok_or_else(|| ApiError::bad_request(BAD_CREDENTIALS))?;

    if !verify_password(&password, &user.password_hash).api_err("Failed to verify password")? {
        return Err(ApiError::bad_request(BAD_CREDENTIALS));
    }

    let raw_token = issue_token(&state, &user)?;

    if let Err(e) = state.store.update_user_last_login(user.id) {
        tracing::warn!("Failed to update last_login for user {}: {e}", user.id);
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(CreateTokenResponse {
        token: raw_token,
    })))
}

/// Stores a fresh token for `user`, retrying on a lookup collision.
fn issue_token(state: &AppState, user: &User) -> Result<String, ApiError> {
    let generator = TokenGenerator::new();

    const MAX_RETRIES: u32 = 3;
    for _ in 0..MAX_RETRIES {
        let (token, raw_token) = generator
            .issue(user.id)
            .map_err(|_| ApiError::internal("Failed to generate token"))?;

        match state.store.create_token(&token) {
            Ok(()) => return Ok(raw_token),
            Err(Error::TokenLookupCollision) => continue,
            Err(e) => {
                tracing::error!("Failed to store token: {e}");
                return Err(ApiError::internal("Failed to create token"));
            }
        }
    }

    Err(ApiError::internal(
        "Failed to generate unique token after retries",
    ))
}

/// GET /api/users/me
pub async fn get_me(auth: RequireUser) -> impl IntoResponse {
    Json(ApiResponse::success(UserProfile::from(auth.user)))
}

/// PATCH /api/users/me
pub async fn patch_me(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> impl IntoResponse {
    update_me(&state, auth.user, req, false)
}

/// PUT /api/users/me; email and password are required.
pub async fn put_me(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> impl IntoResponse {
    update_me(&state, auth.user, req, true)
}

fn update_me(
    state: &AppState,
    mut user: User,
    req: UpdateUserRequest,
    full: bool,
) -> Result<Json<ApiResponse<UserProfile>>, ApiError> {
    let email = check_user_fields(
        req.email.as_deref(),
        req.password.as_deref(),
        req.name.as_deref(),
        full,
    )?;

    if let Some(email) = email {
        user.email = email;
    }
    if let Some(name) = req.name {
        user.name = name;
    }
    if let Some(password) = req.password {
        user.password_hash = hash_password(&password).api_err("Failed to hash password")?;
    }

    match state.store.update_user(&user) {
        Ok(()) => {}
        Err(Error::AlreadyExists) => return Err(ApiError::field("email", DUPLICATE_EMAIL)),
        Err(e) => {
            tracing::error!("Failed to update user {}: {e}", user.id);
            return Err(ApiError::internal("Failed to update user"));
        }
    }

    Ok(Json(ApiResponse::success(UserProfile::from(user))))
}
