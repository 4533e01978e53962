use axum::{
    Json,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

use super::response::ApiError;

/// `Json` whose rejections are reported in the API error envelope.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(ApiError::bad_request(rejection.body_text())),
        }
    }
}

/// Ids in paths are integers; anything else cannot name a row.
pub fn parse_path_id(raw: &str, not_found: &'static str) -> Result<i64, ApiError> {
    raw.parse().map_err(|_| ApiError::not_found(not_found))
}
