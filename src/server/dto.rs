use serde::{Deserialize, Deserializer, Serialize};

use crate::types::User;

// Users

#[derive(Debug, Default, Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Body of PATCH and PUT on `/api/users/me`.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CreateTokenRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub token: String,
}

/// The public shape of an account; the password is never included.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub email: String,
    pub name: String,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            email: user.email,
            name: user.name,
        }
    }
}

// Tags and ingredients

#[derive(Debug, Default, Deserialize)]
pub struct ListAttrsParams {
    #[serde(default)]
    pub assigned_only: Option<String>,
}

/// `name` is `None` when the key is absent and `Some(None)` for an explicit null.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateAttrRequest {
    #[serde(default, deserialize_with = "present")]
    pub name: Option<Option<String>>,
}

/// Marks a key that was sent, keeping a JSON null distinguishable from absence.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// Recipes

#[derive(Debug, Default, Deserialize)]
pub struct ListRecipesParams {
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub ingredients: Option<String>,
}

// Admin

#[derive(Debug, Default, Deserialize)]
pub struct AdminUpdateUserRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_staff: Option<bool>,
}
