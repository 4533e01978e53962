mod reconcile;
mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface.
///
/// Every recipe, tag and ingredient operation takes the acting user's id and
/// is scoped to it: rows owned by someone else behave exactly like rows that
/// do not exist.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &NewUser) -> Result<User>;
    fn get_user(&self, id: i64) -> Result<Option<User>>;
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
    fn list_users(&self) -> Result<Vec<User>>;
    fn update_user(&self, user: &User) -> Result<()>;
    fn delete_user(&self, id: i64) -> Result<bool>;
    fn update_user_last_login(&self, id: i64) -> Result<()>;
    fn has_superuser(&self) -> Result<bool>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;

    // Recipe operations (tags/ingredients reconciled by name in one transaction)
    fn create_recipe(&self, user_id: i64, recipe: &NewRecipe) -> Result<RecipeDetail>;
    fn get_recipe(&self, user_id: i64, id: i64) -> Result<Option<RecipeDetail>>;
    fn list_recipes(&self, user_id: i64, filter: &RecipeFilter) -> Result<Vec<RecipeDetail>>;
    fn list_all_recipes(&self) -> Result<Vec<Recipe>>;
    /// Stored image paths of every recipe owned by `user_id`.
    fn list_recipe_images(&self, user_id: i64) -> Result<Vec<String>>;
    fn update_recipe(&self, user_id: i64, id: i64, changes: &RecipeChanges)
    -> Result<RecipeDetail>;
    /// Sets the image path and returns the path it replaced.
    fn set_recipe_image(&self, user_id: i64, id: i64, image: &str) -> Result<Option<String>>;
    fn delete_recipe(&self, user_id: i64, id: i64) -> Result<bool>;

    // Tag/ingredient operations
    fn get_attr(&self, kind: AttrKind, user_id: i64, id: i64) -> Result<Option<Attr>>;
    fn list_attrs(&self, kind: AttrKind, user_id: i64, assigned_only: bool) -> Result<Vec<Attr>>;
    fn rename_attr(&self, kind: AttrKind, user_id: i64, id: i64, name: &str) -> Result<Attr>;
    fn delete_attr(&self, kind: AttrKind, user_id: i64, id: i64) -> Result<bool>;
    fn count_attr_recipes(&self, kind: AttrKind, id: i64) -> Result<i64>;
}
