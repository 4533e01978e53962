use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Attr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub time_minutes: i64,
    pub price: Decimal,
    pub link: String,
    /// Path relative to the media root, e.g. `uploads/recipe/<uuid>.png`.
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A recipe together with its association sets, each ordered by name descending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub tags: Vec<Attr>,
    pub ingredients: Vec<Attr>,
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub title: String,
    pub description: String,
    pub time_minutes: i64,
    pub price: Decimal,
    pub link: String,
    pub tags: Vec<String>,
    pub ingredients: Vec<String>,
}

/// Changes applied by an update. `None` leaves a field untouched; for the
/// association sets `Some(vec![])` clears the set.
#[derive(Debug, Clone, Default)]
pub struct RecipeChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub time_minutes: Option<i64>,
    pub price: Option<Decimal>,
    pub link: Option<String>,
    pub tags: Option<Vec<String>>,
    pub ingredients: Option<Vec<String>>,
}

impl RecipeChanges {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.time_minutes.is_none()
            && self.price.is_none()
            && self.link.is_none()
            && self.tags.is_none()
            && self.ingredients.is_none()
    }
}

/// Recipe list filter. Each present id list must intersect the recipe's
/// corresponding set; present lists combine with AND.
#[derive(Debug, Clone, Default)]
pub struct RecipeFilter {
    pub tag_ids: Option<Vec<i64>>,
    pub ingredient_ids: Option<Vec<i64>>,
}

/// Converts a price to integer cents for storage, rounding to two places.
#[must_use]
pub fn price_to_cents(price: &Decimal) -> i64 {
    let mut rounded = price.round_dp(2);
    rounded.rescale(2);
    rounded.mantissa() as i64
}

#[must_use]
pub fn price_from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}
