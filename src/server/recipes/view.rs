use serde::Serialize;

use crate::types::{Attr, RecipeDetail};

/// Response shape of a recipe, chosen once per request by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeView {
    /// Collection listing.
    List,
    /// Single recipe, including description and image URL.
    Detail,
    /// Result of an image upload.
    Image,
}

#[derive(Debug, Serialize)]
pub struct RecipeSummary<'a> {
    pub id: i64,
    pub title: &'a str,
    pub time_minutes: i64,
    pub price: String,
    pub link: &'a str,
    pub tags: &'a [Attr],
    pub ingredients: &'a [Attr],
}

#[derive(Debug, Serialize)]
pub struct RecipeFull<'a> {
    #[serde(flatten)]
    pub summary: RecipeSummary<'a>,
    pub description: &'a str,
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecipeImage {
    pub id: i64,
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RecipeBody<'a> {
    List(RecipeSummary<'a>),
    Detail(RecipeFull<'a>),
    Image(RecipeImage),
}

impl RecipeView {
    /// `media_base` is the absolute URL prefix that stored image paths are
    /// appended to, without a trailing slash.
    #[must_use]
    pub fn render<'a>(self, detail: &'a RecipeDetail, media_base: &str) -> RecipeBody<'a> {
        let recipe = &detail.recipe;
        let image = recipe
            .image
            .as_deref()
            .map(|path| format!("{media_base}/{path}"));

        match self {
            RecipeView::Image => RecipeBody::Image(RecipeImage {
                id: recipe.id,
                image,
            }),
            RecipeView::List => RecipeBody::List(summary(detail)),
            RecipeView::Detail => RecipeBody::Detail(RecipeFull {
                summary: summary(detail),
                description: &recipe.description,
                image,
            }),
        }
    }
}

fn summary(detail: &RecipeDetail) -> RecipeSummary<'_> {
    let recipe = &detail.recipe;
    RecipeSummary {
        id: recipe.id,
        title: &recipe.title,
        time_minutes: recipe.time_minutes,
        price: format!("{:.2}", recipe.price),
        link: &recipe.link,
        tags: &detail.tags,
        ingredients: &detail.ingredients,
    }
}
