mod admin;
mod attrs;
pub mod dto;
pub mod extract;
mod media;
mod recipes;
pub mod response;
mod router;
mod users;
pub mod validation;

pub use recipes::RecipeView;
pub use recipes::payload::{PayloadMode, RecipeInput};
pub use router::{AppState, create_router};
