mod models;
mod recipe;

pub use models::*;
pub use recipe::*;
