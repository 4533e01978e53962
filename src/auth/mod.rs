mod helpers;
mod middleware;
mod password;
mod token;

pub use helpers::{TokenValidationError, extract_token_from_header, validate_token};
pub use middleware::{AuthError, RequireStaff, RequireUser};
pub use password::{hash_password, verify_password};
pub use token::{TokenGenerator, parse_token};
