//! # Pantry
//!
//! A recipe API server, usable both as a standalone binary and as a library.
//! Users keep recipes together with their own tags and ingredients, which are
//! created on the fly from the names sent with a recipe.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! pantry = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pantry::config::ServerConfig;
//! use pantry::server::{AppState, create_router};
//! use pantry::store::{SqliteStore, Store};
//!
//! let config = ServerConfig::default();
//! let store = SqliteStore::new(config.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let state = Arc::new(AppState::new(Arc::new(store), &config));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `pantry` binary. Disable with `default-features = false`.

pub mod admin;
pub mod auth;
pub mod config;
pub mod error;
pub mod media;
pub mod server;
pub mod store;
pub mod types;
