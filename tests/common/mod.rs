//! In-process test harness.
//!
//! Each `TestApp` owns an isolated temp data directory and drives the router
//! directly with `oneshot`, so tests can run in parallel without a listener.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use pantry::auth::{TokenGenerator, hash_password};
use pantry::config::ServerConfig;
use pantry::server::{AppState, create_router};
use pantry::store::{SqliteStore, Store};
use pantry::types::{NewUser, User};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "pantry-test-boundary";

/// Smallest useful PNG: signature plus a 1x1 IHDR chunk.
pub const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89,
];

pub struct TestApp {
    pub temp_dir: TempDir,
    pub config: ServerConfig,
    pub store: Arc<SqliteStore>,
    router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestResponse {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }
}

impl TestApp {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let config = ServerConfig {
            data_dir: temp_dir.path().to_path_buf(),
            public_base_url: Some("http://testserver".to_string()),
            ..Default::default()
        };

        let store = Arc::new(SqliteStore::new(&config.db_path()).expect("failed to open store"));
        store.initialize().expect("failed to initialize store");

        let state = Arc::new(AppState::new(store.clone(), &config));
        let router = create_router(state);

        Self {
            temp_dir,
            config,
            store,
            router,
        }
    }

    /// Creates an active user directly in the store.
    pub fn create_user(&self, email: &str, password: &str, is_staff: bool) -> User {
        self.store
            .create_user(&NewUser {
                email: email.to_string(),
                name: "Test User".to_string(),
                password_hash: hash_password(password).expect("failed to hash password"),
                is_staff,
                is_superuser: false,
            })
            .expect("failed to create user")
    }

    /// Issues a token for `user` and returns the raw token string.
    pub fn token_for(&self, user: &User) -> String {
        let (token, raw) = TokenGenerator::new()
            .issue(user.id)
            .expect("failed to issue token");
        self.store.create_token(&token).expect("failed to store token");
        raw
    }

    /// Shorthand for a fresh non-staff user and their token.
    pub fn login(&self, email: &str) -> (User, String) {
        let user = self.create_user(email, "testpass123", false);
        let token = self.token_for(&user);
        (user, token)
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router failed");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        TestResponse { status, body }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Token {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("failed to build request");

        self.send(request).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Posts a single-file multipart form with the file under `image`.
    pub async fn upload(
        &self,
        uri: &str,
        token: &str,
        file_name: &str,
        data: &[u8],
    ) -> TestResponse {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Token {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .expect("failed to build request");

        self.send(request).await
    }
}
