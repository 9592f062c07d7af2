#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::Value;
use std::time::Duration;
use tally_auth::{ServerConfig, create_app, db::Database, jwt::TokenCodec, password::Passwords};
use tower::ServiceExt;

pub const ACCESS_SECRET: &[u8] = b"integration-access-secret-0123456789";
pub const REFRESH_SECRET: &[u8] = b"integration-refresh-secret-012345678";
pub const PASSWORD: &str = "Secret123";

pub async fn test_config(production: bool) -> ServerConfig {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    ServerConfig {
        db,
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
        access_ttl: Duration::from_secs(15 * 60),
        refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        production,
        passwords: Passwords::insecure_fast(),
    }
}

/// Create a development-mode app and return (app, db).
pub async fn create_test_app() -> (Router, Database) {
    let config = test_config(false).await;
    (create_app(&config), config.db.clone())
}

pub struct TestResponse {
    pub status: StatusCode,
    pub cookies: Vec<String>,
    pub body: Value,
}

impl TestResponse {
    /// Value of the refresh cookie if this response set a new one.
    pub fn refresh_token(&self) -> Option<String> {
        self.cookies.iter().find_map(|c| {
            let value = c.strip_prefix("refresh_token=")?.split(';').next()?;
            (!value.is_empty()).then(|| value.to_string())
        })
    }

    pub fn cleared_refresh_cookie(&self) -> bool {
        self.cookies
            .iter()
            .any(|c| c.starts_with("refresh_token=;") && c.contains("Max-Age=0"))
    }

    pub fn access_token(&self) -> String {
        self.body["accessToken"]
            .as_str()
            .expect("response has no access token")
            .to_string()
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cookies = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    TestResponse {
        status,
        cookies,
        body,
    }
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> TestResponse {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_with_cookie(app: &Router, uri: &str, refresh_token: Option<&str>) -> TestResponse {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(token) = refresh_token {
        builder = builder.header(header::COOKIE, format!("refresh_token={}", token));
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

pub async fn refresh(app: &Router, refresh_token: &str) -> TestResponse {
    post_with_cookie(app, "/auth/token/refresh", Some(refresh_token)).await
}

pub async fn logout(app: &Router, refresh_token: &str) -> TestResponse {
    post_with_cookie(app, "/auth/logout", Some(refresh_token)).await
}

pub async fn get_user(app: &Router, access_token: Option<&str>) -> TestResponse {
    let mut builder = Request::builder().method("GET").uri("/user");
    if let Some(token) = access_token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

pub fn signup_body(email: &str) -> Value {
    serde_json::json!({
        "email": email,
        "firstName": "Ada",
        "lastName": "Lovelace",
        "password": PASSWORD,
    })
}

/// Sign up a user and return the response.
pub async fn signup(app: &Router, email: &str) -> TestResponse {
    let response = post_json(app, "/auth/signup", signup_body(email)).await;
    assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
    response
}

pub async fn login(app: &Router, email: &str, password: &str) -> TestResponse {
    post_json(
        app,
        "/auth/login",
        serde_json::json!({ "email": email, "password": password }),
    )
    .await
}

pub async fn put_with_bearer(app: &Router, uri: &str, access_token: Option<&str>) -> TestResponse {
    let mut builder = Request::builder().method("PUT").uri(uri);
    if let Some(token) = access_token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

/// POST a raw body with an optional Content-Type.
pub async fn post_raw(
    app: &Router,
    uri: &str,
    content_type: Option<&str>,
    body: &'static str,
) -> TestResponse {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    send(app, builder.body(Body::from(body)).unwrap()).await
}

/// Codec with the test secrets, for reading tokens the app minted.
pub fn test_codec() -> TokenCodec {
    TokenCodec::new(
        ACCESS_SECRET,
        REFRESH_SECRET,
        Duration::from_secs(15 * 60),
        Duration::from_secs(7 * 24 * 60 * 60),
    )
}
