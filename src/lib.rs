pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod password;
pub mod rotation;
pub mod service;

use api::create_api_router;
use auth::CookieSettings;
use axum::Router;
use db::Database;
use jwt::TokenCodec;
use password::Passwords;
use rotation::RotationEngine;
use service::AuthService;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret for signing refresh tokens, distinct from the access secret
    pub refresh_secret: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Cross-site cookie attributes (`SameSite=None; Secure`)
    pub production: bool,
    pub passwords: Passwords,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let codec = Arc::new(TokenCodec::new(
        &config.access_secret,
        &config.refresh_secret,
        config.access_ttl,
        config.refresh_ttl,
    ));

    let engine = RotationEngine::new(Arc::new(config.db.clone()), codec.clone());
    let service = AuthService::new(config.db.clone(), engine, config.passwords.clone());

    create_api_router(
        config.db.clone(),
        codec,
        service,
        CookieSettings::new(config.production),
    )
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    init_cleanup(&config.db).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
