mod auth;
mod error;
mod users;

use axum::Router;
use std::sync::Arc;

use crate::auth::CookieSettings;
use crate::db::Database;
use crate::jwt::TokenCodec;
use crate::service::AuthService;

pub use auth::AuthState;
pub use users::UsersState;

/// Create the API router: `/auth/*` session endpoints and `/user`.
pub fn create_api_router(
    db: Database,
    codec: Arc<TokenCodec>,
    service: AuthService,
    cookies: CookieSettings,
) -> Router {
    let auth_state = AuthState { service, cookies };
    let users_state = UsersState { db, codec };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .merge(users::router(users_state))
}
