//! User profile endpoints.
//!
//! - GET `/user` - Profile of the bearer
//! - PUT `/user/started` - Mark onboarding finished
//! - PUT `/user/verify` - Mark the email address verified
//!
//! Flag changes show up in access tokens minted by the next refresh.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, put},
};
use serde::Serialize;
use std::sync::Arc;

use super::error::{ApiError, ResultExt};
use crate::auth::Auth;
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::TokenCodec;

#[derive(Clone)]
pub struct UsersState {
    pub db: Database,
    pub codec: Arc<TokenCodec>,
}

impl_has_auth_backend!(UsersState);

pub fn router(state: UsersState) -> Router {
    Router::new()
        .route("/user", get(get_user))
        .route("/user/started", put(mark_started))
        .route("/user/verify", put(mark_verified))
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserResponse {
    user_id: i64,
    email: String,
    first_name: String,
    last_name: String,
    started: bool,
    verified: bool,
}

async fn get_user(
    State(state): State<UsersState>,
    Auth(claims): Auth,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .db
        .users()
        .get_by_id(claims.user_id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(UserResponse {
        user_id: user.id,
        email: user.email,
        first_name: user.first_name,
        last_name: user.last_name,
        started: user.started,
        verified: user.verified,
    }))
}

async fn mark_started(
    State(state): State<UsersState>,
    Auth(claims): Auth,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state
        .db
        .users()
        .mark_started(claims.user_id)
        .await
        .db_err("Failed to update started flag")?;
    flag_response(updated)
}

async fn mark_verified(
    State(state): State<UsersState>,
    Auth(claims): Auth,
) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = state
        .db
        .users()
        .mark_verified(claims.user_id)
        .await
        .db_err("Failed to update verified flag")?;
    flag_response(updated)
}

fn flag_response(updated: bool) -> Result<Json<serde_json::Value>, ApiError> {
    if updated {
        Ok(Json(serde_json::json!({ "success": true })))
    } else {
        Err(ApiError::not_found("User not found"))
    }
}
