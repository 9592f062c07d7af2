//! Session endpoints.
//!
//! - POST `/signup` - Create a user and start a session
//! - POST `/login` - Check credentials and start a session
//! - POST `/token/refresh` - Rotate the refresh cookie, return a new access token
//! - POST `/logout` - End the session family and clear the cookie

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
    routing::post,
};
use tracing::error;

use super::error::ApiError;
use crate::auth::{ApiAuthError, CookieSettings, REFRESH_COOKIE_NAME, get_cookie};
use crate::rotation::RotationError;
use crate::service::{AuthService, LoginRequest, ServiceError, SessionGrant, SignupRequest};

#[derive(Clone)]
pub struct AuthState {
    pub service: AuthService,
    pub cookies: CookieSettings,
}

pub fn router(state: AuthState) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/token/refresh", post(refresh))
        .route("/logout", post(logout))
        .with_state(state)
}

async fn signup(
    State(state): State<AuthState>,
    request: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<Response, Response> {
    let Json(request) = request.map_err(|e| ApiError::from(e).into_response())?;
    let grant = state
        .service
        .signup(request)
        .await
        .map_err(|e| error_response(e, &state.cookies))?;
    Ok(session_response(StatusCode::CREATED, grant, &state.cookies))
}

async fn login(
    State(state): State<AuthState>,
    request: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, Response> {
    let Json(request) = request.map_err(|e| ApiError::from(e).into_response())?;
    let grant = state
        .service
        .login(request)
        .await
        .map_err(|e| error_response(e, &state.cookies))?;
    Ok(session_response(StatusCode::OK, grant, &state.cookies))
}

async fn refresh(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Response, Response> {
    let presented = get_cookie(&headers, REFRESH_COOKIE_NAME);
    let grant = state
        .service
        .refresh(presented)
        .await
        .map_err(|e| error_response(e, &state.cookies))?;
    Ok(session_response(StatusCode::OK, grant, &state.cookies))
}

/// Always succeeds; the cookie is cleared even if the token was unknown.
async fn logout(State(state): State<AuthState>, headers: HeaderMap) -> impl IntoResponse {
    state
        .service
        .logout(get_cookie(&headers, REFRESH_COOKIE_NAME))
        .await;

    (
        StatusCode::OK,
        [(SET_COOKIE, state.cookies.clear_refresh_cookie())],
        Json(serde_json::json!({ "success": true })),
    )
}

fn session_response(status: StatusCode, grant: SessionGrant, cookies: &CookieSettings) -> Response {
    let cookie = cookies.refresh_cookie(&grant.refresh_token, grant.refresh_max_age);
    (status, [(SET_COOKIE, cookie)], Json(grant.body)).into_response()
}

fn error_response(e: ServiceError, cookies: &CookieSettings) -> Response {
    match e {
        ServiceError::Validation(messages) => ApiError::validation(messages).into_response(),
        ServiceError::DuplicateEmail => {
            ApiError::conflict("Email address is already registered").into_response()
        }
        ServiceError::InvalidCredentials => {
            ApiError::unauthorized("Invalid email or password").into_response()
        }
        ServiceError::Session(RotationError::ReuseDetected) => {
            ApiAuthError::session_revoked(cookies.clear_refresh_cookie()).into_response()
        }
        ServiceError::Session(
            RotationError::Unauthenticated(_) | RotationError::SessionEnded,
        ) => ApiAuthError::not_authenticated().into_response(),
        ServiceError::Session(RotationError::StoreUnavailable(e)) => {
            error!(error = %e, "Credential store unavailable");
            ApiAuthError::unavailable().into_response()
        }
        ServiceError::Session(RotationError::Codec(e)) => {
            error!(error = %e, "Failed to issue token");
            ApiError::internal("Failed to issue token").into_response()
        }
        ServiceError::Database(e) => ApiError::db_error("Database error", e).into_response(),
        ServiceError::Internal(msg) => {
            error!(error = %msg, "Internal error");
            ApiError::internal("Internal error").into_response()
        }
    }
}
