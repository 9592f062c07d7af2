//! Authentication error responses.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthErrorKind {
    NotAuthenticated,
    SessionRevoked,
    Unavailable,
}

/// Session and bearer failures. Every unauthenticated case shares one
/// message so clients cannot tell an expired token from a forged one.
#[derive(Debug)]
pub struct ApiAuthError {
    kind: AuthErrorKind,
    clear_cookie: Option<String>,
}

impl ApiAuthError {
    pub fn not_authenticated() -> Self {
        Self {
            kind: AuthErrorKind::NotAuthenticated,
            clear_cookie: None,
        }
    }

    /// Reuse was detected. `clear_cookie` expires the refresh cookie so the
    /// client drops the dead family.
    pub fn session_revoked(clear_cookie: String) -> Self {
        Self {
            kind: AuthErrorKind::SessionRevoked,
            clear_cookie: Some(clear_cookie),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            kind: AuthErrorKind::Unavailable,
            clear_cookie: None,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::NotAuthenticated | AuthErrorKind::SessionRevoked => {
                StatusCode::UNAUTHORIZED
            }
            AuthErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NotAuthenticated => "Not authenticated",
            AuthErrorKind::SessionRevoked => "Session revoked, please log in again",
            AuthErrorKind::Unavailable => "Authentication temporarily unavailable",
        }
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        if let Some(cookie) = self.clear_cookie {
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }

        response
    }
}
