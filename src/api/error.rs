//! Shared error handling for API endpoints.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

/// Extension trait for concise error mapping on Results.
pub trait ResultExt<T> {
    fn db_err(self, msg: &str) -> Result<T, ApiError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn db_err(self, msg: &str) -> Result<T, ApiError> {
        self.map_err(|e| ApiError::db_error(msg, e))
    }
}

/// API error type with automatic response conversion.
#[derive(Debug)]
pub enum ApiError {
    /// The body could not be read as JSON; keeps the extractor's status
    Rejected(StatusCode, String),
    Validation(Vec<String>),
    NotFound(String),
    Unauthorized(String),
    Conflict(String),
    Internal(String),
}

impl ApiError {
    pub fn validation(messages: Vec<String>) -> Self {
        Self::Validation(messages)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn db_error(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal("Database error".into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected(rejection.status(), rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    messages: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, messages) = match self {
            ApiError::Rejected(status, msg) => (status, msg, None),
            ApiError::Validation(messages) => (
                StatusCode::BAD_REQUEST,
                "validation error".to_string(),
                Some(messages),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
        };
        (status, Json(ErrorResponse { error, messages })).into_response()
    }
}
