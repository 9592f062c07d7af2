//! Axum extractors for authentication.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use tracing::debug;

use super::errors::ApiAuthError;
use super::state::HasAuthBackend;
use crate::jwt::AccessClaims;

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Extractor for endpoints that require a valid access token.
/// Stateless: only the signature, type and expiry are checked.
pub struct Auth(pub AccessClaims);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(ApiAuthError::not_authenticated)?;
        state
            .codec()
            .verify_access_token(token)
            .map(Auth)
            .map_err(|e| {
                debug!(error = %e, "Rejected access token");
                ApiAuthError::not_authenticated()
            })
    }
}
