//! Signing and verification of access and refresh credentials.
//!
//! Access and refresh tokens are signed with distinct secrets, so a token of
//! one kind never verifies as the other even before the `type` claim is
//! checked. Verification only proves the token was minted here and is
//! untampered; whether a refresh token is still usable is decided by the
//! rotation engine.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Number of random bytes in a refresh token identifier.
const JTI_BYTES: usize = 32;

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived bearer credential returned in response bodies
    Access,
    /// Long-lived rotating credential carried in the refresh cookie
    Refresh,
}

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    #[serde(rename = "userId")]
    pub user_id: i64,
    pub email: String,
    /// Onboarding finished
    pub started: bool,
    /// Email address verified
    pub verified: bool,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Claims carried by a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    #[serde(rename = "userId")]
    pub user_id: i64,
    /// Raw token identifier. Only its digest is ever persisted.
    pub jti: String,
    /// Family the token belongs to
    #[serde(rename = "fam")]
    pub family_id: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: u64,
    pub exp: u64,
}

/// Identity fields embedded in an access token.
#[derive(Debug, Clone, Copy)]
pub struct AccessSubject<'a> {
    pub user_id: i64,
    pub email: &'a str,
    pub started: bool,
    pub verified: bool,
}

/// Result of generating an access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    pub token: String,
    /// Token duration in seconds
    pub duration: u64,
}

/// Result of generating a refresh token.
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Signing keys and lifetimes for both credential kinds.
#[derive(Clone)]
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Sign an access token for the given subject.
    pub fn issue_access_token(
        &self,
        subject: AccessSubject<'_>,
    ) -> Result<AccessTokenResult, CodecError> {
        let now = unix_now()?;
        let duration = self.access_ttl.as_secs();

        let claims = AccessClaims {
            user_id: subject.user_id,
            email: subject.email.to_string(),
            started: subject.started,
            verified: subject.verified,
            token_type: TokenType::Access,
            iat: now,
            exp: expiry(now, duration)?,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.access_encoding)
            .map_err(CodecError::Encoding)?;

        Ok(AccessTokenResult { token, duration })
    }

    /// Sign a refresh token carrying `jti` and `family_id`.
    pub fn issue_refresh_token(
        &self,
        user_id: i64,
        jti: &str,
        family_id: &str,
    ) -> Result<RefreshTokenResult, CodecError> {
        let now = unix_now()?;
        let duration = self.refresh_ttl.as_secs();
        let exp = expiry(now, duration)?;

        let claims = RefreshClaims {
            user_id,
            jti: jti.to_string(),
            family_id: family_id.to_string(),
            token_type: TokenType::Refresh,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.refresh_encoding)
            .map_err(CodecError::Encoding)?;

        Ok(RefreshTokenResult {
            token,
            issued_at: now,
            expires_at: exp,
            duration,
        })
    }

    /// Validate and decode an access token.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, CodecError> {
        let claims: AccessClaims = decode(token, &self.access_decoding)?;
        if claims.token_type != TokenType::Access {
            return Err(CodecError::MalformedToken);
        }
        Ok(claims)
    }

    /// Validate and decode a refresh token.
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, CodecError> {
        let claims: RefreshClaims = decode(token, &self.refresh_decoding)?;
        if claims.token_type != TokenType::Refresh || claims.jti.is_empty() {
            return Err(CodecError::MalformedToken);
        }
        Ok(claims)
    }
}

fn decode<T: serde::de::DeserializeOwned>(token: &str, key: &DecodingKey) -> Result<T, CodecError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    jsonwebtoken::decode::<T>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => CodecError::Expired,
            ErrorKind::InvalidSignature => CodecError::InvalidSignature,
            _ => CodecError::MalformedToken,
        })
}

/// Generate a fresh high-entropy refresh token identifier.
pub fn generate_jti() -> String {
    let mut bytes = [0u8; JTI_BYTES];
    rand::RngCore::fill_bytes(&mut rand::rng(), &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// One-way digest of a raw `jti`, used as the persisted lookup key.
pub fn token_id(jti: &str) -> String {
    URL_SAFE_NO_PAD.encode(openssl::sha::sha256(jti.as_bytes()))
}

fn expiry(now: u64, duration: u64) -> Result<u64, CodecError> {
    now.checked_add(duration).ok_or(CodecError::LifetimeOverflow)
}

pub(crate) fn unix_now() -> Result<u64, CodecError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| CodecError::Time)
}

/// Errors that can occur while signing or verifying tokens.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is malformed")]
    MalformedToken,
    #[error("failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("system time error")]
    Time,
    #[error("token lifetime overflows the expiry timestamp")]
    LifetimeOverflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCESS_SECRET: &[u8] = b"access-secret-for-tests-0123456789";
    const REFRESH_SECRET: &[u8] = b"refresh-secret-for-tests-012345678";

    fn codec() -> TokenCodec {
        TokenCodec::new(
            ACCESS_SECRET,
            REFRESH_SECRET,
            Duration::from_secs(15 * 60),
            Duration::from_secs(7 * 24 * 60 * 60),
        )
    }

    fn subject() -> AccessSubject<'static> {
        AccessSubject {
            user_id: 42,
            email: "alice@example.com",
            started: true,
            verified: false,
        }
    }

    #[test]
    fn test_generate_and_validate_access_token() {
        let codec = codec();
        let result = codec.issue_access_token(subject()).unwrap();
        assert_eq!(result.duration, 15 * 60);

        let claims = codec.verify_access_token(&result.token).unwrap();
        assert_eq!(claims.user_id, 42);
        assert_eq!(claims.email, "alice@example.com");
        assert!(claims.started);
        assert!(!claims.verified);
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn test_generate_and_validate_refresh_token() {
        let codec = codec();
        let jti = generate_jti();
        let result = codec.issue_refresh_token(7, &jti, "family-1").unwrap();
        assert_eq!(result.expires_at - result.issued_at, result.duration);

        let claims = codec.verify_refresh_token(&result.token).unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.jti, jti);
        assert_eq!(claims.family_id, "family-1");
        assert_eq!(claims.token_type, TokenType::Refresh);
    }

    #[test]
    fn test_refresh_claims_wire_names() {
        let codec = codec();
        let result = codec.issue_refresh_token(7, "abc", "fam-9").unwrap();
        let payload = result.token.split('.').nth(1).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();

        assert_eq!(json["userId"], 7);
        assert_eq!(json["fam"], "fam-9");
        assert_eq!(json["type"], "refresh");
    }

    #[test]
    fn test_kinds_do_not_cross_verify() {
        let codec = codec();
        let access = codec.issue_access_token(subject()).unwrap();
        let refresh = codec.issue_refresh_token(42, "jti", "fam").unwrap();

        assert!(matches!(
            codec.verify_refresh_token(&access.token),
            Err(CodecError::InvalidSignature)
        ));
        assert!(matches!(
            codec.verify_access_token(&refresh.token),
            Err(CodecError::InvalidSignature)
        ));
    }

    #[test]
    fn test_same_secret_still_checks_type() {
        let codec = TokenCodec::new(
            ACCESS_SECRET,
            ACCESS_SECRET,
            Duration::from_secs(60),
            Duration::from_secs(60),
        );
        let refresh = codec.issue_refresh_token(1, "jti", "fam").unwrap();
        assert!(codec.verify_access_token(&refresh.token).is_err());
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            codec().verify_refresh_token("not-a-token"),
            Err(CodecError::MalformedToken)
        ));
    }

    #[test]
    fn test_expired_token() {
        let now = unix_now().unwrap();
        let claims = RefreshClaims {
            user_id: 1,
            jti: "jti".to_string(),
            family_id: "fam".to_string(),
            token_type: TokenType::Refresh,
            iat: now - 100,
            exp: now - 50,
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(REFRESH_SECRET),
        )
        .unwrap();

        assert!(matches!(
            codec().verify_refresh_token(&token),
            Err(CodecError::Expired)
        ));
    }

    #[test]
    fn test_token_id_is_deterministic_and_hides_jti() {
        let jti = generate_jti();
        assert_eq!(token_id(&jti), token_id(&jti));
        assert_ne!(token_id(&jti), jti);
        assert_ne!(token_id(&jti), token_id(&generate_jti()));
    }

    #[test]
    fn test_unique_jti() {
        assert_ne!(generate_jti(), generate_jti());
    }

    #[test]
    fn test_lifetime_overflow_is_an_error() {
        let codec = TokenCodec::new(
            ACCESS_SECRET,
            REFRESH_SECRET,
            Duration::from_secs(u64::MAX),
            Duration::from_secs(u64::MAX),
        );

        assert!(matches!(
            codec.issue_refresh_token(1, &generate_jti(), "fam"),
            Err(CodecError::LifetimeOverflow)
        ));
        assert!(matches!(
            codec.issue_access_token(AccessSubject {
                user_id: 1,
                email: "a@b.co",
                started: false,
                verified: false,
            }),
            Err(CodecError::LifetimeOverflow)
        ));
    }
}
