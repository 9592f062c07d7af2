//! Credential store interface consumed by the rotation engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a refresh token record.
///
/// `Valid` is the only non-terminal state: a record moves to `Rotated` or
/// `Revoked` and never leaves it, except that revoking a family also marks
/// its `Rotated` members `Revoked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Valid,
    Rotated,
    Revoked,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Valid => "valid",
            TokenStatus::Rotated => "rotated",
            TokenStatus::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "valid" => Some(TokenStatus::Valid),
            "rotated" => Some(TokenStatus::Rotated),
            "revoked" => Some(TokenStatus::Revoked),
            _ => None,
        }
    }
}

/// One issued refresh credential, keyed by the digest of its `jti`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub token_id: String,
    pub user_id: i64,
    pub family_id: String,
    pub status: TokenStatus,
    /// Unix seconds
    pub expires_at: u64,
}

/// Identity fields the engine needs to mint an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: i64,
    pub email: String,
    pub started: bool,
    pub verified: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Durable storage for refresh token records and the user identities they
/// reference.
///
/// Every status mutation is a single conditional statement so that
/// concurrent requests presenting the same token cannot both observe
/// it as `valid`.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, token_id: &str) -> Result<Option<RefreshTokenRecord>, StoreError>;

    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError>;

    /// Move `token_id` from `from` to `to`. Returns false, changing nothing,
    /// if the record is missing or not currently in `from`.
    async fn conditional_transition(
        &self,
        token_id: &str,
        from: TokenStatus,
        to: TokenStatus,
    ) -> Result<bool, StoreError>;

    /// Mark `token_id` rotated and insert its successor as one atomic step.
    /// Returns false, inserting nothing, if `token_id` was no longer valid.
    ///
    /// The default is only atomic per statement; backends with transactions
    /// should override it.
    async fn rotate(
        &self,
        token_id: &str,
        successor: &RefreshTokenRecord,
    ) -> Result<bool, StoreError> {
        if !self
            .conditional_transition(token_id, TokenStatus::Valid, TokenStatus::Rotated)
            .await?
        {
            return Ok(false);
        }
        self.insert(successor).await?;
        Ok(true)
    }

    /// Set every record in the family to `revoked`. Returns rows changed.
    async fn revoke_family(&self, family_id: &str) -> Result<u64, StoreError>;

    /// Set every still-valid record in the family to `rotated`.
    async fn end_family(&self, family_id: &str) -> Result<u64, StoreError>;

    async fn family_has_valid(&self, family_id: &str) -> Result<bool, StoreError>;

    async fn find_identity(&self, user_id: i64) -> Result<Option<UserIdentity>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_column_text() {
        for status in [TokenStatus::Valid, TokenStatus::Rotated, TokenStatus::Revoked] {
            assert_eq!(TokenStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TokenStatus::parse("expired"), None);
    }
}
