//! Refresh token rotation and reuse detection.
//!
//! Each refresh token can be exchanged exactly once. Exchanging it marks its
//! record `rotated` and issues a successor in the same family. Presenting a
//! token that is no longer `valid` while its family is still live is
//! treated as theft: the whole family is revoked and the client must log in
//! again.
//!
//! A family whose members are all `rotated` was ended by logout. Presenting
//! one of its tokens is rejected with `SessionEnded` and does not revoke
//! anything, so a refresh racing a logout never raises a reuse alarm.

mod memory;
mod store;

pub use memory::MemoryStore;
pub use store::{CredentialStore, RefreshTokenRecord, StoreError, TokenStatus, UserIdentity};

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::jwt::{
    AccessSubject, AccessTokenResult, CodecError, RefreshTokenResult, TokenCodec, generate_jti,
    token_id, unix_now,
};

/// Why a presented refresh token was not accepted. Logged, never returned
/// to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    MissingToken,
    MalformedToken,
    InvalidSignature,
    Expired,
    UnknownToken,
}

#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("unauthenticated ({0:?})")]
    Unauthenticated(UnauthenticatedReason),
    #[error("refresh token reuse detected")]
    ReuseDetected,
    #[error("session has ended")]
    SessionEnded,
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),
    #[error(transparent)]
    Codec(CodecError),
}

impl From<CodecError> for RotationError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::MalformedToken => {
                Self::Unauthenticated(UnauthenticatedReason::MalformedToken)
            }
            CodecError::InvalidSignature => {
                Self::Unauthenticated(UnauthenticatedReason::InvalidSignature)
            }
            CodecError::Expired => Self::Unauthenticated(UnauthenticatedReason::Expired),
            other => Self::Codec(other),
        }
    }
}

/// A freshly minted credential pair.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub access: AccessTokenResult,
    pub refresh: RefreshTokenResult,
    pub user: UserIdentity,
    pub family_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// The token did not verify or had no record
    Ignored,
    /// Family ended; `records` is how many were still valid
    Ended { family_id: String, records: u64 },
}

#[derive(Clone)]
pub struct RotationEngine {
    store: Arc<dyn CredentialStore>,
    codec: Arc<TokenCodec>,
}

impl RotationEngine {
    pub fn new(store: Arc<dyn CredentialStore>, codec: Arc<TokenCodec>) -> Self {
        Self { store, codec }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Start a new family for a user who just authenticated.
    pub async fn issue_initial_family(
        &self,
        user: UserIdentity,
    ) -> Result<IssuedSession, RotationError> {
        let family_id = uuid::Uuid::new_v4().to_string();
        let jti = generate_jti();
        let refresh = self
            .codec
            .issue_refresh_token(user.user_id, &jti, &family_id)?;

        self.store
            .insert(&RefreshTokenRecord {
                token_id: token_id(&jti),
                user_id: user.user_id,
                family_id: family_id.clone(),
                status: TokenStatus::Valid,
                expires_at: refresh.expires_at,
            })
            .await?;

        let access = self.issue_access(&user)?;
        Ok(IssuedSession {
            access,
            refresh,
            user,
            family_id,
        })
    }

    /// Exchange a refresh token for a new pair, rotating it.
    pub async fn refresh(&self, presented: &str) -> Result<IssuedSession, RotationError> {
        let claims = self.codec.verify_refresh_token(presented)?;
        let current_id = token_id(&claims.jti);

        let record = self
            .store
            .get(&current_id)
            .await?
            .ok_or(RotationError::Unauthenticated(
                UnauthenticatedReason::UnknownToken,
            ))?;

        if record.user_id != claims.user_id || record.family_id != claims.family_id {
            return Err(self.revoke(&record).await);
        }
        if record.status != TokenStatus::Valid {
            return Err(self.reject_spent(&record).await);
        }
        if record.expires_at <= unix_now()? {
            return Err(RotationError::Unauthenticated(
                UnauthenticatedReason::Expired,
            ));
        }

        let user = self
            .store
            .find_identity(record.user_id)
            .await?
            .ok_or(RotationError::Unauthenticated(
                UnauthenticatedReason::UnknownToken,
            ))?;

        let jti = generate_jti();
        let refresh = self
            .codec
            .issue_refresh_token(record.user_id, &jti, &record.family_id)?;
        let successor = RefreshTokenRecord {
            token_id: token_id(&jti),
            user_id: record.user_id,
            family_id: record.family_id.clone(),
            status: TokenStatus::Valid,
            expires_at: refresh.expires_at,
        };

        let store = self.store.clone();
        let rotated = detached(async move { store.rotate(&current_id, &successor).await }).await?;
        if !rotated {
            // Lost a race with another refresh or a logout.
            return Err(self.reject_spent(&record).await);
        }

        debug!(family_id = %record.family_id, user_id = record.user_id, "Refresh token rotated");

        let access = self.issue_access(&user)?;
        Ok(IssuedSession {
            access,
            refresh,
            user,
            family_id: record.family_id,
        })
    }

    /// End the family of the presented token without flagging reuse.
    pub async fn logout(&self, presented: &str) -> Result<LogoutOutcome, RotationError> {
        let Ok(claims) = self.codec.verify_refresh_token(presented) else {
            return Ok(LogoutOutcome::Ignored);
        };

        let Some(record) = self.store.get(&token_id(&claims.jti)).await? else {
            return Ok(LogoutOutcome::Ignored);
        };

        let store = self.store.clone();
        let family_id = record.family_id.clone();
        let records = detached(async move { store.end_family(&family_id).await }).await?;

        debug!(family_id = %record.family_id, records, "Refresh token family ended");
        Ok(LogoutOutcome::Ended {
            family_id: record.family_id,
            records,
        })
    }

    fn issue_access(&self, user: &UserIdentity) -> Result<AccessTokenResult, RotationError> {
        Ok(self.codec.issue_access_token(AccessSubject {
            user_id: user.user_id,
            email: &user.email,
            started: user.started,
            verified: user.verified,
        })?)
    }

    /// Classify a presented record that is no longer valid.
    async fn reject_spent(&self, record: &RefreshTokenRecord) -> RotationError {
        let current = match self.store.get(&record.token_id).await {
            Ok(Some(current)) => current,
            Ok(None) => record.clone(),
            Err(e) => return e.into(),
        };

        if current.status == TokenStatus::Rotated {
            match self.store.family_has_valid(&current.family_id).await {
                Ok(false) => return RotationError::SessionEnded,
                Ok(true) => {}
                Err(e) => return e.into(),
            }
        }

        self.revoke(&current).await
    }

    async fn revoke(&self, record: &RefreshTokenRecord) -> RotationError {
        let store = self.store.clone();
        let family_id = record.family_id.clone();

        match detached(async move { store.revoke_family(&family_id).await }).await {
            Ok(revoked) => {
                warn!(
                    family_id = %record.family_id,
                    user_id = record.user_id,
                    token_id = %record.token_id,
                    revoked,
                    "Refresh token reuse detected, family revoked"
                );
                RotationError::ReuseDetected
            }
            Err(e) => e,
        }
    }
}

/// Run a store mutation on its own task so it completes even if the
/// request that started it is dropped.
async fn detached<T, F>(fut: F) -> Result<T, RotationError>
where
    F: Future<Output = Result<T, StoreError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(fut)
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
        .map_err(RotationError::from)
}
