//! In-memory credential store.
//!
//! All state lives behind one mutex, so every trait method (including
//! `rotate`) is atomic with respect to the others.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::store::{CredentialStore, RefreshTokenRecord, StoreError, TokenStatus, UserIdentity};

#[derive(Default)]
struct Inner {
    tokens: HashMap<String, RefreshTokenRecord>,
    users: HashMap<i64, UserIdentity>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, identity: UserIdentity) -> Result<(), StoreError> {
        self.lock()?.users.insert(identity.user_id, identity);
        Ok(())
    }

    /// All records of a family, in no particular order.
    pub fn family(&self, family_id: &str) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        Ok(self
            .lock()?
            .tokens
            .values()
            .filter(|r| r.family_id == family_id)
            .cloned()
            .collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

impl Inner {
    fn insert(&mut self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        if self.tokens.contains_key(&record.token_id) {
            return Err(StoreError::Unavailable("duplicate token id".into()));
        }
        self.tokens.insert(record.token_id.clone(), record.clone());
        Ok(())
    }

    fn transition(&mut self, token_id: &str, from: TokenStatus, to: TokenStatus) -> bool {
        match self.tokens.get_mut(token_id) {
            Some(record) if record.status == from => {
                record.status = to;
                true
            }
            _ => false,
        }
    }

    fn set_family(&mut self, family_id: &str, only: Option<TokenStatus>, to: TokenStatus) -> u64 {
        let mut changed = 0;
        for record in self.tokens.values_mut() {
            if record.family_id != family_id || record.status == to {
                continue;
            }
            if only.is_some_and(|s| s != record.status) {
                continue;
            }
            record.status = to;
            changed += 1;
        }
        changed
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, token_id: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self.lock()?.tokens.get(token_id).cloned())
    }

    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        self.lock()?.insert(record)
    }

    async fn conditional_transition(
        &self,
        token_id: &str,
        from: TokenStatus,
        to: TokenStatus,
    ) -> Result<bool, StoreError> {
        Ok(self.lock()?.transition(token_id, from, to))
    }

    async fn rotate(
        &self,
        token_id: &str,
        successor: &RefreshTokenRecord,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        if inner.tokens.contains_key(&successor.token_id) {
            return Err(StoreError::Unavailable("duplicate token id".into()));
        }
        if !inner.transition(token_id, TokenStatus::Valid, TokenStatus::Rotated) {
            return Ok(false);
        }
        inner.insert(successor)?;
        Ok(true)
    }

    async fn revoke_family(&self, family_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .lock()?
            .set_family(family_id, None, TokenStatus::Revoked))
    }

    async fn end_family(&self, family_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .lock()?
            .set_family(family_id, Some(TokenStatus::Valid), TokenStatus::Rotated))
    }

    async fn family_has_valid(&self, family_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .lock()?
            .tokens
            .values()
            .any(|r| r.family_id == family_id && r.status == TokenStatus::Valid))
    }

    async fn find_identity(&self, user_id: i64) -> Result<Option<UserIdentity>, StoreError> {
        Ok(self.lock()?.users.get(&user_id).cloned())
    }
}
