//! Refresh token records.
//!
//! Rows are keyed by the digest of the token's jti and are only ever moved
//! between statuses. Expired rows are removed by the cleanup task.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::Database;
use crate::rotation::{CredentialStore, RefreshTokenRecord, StoreError, TokenStatus, UserIdentity};

#[derive(sqlx::FromRow)]
struct TokenRow {
    token_id: String,
    user_id: i64,
    family_id: String,
    status: String,
    expires_at: i64,
}

impl TryFrom<TokenRow> for RefreshTokenRecord {
    type Error = StoreError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        let status = TokenStatus::parse(&row.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown token status '{}'", row.status)))?;
        Ok(Self {
            token_id: row.token_id,
            user_id: row.user_id,
            family_id: row.family_id,
            status,
            expires_at: u64::try_from(row.expires_at).unwrap_or(0),
        })
    }
}

/// SQLite stores integers as i64.
fn to_sql_time(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// Store for refresh token records.
pub struct TokenStore {
    pool: SqlitePool,
}

impl TokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, token_id: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row: Option<TokenRow> = sqlx::query_as(
            "SELECT token_id, user_id, family_id, status, expires_at FROM refresh_tokens WHERE token_id = ?",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RefreshTokenRecord::try_from).transpose()
    }

    pub async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO refresh_tokens (token_id, user_id, family_id, status, expires_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&record.token_id)
        .bind(record.user_id)
        .bind(&record.family_id)
        .bind(record.status.as_str())
        .bind(to_sql_time(record.expires_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Compare-and-set on a single record's status.
    pub async fn transition(
        &self,
        token_id: &str,
        from: TokenStatus,
        to: TokenStatus,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE refresh_tokens SET status = ? WHERE token_id = ? AND status = ?")
                .bind(to.as_str())
                .bind(token_id)
                .bind(from.as_str())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Mark a valid token rotated and insert its successor in one transaction.
    pub async fn rotate(
        &self,
        token_id: &str,
        successor: &RefreshTokenRecord,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE refresh_tokens SET status = 'rotated' WHERE token_id = ? AND status = 'valid'",
        )
        .bind(token_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO refresh_tokens (token_id, user_id, family_id, status, expires_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&successor.token_id)
        .bind(successor.user_id)
        .bind(&successor.family_id)
        .bind(successor.status.as_str())
        .bind(to_sql_time(successor.expires_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn revoke_family(&self, family_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET status = 'revoked' WHERE family_id = ? AND status != 'revoked'",
        )
        .bind(family_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn end_family(&self, family_id: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET status = 'rotated' WHERE family_id = ? AND status = 'valid'",
        )
        .bind(family_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn family_has_valid(&self, family_id: &str) -> Result<bool, sqlx::Error> {
        let found: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM refresh_tokens WHERE family_id = ? AND status = 'valid' LIMIT 1",
        )
        .bind(family_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(found.is_some())
    }

    /// All records in a family, oldest first.
    pub async fn list_family(
        &self,
        family_id: &str,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        let rows: Vec<TokenRow> = sqlx::query_as(
            "SELECT token_id, user_id, family_id, status, expires_at FROM refresh_tokens WHERE family_id = ? ORDER BY rowid",
        )
        .bind(family_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RefreshTokenRecord::try_from).collect()
    }

    /// Delete records whose expiry is before `now` (Unix seconds).
    pub async fn delete_expired(&self, now: u64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < ?")
            .bind(to_sql_time(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CredentialStore for Database {
    async fn get(&self, token_id: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        self.tokens().get(token_id).await
    }

    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        Ok(self.tokens().insert(record).await?)
    }

    async fn conditional_transition(
        &self,
        token_id: &str,
        from: TokenStatus,
        to: TokenStatus,
    ) -> Result<bool, StoreError> {
        Ok(self.tokens().transition(token_id, from, to).await?)
    }

    async fn rotate(
        &self,
        token_id: &str,
        successor: &RefreshTokenRecord,
    ) -> Result<bool, StoreError> {
        Ok(self.tokens().rotate(token_id, successor).await?)
    }

    async fn revoke_family(&self, family_id: &str) -> Result<u64, StoreError> {
        Ok(self.tokens().revoke_family(family_id).await?)
    }

    async fn end_family(&self, family_id: &str) -> Result<u64, StoreError> {
        Ok(self.tokens().end_family(family_id).await?)
    }

    async fn family_has_valid(&self, family_id: &str) -> Result<bool, StoreError> {
        Ok(self.tokens().family_has_valid(family_id).await?)
    }

    async fn find_identity(&self, user_id: i64) -> Result<Option<UserIdentity>, StoreError> {
        Ok(self
            .users()
            .get_by_id(user_id)
            .await?
            .map(|user| user.identity()))
    }
}
