//! Accounts owned by a user. Only what signup provisions lives here.

use sqlx::sqlite::SqlitePool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
}

pub struct AccountStore {
    pool: SqlitePool,
}

impl AccountStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an account. Names are unique per user.
    pub async fn create(&self, user_id: i64, name: &str) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO accounts (user_id, name) VALUES (?, ?)")
            .bind(user_id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<Account>, sqlx::Error> {
        sqlx::query_as("SELECT id, user_id, name FROM accounts WHERE user_id = ? ORDER BY id")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
    }
}
