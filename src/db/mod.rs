mod account;
mod token;
mod user;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub use account::{Account, AccountStore};
pub use token::TokenStore;
pub use user::{NewUser, User, UserCredentials, UserStore};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    /// Use ":memory:" for an in-memory database.
    pub async fn open(path: &str) -> Result<Self, sqlx::Error> {
        let pool = if path == ":memory:" {
            // Every SQLite connection gets its own private in-memory database,
            // so the pool must hold exactly one connection forever.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&format!("sqlite:{}?mode=rwc", path))
                .await?
        };

        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get the current schema version.
    async fn get_version(&self) -> Result<i32, sqlx::Error> {
        let result: Option<(i32,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(result.map(|r| r.0).unwrap_or(0))
    }

    /// Set the schema version within a transaction.
    async fn set_version(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        version: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM schema_version")
            .execute(&mut **tx)
            .await?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(version)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
            .execute(&self.pool)
            .await?;

        let version = self.get_version().await?;

        if version < 1 {
            self.migrate_v1().await?;
        }

        Ok(())
    }

    /// Execute a list of queries in a transaction, then set the version.
    async fn run_migration(
        &self,
        version: i32,
        queries: &[&'static str],
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for query in queries {
            sqlx::query(*query).execute(&mut *tx).await?;
        }
        Self::set_version(&mut tx, version).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate_v1(&self) -> Result<(), sqlx::Error> {
        self.run_migration(
            1,
            &[
                "CREATE TABLE users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT UNIQUE NOT NULL COLLATE NOCASE,
                    first_name TEXT NOT NULL,
                    last_name TEXT NOT NULL,
                    password_hash TEXT NOT NULL,
                    started INTEGER NOT NULL DEFAULT 0,
                    verified INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE TABLE accounts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE (user_id, name)
                )",
                "CREATE INDEX idx_accounts_user_id ON accounts(user_id)",
                // Only the digest of each refresh token's jti is stored.
                // Rows are never deleted on rotation or revocation.
                "CREATE TABLE refresh_tokens (
                    token_id TEXT PRIMARY KEY,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    family_id TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'valid'
                        CHECK (status IN ('valid', 'rotated', 'revoked')),
                    expires_at INTEGER NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                )",
                "CREATE INDEX idx_refresh_tokens_family_id ON refresh_tokens(family_id)",
                "CREATE INDEX idx_refresh_tokens_user_id ON refresh_tokens(user_id)",
                "CREATE INDEX idx_refresh_tokens_expires_at ON refresh_tokens(expires_at)",
            ],
        )
        .await
    }

    /// Get the user store.
    pub fn users(&self) -> UserStore {
        UserStore::new(self.pool.clone())
    }

    /// Get the refresh token store.
    pub fn tokens(&self) -> TokenStore {
        TokenStore::new(self.pool.clone())
    }

    /// Get the accounts store.
    pub fn accounts(&self) -> AccountStore {
        AccountStore::new(self.pool.clone())
    }

    /// Get the underlying connection pool (for tests that need raw SQL access).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> NewUser<'static> {
        NewUser {
            email: "alice@example.com",
            first_name: "Alice",
            last_name: "Liddell",
            password_hash: "hash",
        }
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db.users().create(&alice()).await.unwrap();

        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.first_name, "Alice");
        assert!(!user.started);
        assert!(!user.verified);

        let creds = db
            .users()
            .get_credentials("alice@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(creds.id, id);
        assert_eq!(creds.password_hash, "hash");
    }

    #[tokio::test]
    async fn test_mark_started_and_verified() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db.users().create(&alice()).await.unwrap();

        assert!(db.users().mark_started(id).await.unwrap());
        let user = db.users().get_by_id(id).await.unwrap().unwrap();
        assert!(user.started);
        assert!(!user.verified);

        assert!(db.users().mark_verified(id).await.unwrap());
        // Setting again is harmless.
        assert!(db.users().mark_verified(id).await.unwrap());
        assert!(db.users().get_by_id(id).await.unwrap().unwrap().verified);

        assert!(!db.users().mark_started(id + 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_email_fails() {
        let db = Database::open(":memory:").await.unwrap();

        db.users().create(&alice()).await.unwrap();
        let upper = NewUser {
            email: "ALICE@example.com",
            ..alice()
        };

        assert!(db.users().create(&upper).await.is_err());
        assert!(db.users().email_exists("alice@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_accounts_are_unique_per_user() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db.users().create(&alice()).await.unwrap();

        db.accounts().create(id, "Main Account").await.unwrap();
        assert!(db.accounts().create(id, "Main Account").await.is_err());

        let accounts = db.accounts().list_by_user(id).await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].name, "Main Account");
    }

    #[tokio::test]
    async fn test_reopen_skips_applied_migrations() {
        let db = Database::open(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        assert_eq!(db.get_version().await.unwrap(), 1);
    }
}
