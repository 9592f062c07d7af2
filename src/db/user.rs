use sqlx::sqlite::SqlitePool;

use crate::rotation::UserIdentity;

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub started: bool,
    pub verified: bool,
}

impl User {
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            user_id: self.id,
            email: self.email.clone(),
            started: self.started,
            verified: self.verified,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    first_name: String,
    last_name: String,
    started: i32,
    verified: i32,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            started: row.started != 0,
            verified: row.verified != 0,
        }
    }
}

/// Fields for a new user; the password is already hashed.
#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub password_hash: &'a str,
}

/// Login lookup result.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserCredentials {
    pub id: i64,
    pub password_hash: String,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new user. Returns the user ID.
    pub async fn create(&self, user: &NewUser<'_>) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (email, first_name, last_name, password_hash) VALUES (?, ?, ?, ?)",
        )
        .bind(user.email)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.password_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool, sqlx::Error> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 > 0)
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, first_name, last_name, started, verified FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get the password hash for an email address.
    pub async fn get_credentials(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, sqlx::Error> {
        sqlx::query_as("SELECT id, password_hash FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    /// Mark onboarding as finished. Returns false if the user does not exist.
    pub async fn mark_started(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET started = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Mark the email address as verified. Returns false if the user does not exist.
    pub async fn mark_verified(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET verified = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}
