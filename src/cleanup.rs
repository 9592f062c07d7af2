//! Scheduled removal of expired refresh token records.

use crate::db::Database;
use crate::jwt::unix_now;
use std::time::Duration;
use tracing::{error, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once. Returns the number of records removed.
pub async fn run_cleanup(db: &Database) -> u64 {
    let now = match unix_now() {
        Ok(now) => now,
        Err(e) => {
            error!(error = %e, "Failed to read clock for cleanup");
            return 0;
        }
    };

    match db.tokens().delete_expired(now).await {
        Ok(count) => {
            if count > 0 {
                info!(count, "Cleaned up expired refresh tokens");
            }
            count
        }
        Err(e) => {
            error!(error = %e, "Failed to clean up expired refresh tokens");
            0
        }
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(db: Database) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&db).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewUser;
    use crate::rotation::{RefreshTokenRecord, TokenStatus};

    #[tokio::test]
    async fn test_run_cleanup_removes_only_expired() {
        let db = Database::open(":memory:").await.unwrap();
        let user_id = db
            .users()
            .create(&NewUser {
                email: "carol@example.com",
                first_name: "Carol",
                last_name: "Danvers",
                password_hash: "hash",
            })
            .await
            .unwrap();

        for (token_id, expires_at) in [("stale", 1), ("live", unix_now().unwrap() + 3600)] {
            db.tokens()
                .insert(&RefreshTokenRecord {
                    token_id: token_id.to_string(),
                    user_id,
                    family_id: "fam".to_string(),
                    status: TokenStatus::Rotated,
                    expires_at,
                })
                .await
                .unwrap();
        }

        assert_eq!(run_cleanup(&db).await, 1);
        assert!(db.tokens().get("live").await.unwrap().is_some());
        assert_eq!(run_cleanup(&db).await, 0);
    }
}
