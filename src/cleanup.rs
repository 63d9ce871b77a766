//! Scheduled cleanup of expired and revoked auth data.

use crate::db::{Database, SessionRepository, unix_now};
use std::time::Duration;
use tracing::{error, info};

/// How long revoked sessions are kept for auditing (in days).
const REVOKED_SESSION_RETENTION_DAYS: i64 = 30;

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60); // 1 hour

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database) {
    let revoked_before = unix_now() - REVOKED_SESSION_RETENTION_DAYS * 24 * 60 * 60;

    // Expired sessions, and revoked ones past retention
    match db.sessions().delete_stale(revoked_before).await {
        Ok(count) if count > 0 => info!("Cleaned up {} stale sessions", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up sessions: {}", e),
    }

    // Abandoned provider sign-ins
    match db.oauth_states().delete_expired().await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired OAuth states", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up OAuth states: {}", e),
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
