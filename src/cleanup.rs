//! Scheduled sweep of expired session store entries.
//!
//! Expired entries are already invisible to reads; this only reclaims
//! memory. Redis expires keys on its own, so only the memory backend is swept.

use crate::session::SessionStore;
use std::time::Duration;
use tracing::info;

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Run all cleanup tasks once.
pub fn run_cleanup(sessions: &SessionStore) {
    let purged = sessions.purge_expired();
    if purged > 0 {
        info!("Cleaned up {} expired session entries", purged);
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(sessions: SessionStore) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&sessions);
        }
    })
}
