//! Periodic background work.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::sessions::UploadSessionStore;

/// Expire and clean up stale upload sessions every `interval` until
/// `shutdown` is notified.
pub fn spawn_session_sweeper(
    sessions: Arc<UploadSessionStore>,
    interval: Duration,
    shutdown: Arc<Notify>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        // The first tick fires immediately; nothing can have expired yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let cleaned = sessions.sweep();
                    if cleaned > 0 {
                        info!(cleaned, remaining = sessions.len(), "expired upload sessions cleaned up");
                    } else {
                        debug!(remaining = sessions.len(), "session sweep found nothing to clean");
                    }
                }
                _ = shutdown.notified() => {
                    debug!("session sweeper stopping");
                    break;
                }
            }
        }
    })
}
