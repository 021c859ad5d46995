//! Scheduled eviction of expired in-process cache entries.

use crate::cache::Cache;
use std::time::Duration;
use tracing::{debug, info};

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Run all cleanup tasks once. Returns the number of entries removed.
pub fn run_cleanup(cache: &Cache) -> usize {
    let removed = cache.purge_expired();
    if removed > 0 {
        info!("Cleaned up {} expired cache entries", removed);
    } else {
        debug!("No expired cache entries to clean up");
    }
    removed
}

/// Spawn a background task that runs cleanup periodically.
/// Returns `None` when the cache expires entries on its own.
pub fn spawn_cleanup_scheduler(cache: Cache) -> Option<tokio::task::JoinHandle<()>> {
    if !cache.is_memory() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&cache);
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SessionStore;

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_removes_expired_entries() {
        let cache = Cache::memory();
        let sessions = SessionStore::new(cache.clone(), Duration::from_secs(10));
        sessions.put("user-1", "refresh", "10.0.0.1").await.unwrap();
        sessions.put("user-2", "refresh", "10.0.0.2").await.unwrap();

        assert_eq!(run_cleanup(&cache), 0);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(run_cleanup(&cache), 2);
        assert_eq!(run_cleanup(&cache), 0);
    }
}
