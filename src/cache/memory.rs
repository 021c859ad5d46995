//! In-process cache backend.
//!
//! Keys expire lazily on access and through `purge_expired`. Every operation
//! holds the map lock for its whole read-modify-write, so bucket transitions
//! are atomic per process.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

use super::CacheError;
use super::bucket::{BucketConfig, BucketDecision, BucketState};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding the lock cannot leave an entry half-written.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a Entry> {
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        entries.get(key)
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.lock();
        Self::live(&mut entries, key).map(|e| e.value.clone())
    }

    pub fn set(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
    }

    pub fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let mut entries = self.lock();
        if Self::live(&mut entries, key).is_some() {
            return false;
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        true
    }

    pub fn del(&self, key: &str) -> bool {
        let mut entries = self.lock();
        let existed = Self::live(&mut entries, key).is_some();
        entries.remove(key);
        existed
    }

    pub fn take_token(
        &self,
        key: &str,
        config: &BucketConfig,
        now_ms: u64,
    ) -> Result<BucketDecision, CacheError> {
        let mut entries = self.lock();

        let previous = match Self::live(&mut entries, key) {
            Some(entry) => Some(serde_json::from_str::<BucketState>(&entry.value)?),
            None => None,
        };

        let (state, decision) = BucketState::admit(previous, config, now_ms);

        entries.insert(
            key.to_string(),
            Entry {
                value: serde_json::to_string(&state)?,
                expires_at: config.ttl.map(|ttl| Instant::now() + ttl),
            },
        );

        Ok(decision)
    }

    /// Remove every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let backend = MemoryBackend::new();
        backend.set("k", "v", Some(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(backend.get("k").as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(backend.get("k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_without_ttl_never_expires() {
        let backend = MemoryBackend::new();
        backend.set("k", "v", None);

        tokio::time::advance(Duration::from_secs(365 * 24 * 60 * 60)).await;
        assert_eq!(backend.get("k").as_deref(), Some("v"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_nx_after_expiry() {
        let backend = MemoryBackend::new();
        assert!(backend.set_nx("k", "a", Duration::from_secs(5)));
        assert!(!backend.set_nx("k", "b", Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(backend.set_nx("k", "c", Duration::from_secs(5)));
        assert_eq!(backend.get("k").as_deref(), Some("c"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let backend = MemoryBackend::new();
        backend.set("short", "v", Some(Duration::from_secs(1)));
        backend.set("long", "v", Some(Duration::from_secs(100)));
        backend.set("forever", "v", None);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(backend.purge_expired(), 1);
        assert_eq!(backend.len(), 2);
    }

    #[test]
    fn test_corrupt_bucket_state_is_an_error() {
        let backend = MemoryBackend::new();
        backend.set("bucket", "not json", None);

        let config = BucketConfig::new(1, 5, None);
        assert!(matches!(
            backend.take_token("bucket", &config, 0),
            Err(CacheError::Serialization(_))
        ));
    }
}
