//! Per-server key/value cache
//!
//! Entries carry an absolute expiry and are treated as absent once it has
//! passed. Expiry uses `tokio::time::Instant` so paused test runtimes can
//! move the clock.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// Cache abstraction a host supplies for each server.
pub trait KeyValueCache: Send + Sync {
    /// Returns the value for `key` if present and unexpired.
    fn get(&self, key: &str) -> Option<u64>;

    /// Stores `value` under `key` for `ttl`.
    fn set(&self, key: &str, value: u64, ttl: Duration);
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    value: u64,
    expires_at: Instant,
}

/// In-process [`KeyValueCache`] backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every expired entry. Runs on every write.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueCache for MemoryCache {
    fn get(&self, key: &str) -> Option<u64> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value)
    }

    fn set(&self, key: &str, value: u64, ttl: Duration) {
        self.purge_expired();

        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let cache = MemoryCache::new();
        cache.set("disk_used", 42, Duration::from_secs(300));
        assert_eq!(cache.get("disk_used"), Some(42));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("disk_used"), Some(42));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("disk_used"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_refreshes_expiry() {
        let cache = MemoryCache::new();
        cache.set("disk_used", 1, Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;
        cache.set("disk_used", 2, Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get("disk_used"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache.set("short", 1, Duration::from_secs(1));
        cache.set("long", 2, Duration::from_secs(60));
        assert_eq!(cache.len(), 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long"), Some(2));
        assert!(cache.get("missing").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_drops_expired_entries() {
        let cache = MemoryCache::new();
        cache.set("stale", 1, Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(2)).await;

        cache.set("disk_used", 2, Duration::from_secs(60));
        assert_eq!(cache.len(), 1);
    }
}
