use super::CacheStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const SWEEP_AT: usize = 1024;

#[derive(Clone, Debug)]
struct CacheItem {
    data: String,
    expires_at: Instant,
}

impl CacheItem {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-process TTL store. Expired entries are evicted on read, and swept
/// from the whole map whenever a write finds it past the sweep mark.
#[derive(Debug)]
pub struct MemoryCache {
    entries: DashMap<String, CacheItem>,
    sweep_at: usize,
    next_sweep: AtomicUsize,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_sweep_at(SWEEP_AT)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_at(sweep_at: usize) -> Self {
        let sweep_at = sweep_at.max(1);
        Self {
            entries: DashMap::new(),
            sweep_at,
            next_sweep: AtomicUsize::new(sweep_at),
        }
    }

    /// Drops every expired entry. The next sweep waits until the live set
    /// doubles, so a map full of live keys is not rescanned on every write.
    fn sweep(&self) {
        let before = self.entries.len();
        self.entries.retain(|_, item| !item.is_expired());
        let live = self.entries.len();
        self.next_sweep
            .store((live * 2).max(self.sweep_at), Ordering::Relaxed);
        debug!(swept = before - live, live, "memory cache swept");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get_raw(&self, key: &str) -> anyhow::Result<Option<String>> {
        if let Some(item) = self.entries.get(key) {
            if !item.is_expired() {
                return Ok(Some(item.data.clone()));
            }
        }
        self.entries.remove_if(key, |_, item| item.is_expired());
        Ok(None)
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()> {
        if self.entries.len() >= self.next_sweep.load(Ordering::Relaxed) {
            self.sweep();
        }
        self.entries.insert(
            key.to_string(),
            CacheItem {
                data: value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = MemoryCache::new();
        cache
            .set_raw("holders:abc", "[1]".to_string(), Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get_raw("holders:abc").await.unwrap().as_deref(), Some("[1]"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get_raw("holders:abc").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_is_last_write_wins() {
        let cache = MemoryCache::new();
        cache.set_raw("k", "a".to_string(), Duration::from_secs(5)).await.unwrap();
        cache.set_raw("k", "b".to_string(), Duration::from_secs(5)).await.unwrap();

        assert_eq!(cache.get_raw("k").await.unwrap().as_deref(), Some("b"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unread_expired_keys_are_swept_on_write() {
        let cache = MemoryCache::with_sweep_at(4);
        for n in 0..4 {
            cache
                .set_raw(&format!("pairs-info:{}", n), "{}".to_string(), Duration::from_secs(10))
                .await
                .unwrap();
        }
        assert_eq!(cache.len(), 4);

        tokio::time::advance(Duration::from_secs(11)).await;
        cache
            .set_raw("pairs-info:fresh", "{}".to_string(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_keys_survive_a_sweep() {
        let cache = MemoryCache::with_sweep_at(2);
        cache.set_raw("short", "a".to_string(), Duration::from_secs(1)).await.unwrap();
        cache.set_raw("long", "b".to_string(), Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        cache.set_raw("new", "c".to_string(), Duration::from_secs(60)).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_raw("long").await.unwrap().as_deref(), Some("b"));
    }
}
