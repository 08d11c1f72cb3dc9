pub mod keys;
mod memory;
mod redis_store;

pub use memory::MemoryCache;
pub use redis_store::RedisCache;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// TTL key-value store holding JSON documents.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> anyhow::Result<()>;
}

/// Typed front of a [`CacheStore`]. Store failures are logged and read as
/// misses; the cache never fails a request on its own.
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCache::new()))
    }

    /// Redis when a url is configured, the in-process store otherwise.
    pub async fn connect(redis_url: Option<&str>) -> anyhow::Result<Self> {
        match redis_url {
            Some(url) => {
                let store = RedisCache::connect(url).await?;
                info!("🗄️ Cache backed by redis");
                Ok(Self::new(Arc::new(store)))
            }
            None => {
                info!("🗄️ Cache backed by process memory");
                Ok(Self::in_memory())
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get_raw(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, "cache read failed: {:#}", e);
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, "discarding undecodable cache entry: {}", e);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, "cache value not serializable: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.set_raw(key, raw, ttl).await {
            warn!(key, "cache write failed: {:#}", e);
        }
    }
}

/// Deterministic cache key for a request. Parts are trimmed, lower-cased and
/// sorted before hashing, so parameter order never changes the key. Callers
/// label parts (`platform=ethereum`) when their role matters.
pub fn fingerprint<I, S>(namespace: &str, parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = parts
        .into_iter()
        .map(|part| part.as_ref().trim().to_lowercase())
        .collect();
    normalized.sort();
    normalized.dedup();

    let mut hasher = Sha256::new();
    for part in &normalized {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{}:{}", namespace, hex::encode(hasher.finalize()))
}
