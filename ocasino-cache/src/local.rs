use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::CacheError;

#[derive(Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-process cache backend: an `Arc<RwLock<HashMap<...>>>` behind async
/// methods, kept async-shaped for interface parity with `RedisCache` even
/// though nothing here actually awaits I/O. Used for single-node deployments
/// and tests.
#[derive(Clone, Default)]
pub struct LocalCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    counters: Arc<RwLock<HashMap<String, (u64, Instant)>>>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut map = self.entries.write().await;
        match map.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                map.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut map = self.entries.write().await;
        map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    /// Fixed-window counter increment for the rate limiter. Returns the
    /// count within the current window after incrementing.
    pub async fn incr_with_window(&self, key: &str, window: Duration) -> Result<u64, CacheError> {
        let mut counters = self.counters.write().await;
        let now = Instant::now();
        let entry = counters.entry(key.to_string()).or_insert((0, now + window));
        if now >= entry.1 {
            *entry = (0, now + window);
        }
        entry.0 += 1;
        Ok(entry.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = LocalCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn expired_entries_read_as_miss() {
        let cache = LocalCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn counter_resets_after_window() {
        let cache = LocalCache::new();
        let window = Duration::from_millis(20);
        assert_eq!(cache.incr_with_window("rl", window).await.unwrap(), 1);
        assert_eq!(cache.incr_with_window("rl", window).await.unwrap(), 2);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.incr_with_window("rl", window).await.unwrap(), 1);
    }
}
