mod local;
mod redis_backend;

use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub use local::LocalCache;
pub use redis_backend::RedisCache;

#[derive(Debug, Error, Clone)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Cache backend strategy, selected once at startup: `Local` for tests and
/// single-node deployments, `Redis` when `cache-url` is configured.
#[derive(Clone)]
enum Backend {
    Local(LocalCache),
    Redis(RedisCache),
}

/// Short-lived key-value cache for API-key lookups and rate-limit counters.
/// Cache writes are best-effort: correctness never depends on cache
/// state, so every call here that can fail is logged and treated as a miss by
/// callers rather than propagated as a hard error.
#[derive(Clone)]
pub struct Cache {
    backend: Backend,
}

impl Cache {
    pub fn local() -> Self {
        Self { backend: Backend::Local(LocalCache::new()) }
    }

    pub fn redis(redis_url: &str) -> Result<Self, CacheError> {
        Ok(Self { backend: Backend::Redis(RedisCache::new(redis_url)?) })
    }

    /// Builds a `Local` backend if `redis_url` is `None`, a `Redis` backend
    /// otherwise.
    pub fn from_config(redis_url: Option<&str>) -> Result<Self, CacheError> {
        match redis_url {
            Some(url) => Self::redis(url),
            None => Ok(Self::local()),
        }
    }

    async fn get_raw(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match &self.backend {
            Backend::Local(c) => c.get(key).await,
            Backend::Redis(c) => c.get(key).await,
        }
    }

    async fn set_raw(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        match &self.backend {
            Backend::Local(c) => c.set(key, value, ttl).await,
            Backend::Redis(c) => c.set(key, value, ttl).await,
        }
    }

    pub async fn delete(&self, key: &str) {
        let result = match &self.backend {
            Backend::Local(c) => c.delete(key).await,
            Backend::Redis(c) => c.delete(key).await,
        };
        if let Err(e) = result {
            warn!(error = %e, key, "cache delete failed, ignoring");
        }
    }

    /// Best-effort get: any backend failure is logged and treated as a miss, so
    /// callers fall through to the authoritative store.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.get_raw(key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, key, "cache get failed, treating as miss");
                None
            }
        }
    }

    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        if let Err(e) = self.set_raw(key, value, ttl).await {
            warn!(error = %e, key, "cache set failed, ignoring");
        }
    }

    /// Increments the fixed-window counter for `key` and returns the new count,
    /// or `None` if the cache is unavailable. A `None` here means the caller
    /// (the rate limiter) must treat the check as disabled rather than denying
    /// the request: an outage of the cache disables rate limiting rather than
    /// failing requests.
    pub async fn incr_with_window(&self, key: &str, window: Duration) -> Option<u64> {
        let result = match &self.backend {
            Backend::Local(c) => c.incr_with_window(key, window).await,
            Backend::Redis(c) => c.incr_with_window(key, window).await,
        };
        match result {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(error = %e, key, "rate-limit counter unavailable, disabling limit for this request");
                None
            }
        }
    }
}

/// Sliding/fixed-window rate limiter over a `Cache`. One counter per
/// (partner, endpoint-class) pair per window.
pub struct RateLimiter {
    cache: Cache,
    default_limit_per_minute: u64,
}

impl RateLimiter {
    pub fn new(cache: Cache, default_limit_per_minute: u64) -> Self {
        Self { cache, default_limit_per_minute }
    }

    /// Returns `true` if the request should proceed, `false` if it is over the
    /// cap. A cache outage always allows the request through.
    pub async fn check(&self, partner_id: &str, endpoint_class: &str) -> bool {
        let key = format!("ratelimit:{partner_id}:{endpoint_class}");
        match self.cache.incr_with_window(&key, Duration::from_secs(60)).await {
            Some(count) => count <= self.default_limit_per_minute,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rate_limiter_allows_until_cap_then_denies() {
        let limiter = RateLimiter::new(Cache::local(), 3);
        assert!(limiter.check("p1", "wallet").await);
        assert!(limiter.check("p1", "wallet").await);
        assert!(limiter.check("p1", "wallet").await);
        assert!(!limiter.check("p1", "wallet").await);
    }

    #[tokio::test]
    async fn rate_limiter_is_scoped_per_partner_and_endpoint() {
        let limiter = RateLimiter::new(Cache::local(), 1);
        assert!(limiter.check("p1", "wallet").await);
        assert!(limiter.check("p2", "wallet").await);
        assert!(limiter.check("p1", "report").await);
    }
}
