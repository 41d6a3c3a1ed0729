use redis::AsyncCommands;
use std::time::Duration;

use crate::CacheError;

/// Redis-backed cache: a `redis::Client` with a fresh multiplexed async
/// connection pulled per call. Backs the production API-key cache and
/// rate-limit counters.
#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url).map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut con = self.connection().await?;
        let value: Option<Vec<u8>> = con.get(key).await.map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con
            .set_ex(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut con = self.connection().await?;
        let _: () = con.del(key).await.map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(())
    }

    pub async fn incr_with_window(&self, key: &str, window: Duration) -> Result<u64, CacheError> {
        let mut con = self.connection().await?;
        let count: u64 = con.incr(key, 1).await.map_err(|e| CacheError::Backend(e.to_string()))?;
        if count == 1 {
            let _: () = con
                .expire(key, window.as_secs().max(1) as i64)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
        }
        Ok(count)
    }
}
