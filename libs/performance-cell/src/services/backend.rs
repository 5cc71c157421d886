// =====================================================================================
// DISTRIBUTED TIER: PLUGGABLE CACHE BACKEND
// =====================================================================================

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::BackendError;

/// Longest expiry sent to Redis; larger TTLs are clamped.
const MAX_REDIS_TTL: Duration = Duration::from_secs(86_400 * 365 * 100);

/// `PX` argument for a TTL. Zero means the write should be skipped.
fn px_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.min(MAX_REDIS_TTL).as_millis()).unwrap_or(u64::MAX)
}

/// External get/set/delete store consulted before (or instead of) the local
/// tier. Callers treat every `Err` as "unavailable for this call".
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BackendError>;

    async fn delete(&self, key: &str) -> Result<(), BackendError>;

    fn name(&self) -> &'static str {
        "external"
    }

    /// False for the null object, so strategy code can skip pointless I/O.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Null-object backend used when no distributed store is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCacheBackend;

#[async_trait]
impl CacheBackend for NoopCacheBackend {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), BackendError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), BackendError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "none"
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Redis-backed store over a deadpool connection pool.
pub struct RedisCacheBackend {
    pool: Pool,
}

impl RedisCacheBackend {
    /// Builds the pool and verifies it with a PING.
    pub async fn connect(redis_url: &str) -> Result<Self, BackendError> {
        let backend = Self::from_url(redis_url)?;

        let mut conn = backend.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis cache backend initialized successfully");

        Ok(backend)
    }

    /// Builds the pool without touching the network.
    pub fn from_url(redis_url: &str) -> Result<Self, BackendError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| BackendError::Unavailable(format!("Pool creation error: {}", e)))?;

        Ok(Self { pool })
    }

    async fn get_connection(&self) -> Result<Connection, BackendError> {
        self.pool
            .get()
            .await
            .map_err(|e| BackendError::Unavailable(format!("Failed to get Redis connection: {}", e)))
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let mut conn = self.get_connection().await?;
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        debug!("Redis GET key={} found={}", key, value.is_some());
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), BackendError> {
        // Redis rejects PX 0; sub-millisecond TTLs are not worth a round trip.
        let ttl_ms = px_millis(ttl);
        if ttl_ms == 0 {
            return Ok(());
        }

        let mut conn = self.get_connection().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        debug!("Redis SET key={} ttl_ms={}", key, ttl_ms);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BackendError> {
        let mut conn = self.get_connection().await?;
        let _: () = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
