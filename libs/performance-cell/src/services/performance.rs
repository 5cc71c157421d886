// =====================================================================================
// PERFORMANCE SERVICE - MEMOIZATION FACADE
// =====================================================================================

use futures::future::{join_all, BoxFuture};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use shared_config::AppConfig;

use crate::error::PerformanceError;
use crate::models::{CacheStrategy, MetricsSnapshot, WarmupResult};
use crate::services::backend::{CacheBackend, NoopCacheBackend, RedisCacheBackend};
use crate::services::cache::BoundedCache;
use crate::services::keys::derive_cache_key;
use crate::services::metrics::PerformanceMetrics;

#[derive(Debug, Clone)]
pub struct PerformanceConfig {
    pub strategy: CacheStrategy,
    pub max_entries: usize,
    pub default_ttl: Duration,
    pub key_prefix: String,
    pub max_concurrent: usize,
    pub task_timeout: Option<Duration>,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            strategy: CacheStrategy::MemoryOnly,
            max_entries: 1000,
            default_ttl: Duration::from_secs(3600),
            key_prefix: "agent_builder".to_string(),
            max_concurrent: 5,
            task_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl PerformanceConfig {
    pub fn from_app_config(app_config: &AppConfig) -> Result<Self, PerformanceError> {
        Ok(Self {
            strategy: app_config.cache_strategy.parse()?,
            max_entries: app_config.cache_max_entries,
            default_ttl: Duration::from_secs(app_config.cache_default_ttl_seconds),
            key_prefix: app_config.cache_key_prefix.clone(),
            max_concurrent: app_config.parallel_max_concurrent,
            task_timeout: app_config.parallel_task_timeout_seconds.map(Duration::from_secs),
        })
    }

    pub fn strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }
}

/// One entry of a `warmup_cache` batch.
pub struct WarmupEntry<T> {
    pub cache_key: String,
    pub args: Value,
    pub ttl: Duration,
    operation: Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<T>> + Send>,
}

impl<T> WarmupEntry<T> {
    pub fn new<F, Fut>(cache_key: impl Into<String>, args: Value, ttl: Duration, operation: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self {
            cache_key: cache_key.into(),
            args,
            ttl,
            operation: Box::new(move || Box::pin(operation())),
        }
    }
}

/// Shared caching, fan-out and streaming layer.
///
/// Cheap to clone; clones share the same cache tiers and metrics.
#[derive(Clone)]
pub struct PerformanceService {
    pub(crate) cache: Arc<BoundedCache<Value>>,
    pub(crate) backend: Arc<dyn CacheBackend>,
    pub(crate) metrics: Arc<PerformanceMetrics>,
    pub(crate) config: Arc<PerformanceConfig>,
}

impl PerformanceService {
    pub fn new(config: PerformanceConfig) -> Self {
        Self::with_backend(config, Arc::new(NoopCacheBackend))
    }

    pub fn with_backend(config: PerformanceConfig, backend: Arc<dyn CacheBackend>) -> Self {
        if config.strategy.uses_backend() && !backend.is_configured() {
            warn!(
                "Cache strategy {} requested without a distributed backend; backend lookups will always miss",
                config.strategy
            );
        }

        info!(
            "Initializing PerformanceService: strategy={}, capacity={}, backend={}",
            config.strategy,
            config.max_entries,
            backend.name()
        );

        Self {
            cache: Arc::new(BoundedCache::new(config.max_entries)),
            backend,
            metrics: Arc::new(PerformanceMetrics::new()),
            config: Arc::new(config),
        }
    }

    /// Connects to Redis when the strategy needs it. A failed connection
    /// degrades to the no-op backend instead of failing startup.
    pub async fn from_app_config(app_config: &AppConfig) -> Result<Self, PerformanceError> {
        let config = PerformanceConfig::from_app_config(app_config)?;

        let backend: Arc<dyn CacheBackend> = match (&app_config.redis_url, config.strategy.uses_backend()) {
            (Some(url), true) => match RedisCacheBackend::connect(url).await {
                Ok(backend) => Arc::new(backend),
                Err(e) => {
                    warn!("Redis cache backend unavailable, continuing without it: {}", e);
                    Arc::new(NoopCacheBackend)
                }
            },
            _ => Arc::new(NoopCacheBackend),
        };

        Ok(Self::with_backend(config, backend))
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.config.strategy
    }

    pub fn config(&self) -> &PerformanceConfig {
        &self.config
    }

    pub fn metrics(&self) -> &PerformanceMetrics {
        &self.metrics
    }

    pub fn local_cache(&self) -> &BoundedCache<Value> {
        &self.cache
    }

    /// Full key used by `cached_call` for this name and argument set.
    pub fn cache_key<A>(&self, cache_key: &str, args: &A) -> Result<String, PerformanceError>
    where
        A: Serialize + ?Sized,
    {
        derive_cache_key(&self.config.key_prefix, cache_key, args)
    }

    // =================================================================================
    // MEMOIZED INVOCATION
    // =================================================================================

    /// Returns the cached result for `(cache_key, args)` or runs `operation`
    /// and stores its result for `ttl`. Operation errors propagate and are
    /// never cached.
    #[instrument(skip(self, args, operation))]
    pub async fn cached_call<T, A, F, Fut>(
        &self,
        cache_key: &str,
        args: &A,
        ttl: Duration,
        operation: F,
    ) -> Result<T, PerformanceError>
    where
        T: Serialize + DeserializeOwned,
        A: Serialize + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let full_key = self.cache_key(cache_key, args)?;
        let result = self.memoize(&full_key, ttl, operation).await;
        if matches!(result, Err(PerformanceError::Operation(_))) {
            self.metrics.record_errors(1);
        }
        result.map(|(value, _)| value)
    }

    /// `cached_call` with the configured default TTL.
    pub async fn cached_call_default<T, A, F, Fut>(
        &self,
        cache_key: &str,
        args: &A,
        operation: F,
    ) -> Result<T, PerformanceError>
    where
        T: Serialize + DeserializeOwned,
        A: Serialize + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let ttl = self.config.default_ttl;
        self.cached_call(cache_key, args, ttl, operation).await
    }

    /// Core lookup-execute-store sequence. The flag reports a cache hit.
    /// Does not touch the error counter; callers decide how failures count.
    pub(crate) async fn memoize<T, F, Fut>(
        &self,
        full_key: &str,
        ttl: Duration,
        operation: F,
    ) -> Result<(T, bool), PerformanceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let lookup_start = Instant::now();
        if let Some(cached) = self.lookup(full_key).await {
            match serde_json::from_value::<T>(cached) {
                Ok(value) => {
                    self.metrics.record_hit(lookup_start.elapsed());
                    debug!("Cache hit: key={}", full_key);
                    return Ok((value, true));
                }
                Err(e) => {
                    warn!("Cached value for key={} has an unexpected shape, recomputing: {}", full_key, e);
                }
            }
        }

        self.metrics.record_miss();
        debug!("Cache miss: key={}", full_key);

        let started = Instant::now();
        let outcome = operation().await;
        self.metrics.record_execution(started.elapsed());

        let value = outcome.map_err(PerformanceError::Operation)?;

        match serde_json::to_value(&value) {
            Ok(serialized) => self.store(full_key, &serialized, ttl).await,
            Err(e) => warn!("Result for key={} is not serializable, not caching: {}", full_key, e),
        }

        Ok((value, false))
    }

    /// Reads through the active tiers. Backend failures count as misses;
    /// under `Hybrid` a backend hit wins over the local tier.
    pub(crate) async fn lookup(&self, full_key: &str) -> Option<Value> {
        let strategy = self.config.strategy;

        if strategy.uses_backend() && self.backend.is_configured() {
            match self.backend.get(full_key).await {
                Ok(Some(bytes)) => match serde_json::from_slice::<Value>(&bytes) {
                    Ok(value) => return Some(value),
                    Err(e) => warn!("Undecodable backend entry for key={}: {}", full_key, e),
                },
                Ok(None) => {}
                Err(e) => warn!("Cache backend {} get failed for key={}: {}", self.backend.name(), full_key, e),
            }
        }

        if strategy.uses_local() {
            return self.cache.get(full_key).await;
        }

        None
    }

    /// Writes to the active tiers, local first. Backend writes are best effort.
    pub(crate) async fn store(&self, full_key: &str, value: &Value, ttl: Duration) {
        let strategy = self.config.strategy;

        if strategy.uses_local() {
            self.cache.set(full_key, value.clone(), ttl).await;
        }

        if strategy.uses_backend() && self.backend.is_configured() {
            match serde_json::to_vec(value) {
                Ok(bytes) => {
                    if let Err(e) = self.backend.set(full_key, &bytes, ttl).await {
                        warn!("Cache backend {} set failed for key={}: {}", self.backend.name(), full_key, e);
                    }
                }
                Err(e) => warn!("Failed to encode value for key={}: {}", full_key, e),
            }
        }

        debug!("Cached key={} ttl={:?} strategy={}", full_key, ttl, strategy);
    }

    // =================================================================================
    // POPULATION & INVALIDATION
    // =================================================================================

    /// Runs every entry through the memoization path concurrently. Failures
    /// are reported per entry and never abort the batch.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn warmup_cache<T>(&self, entries: Vec<WarmupEntry<T>>) -> Vec<WarmupResult>
    where
        T: Serialize + DeserializeOwned,
    {
        let total = entries.len();
        let results = join_all(entries.into_iter().map(|entry| async move {
            let WarmupEntry { cache_key, args, ttl, operation } = entry;

            let outcome = match self.cache_key(&cache_key, &args) {
                Ok(full_key) => self.memoize::<T, _, _>(&full_key, ttl, operation).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok((_, cached)) => WarmupResult { cache_key, success: true, cached, error: None },
                Err(e) => {
                    warn!("Cache warmup failed for {}: {}", cache_key, e);
                    WarmupResult { cache_key, success: false, cached: false, error: Some(e.to_string()) }
                }
            }
        }))
        .await;

        let failures = results.iter().filter(|r| !r.success).count();
        self.metrics.record_errors(failures);
        info!("Cache warmup finished: {} entries, {} failed", total, failures);

        results
    }

    /// Deletes the key `cached_call` would derive for the same arguments from
    /// every active tier.
    #[instrument(skip(self, args))]
    pub async fn invalidate_cache<A>(&self, cache_key: &str, args: &A) -> Result<(), PerformanceError>
    where
        A: Serialize + ?Sized,
    {
        let full_key = self.cache_key(cache_key, args)?;
        let strategy = self.config.strategy;

        if strategy.uses_backend() && self.backend.is_configured() {
            if let Err(e) = self.backend.delete(&full_key).await {
                warn!("Cache backend {} delete failed for key={}: {}", self.backend.name(), full_key, e);
            }
        }

        if strategy.uses_local() {
            self.cache.delete(&full_key).await;
        }

        debug!("Invalidated key={}", full_key);
        Ok(())
    }

    /// Empties the local tier. The shared backend is left alone.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("Local cache cleared");
    }

    pub async fn cleanup_expired(&self) -> usize {
        self.cache.cleanup_expired().await
    }

    // =================================================================================
    // METRICS
    // =================================================================================

    pub async fn get_metrics(&self) -> MetricsSnapshot {
        let counters = self.metrics.counters();

        MetricsSnapshot {
            cache_hit_rate: counters.cache_hit_rate(),
            avg_response_time_ms: counters.avg_response_time_ms,
            min_response_time_ms: counters.min_response_time_ms,
            max_response_time_ms: counters.max_response_time_ms,
            avg_lookup_time_ms: counters.avg_lookup_time_ms,
            request_count: counters.request_count,
            cache_hits: counters.cache_hits,
            cache_misses: counters.cache_misses,
            parallel_requests: counters.parallel_requests,
            streaming_requests: counters.streaming_requests,
            errors: counters.errors,
            cache_strategy: self.config.strategy,
            cache_stats: self.cache.stats().await,
            collected_at: chrono::Utc::now(),
        }
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
        info!("Performance metrics reset");
    }
}
