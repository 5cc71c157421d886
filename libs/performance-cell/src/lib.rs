// =====================================================================================
// PERFORMANCE CELL - CACHING, FAN-OUT & STREAMING
// =====================================================================================
//
// In-process performance layer used by the agent-builder workflow:
// - Memoized invocation of expensive lookups with TTL (local LRU + optional Redis)
// - Bounded concurrent fan-out with per-task timeout and ordered results
// - Streaming relay of incrementally produced answers, optionally cached
// - Hit/miss/latency/error metrics
//
// =====================================================================================

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::{BackendError, PerformanceError};
pub use models::*;
pub use handlers::PerformanceHandlers;
pub use router::create_performance_router;
pub use services::{
    derive_cache_key, BoundedCache, CacheBackend, CacheEntry, FragmentStream, MetricsCounters,
    NamedQuery, NoopCacheBackend, PerformanceConfig, PerformanceMetrics, PerformanceService,
    RedisCacheBackend, WarmupEntry,
};
