pub mod backend;
pub mod cache;
pub mod keys;
pub mod metrics;
pub mod parallel;
pub mod performance;
pub mod streaming;

pub use backend::{CacheBackend, NoopCacheBackend, RedisCacheBackend};
pub use cache::{BoundedCache, CacheEntry};
pub use keys::derive_cache_key;
pub use metrics::{MetricsCounters, PerformanceMetrics};
pub use parallel::NamedQuery;
pub use performance::{PerformanceConfig, PerformanceService, WarmupEntry};
pub use streaming::FragmentStream;
