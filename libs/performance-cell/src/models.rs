use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PerformanceError;

// =====================================================================================
// CACHE STRATEGY
// =====================================================================================

/// Which tiers `cached_call` consults and populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStrategy {
    /// Local bounded cache only.
    MemoryOnly,
    /// External backend only; the local tier is never touched.
    Distributed,
    /// Backend first, local tier second; both populated on miss.
    Hybrid,
}

impl CacheStrategy {
    pub fn uses_local(&self) -> bool {
        matches!(self, CacheStrategy::MemoryOnly | CacheStrategy::Hybrid)
    }

    pub fn uses_backend(&self) -> bool {
        matches!(self, CacheStrategy::Distributed | CacheStrategy::Hybrid)
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheStrategy::MemoryOnly => "memory_only",
            CacheStrategy::Distributed => "distributed",
            CacheStrategy::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

impl FromStr for CacheStrategy {
    type Err = PerformanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "memory_only" => Ok(CacheStrategy::MemoryOnly),
            "distributed" | "redis" => Ok(CacheStrategy::Distributed),
            "hybrid" => Ok(CacheStrategy::Hybrid),
            other => Err(PerformanceError::InvalidConfiguration(format!(
                "unknown cache strategy '{}'",
                other
            ))),
        }
    }
}

// =====================================================================================
// STREAMING
// =====================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Forward every fragment unchanged.
    Chunks,
    /// Re-chunk on `\n`; the terminator (and a preceding `\r`) is stripped.
    Lines,
}

impl FromStr for StreamMode {
    type Err = PerformanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chunks" | "chunk" => Ok(StreamMode::Chunks),
            "lines" | "line" => Ok(StreamMode::Lines),
            other => Err(PerformanceError::InvalidConfiguration(format!(
                "unknown streaming mode '{}'",
                other
            ))),
        }
    }
}

// =====================================================================================
// FAN-OUT RESULTS
// =====================================================================================

/// Result slot of one task in a `parallel_execute` batch.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Completed(T),
    Failed(anyhow::Error),
    TimedOut,
}

impl<T> TaskOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed(_))
    }

    /// Failed or timed out.
    pub fn is_failure(&self) -> bool {
        !self.is_completed()
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            TaskOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            TaskOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        match self {
            TaskOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub(crate) fn map<U>(self, f: impl FnOnce(T) -> U) -> TaskOutcome<U> {
        match self {
            TaskOutcome::Completed(value) => TaskOutcome::Completed(f(value)),
            TaskOutcome::Failed(err) => TaskOutcome::Failed(err),
            TaskOutcome::TimedOut => TaskOutcome::TimedOut,
        }
    }
}

/// One item returned by `parallel_queries`, in input order.
#[derive(Debug)]
pub struct QueryResult<T> {
    pub name: String,
    pub outcome: TaskOutcome<T>,
    /// Served from a cache tier without invoking the query.
    pub cached: bool,
}

/// Per-entry report of `warmup_cache`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupResult {
    pub cache_key: String,
    pub success: bool,
    pub cached: bool,
    pub error: Option<String>,
}

// =====================================================================================
// METRICS REPORTING
// =====================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Percentage, 0.0 to 100.0.
    pub cache_hit_rate: f64,
    pub avg_response_time_ms: f64,
    pub min_response_time_ms: f64,
    pub max_response_time_ms: f64,
    pub avg_lookup_time_ms: f64,
    pub request_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub parallel_requests: u64,
    pub streaming_requests: u64,
    pub errors: u64,
    pub cache_strategy: CacheStrategy,
    pub cache_stats: CacheStats,
    pub collected_at: chrono::DateTime<chrono::Utc>,
}

// =====================================================================================
// HTTP PAYLOADS
// =====================================================================================

#[derive(Debug, Deserialize)]
pub struct InvalidateCacheRequest {
    pub cache_key: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub removed: usize,
}
