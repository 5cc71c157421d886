// =====================================================================================
// PERFORMANCE METRICS COLLECTOR
// =====================================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Process-wide counters for one `PerformanceService`.
///
/// Times are kept in microseconds. Execution latency (misses) and lookup
/// latency (hits) are accumulated separately so that the reported average
/// response time reflects real work only.
#[derive(Debug)]
pub struct PerformanceMetrics {
    request_count: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    parallel_requests: AtomicU64,
    streaming_requests: AtomicU64,
    errors: AtomicU64,
    total_response_time_us: AtomicU64,
    min_response_time_us: AtomicU64,
    max_response_time_us: AtomicU64,
    total_lookup_time_us: AtomicU64,
}

/// Plain copy of the counters at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsCounters {
    pub request_count: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub parallel_requests: u64,
    pub streaming_requests: u64,
    pub errors: u64,
    pub avg_response_time_ms: f64,
    pub min_response_time_ms: f64,
    pub max_response_time_ms: f64,
    pub avg_lookup_time_ms: f64,
}

impl MetricsCounters {
    /// Percentage of lookups served from cache, 0.0 to 100.0.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64 * 100.0
        }
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            parallel_requests: AtomicU64::new(0),
            streaming_requests: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
            min_response_time_us: AtomicU64::new(u64::MAX),
            max_response_time_us: AtomicU64::new(0),
            total_lookup_time_us: AtomicU64::new(0),
        }
    }

    pub fn record_hit(&self, lookup_time: Duration) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        self.total_lookup_time_us
            .fetch_add(as_micros(lookup_time), Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// One executed operation, successful or not.
    pub fn record_execution(&self, elapsed: Duration) {
        let micros = as_micros(elapsed);
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(micros, Ordering::Relaxed);
        self.min_response_time_us.fetch_min(micros, Ordering::Relaxed);
        self.max_response_time_us.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn record_parallel(&self, dispatched: usize) {
        self.parallel_requests
            .fetch_add(dispatched as u64, Ordering::Relaxed);
    }

    pub fn record_stream(&self) {
        self.streaming_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_errors(&self, count: usize) {
        if count > 0 {
            self.errors.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Reads every counter; fields may be slightly skewed under concurrent load.
    pub fn counters(&self) -> MetricsCounters {
        let request_count = self.request_count.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let total_response = self.total_response_time_us.load(Ordering::Relaxed);
        let total_lookup = self.total_lookup_time_us.load(Ordering::Relaxed);
        let min_response = self.min_response_time_us.load(Ordering::Relaxed);

        MetricsCounters {
            request_count,
            cache_hits,
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            parallel_requests: self.parallel_requests.load(Ordering::Relaxed),
            streaming_requests: self.streaming_requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            avg_response_time_ms: average_ms(total_response, request_count),
            min_response_time_ms: if min_response == u64::MAX {
                0.0
            } else {
                micros_to_ms(min_response)
            },
            max_response_time_ms: micros_to_ms(self.max_response_time_us.load(Ordering::Relaxed)),
            avg_lookup_time_ms: average_ms(total_lookup, cache_hits),
        }
    }

    pub fn reset(&self) {
        self.request_count.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.parallel_requests.store(0, Ordering::Relaxed);
        self.streaming_requests.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.total_response_time_us.store(0, Ordering::Relaxed);
        self.min_response_time_us.store(u64::MAX, Ordering::Relaxed);
        self.max_response_time_us.store(0, Ordering::Relaxed);
        self.total_lookup_time_us.store(0, Ordering::Relaxed);
    }
}

fn as_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

fn micros_to_ms(micros: u64) -> f64 {
    micros as f64 / 1000.0
}

fn average_ms(total_micros: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        micros_to_ms(total_micros) / count as f64
    }
}
