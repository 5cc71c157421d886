// =====================================================================================
// LOCAL TIER: BOUNDED LRU CACHE WITH LAZY TTL EXPIRY
// =====================================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::models::CacheStats;

/// One memoized value plus its expiry and recency metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub expires_at: Instant,
    pub last_accessed: Instant,
    /// Insertion order, breaks `last_accessed` ties on eviction.
    sequence: u64,
}

/// Stand-in expiry for TTLs too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn expiry_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

impl<V> CacheEntry<V> {
    fn new(key: String, value: V, ttl: Duration, sequence: u64) -> Self {
        let now = Instant::now();
        Self {
            key,
            value,
            expires_at: expiry_after(now, ttl),
            last_accessed: now,
            sequence,
        }
    }

    /// A zero TTL entry is stale from the moment it is stored.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    pub fn remaining_ttl(&self) -> Option<Duration> {
        self.expires_at.checked_duration_since(Instant::now())
            .filter(|remaining| !remaining.is_zero())
    }

    fn eviction_rank(&self) -> (Instant, u64) {
        (self.last_accessed, self.sequence)
    }
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    next_sequence: u64,
}

/// Fixed-capacity key/value store with least-recently-used eviction.
///
/// Every read-check-evict-insert sequence runs under one mutex, so concurrent
/// misses can never push the entry count past `capacity`.
pub struct BoundedCache<V> {
    state: Mutex<CacheState<V>>,
    capacity: usize,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl<V: Clone> BoundedCache<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            warn!("BoundedCache capacity must be positive, using 1");
            1
        } else {
            capacity
        };

        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity(capacity.min(4096)),
                next_sequence: 0,
            }),
            capacity,
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Returns the value if present and fresh. A stale entry found here is
    /// removed before reporting the miss.
    pub async fn get(&self, key: &str) -> Option<V> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let expired = state.entries.get(key)?.is_expired(now);
        if expired {
            state.entries.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
            debug!("Local cache entry expired: key={}", key);
            return None;
        }

        let entry = state.entries.get_mut(key)?;
        entry.last_accessed = now;
        Some(entry.value.clone())
    }

    pub async fn set(&self, key: &str, value: V, ttl: Duration) {
        let mut state = self.state.lock().await;

        if let Some(entry) = state.entries.get_mut(key) {
            let now = Instant::now();
            entry.value = value;
            entry.expires_at = expiry_after(now, ttl);
            entry.last_accessed = now;
            return;
        }

        if state.entries.len() >= self.capacity {
            let victim = state
                .entries
                .values()
                .min_by_key(|entry| entry.eviction_rank())
                .map(|entry| entry.key.clone());

            if let Some(victim) = victim {
                state.entries.remove(&victim);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!("Local cache evicted least recently used key={}", victim);
            }
        }

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state
            .entries
            .insert(key.to_string(), CacheEntry::new(key.to_string(), value, ttl, sequence));
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.state.lock().await.entries.remove(key).is_some()
    }

    pub async fn clear(&self) {
        self.state.lock().await.entries.clear();
    }

    /// Presence check that neither refreshes recency nor removes stale entries.
    pub async fn contains(&self, key: &str) -> bool {
        let state = self.state.lock().await;
        let now = Instant::now();
        state
            .entries
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    /// Metadata snapshot for one key, without touching it.
    pub async fn peek_entry(&self, key: &str) -> Option<CacheEntry<V>> {
        self.state.lock().await.entries.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sweeps every stale entry at once; reads still expire lazily.
    pub async fn cleanup_expired(&self) -> usize {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - state.entries.len();

        if removed > 0 {
            self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
            debug!("Swept {} expired local cache entries", removed);
        }
        removed
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len().await,
            capacity: self.capacity,
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}
