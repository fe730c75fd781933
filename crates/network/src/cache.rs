// crates/network/src/cache.rs
//! Bounded TTL cache for GET responses

use crate::transport::TransportResponse;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Response cache configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Whether GET requests use the cache unless a request opts out
    pub enabled: bool,
    /// Maximum number of entries
    pub max_size: usize,
    /// TTL applied when a request does not specify one
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 100,
            default_ttl: Duration::from_secs(5 * 60),
        }
    }
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Hits over all lookups, 0.0 before the first lookup
    pub hit_rate: f64,
    pub miss_rate: f64,
}

#[derive(Debug)]
struct CacheEntry<V> {
    data: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Keys in first-insertion order; overwrites keep their slot
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl<V> CacheState<V> {
    fn remove(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }
}

/// Thread-safe, size-bounded TTL cache
///
/// Expired entries are purged lazily when read. When full, inserting a new
/// key evicts the oldest-inserted entry (not least-recently-used).
#[derive(Debug)]
pub struct ResponseCache<V = TransportResponse> {
    max_size: usize,
    default_ttl: Duration,
    state: Arc<Mutex<CacheState<V>>>,
}

impl<V> Clone for ResponseCache<V> {
    fn clone(&self) -> Self {
        Self {
            max_size: self.max_size,
            default_ttl: self.default_ttl,
            state: Arc::clone(&self.state),
        }
    }
}

impl<V: Clone> ResponseCache<V> {
    /// Creates an empty cache
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            max_size,
            default_ttl,
            state: Arc::new(Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
                hits: 0,
                misses: 0,
            })),
        }
    }

    /// Creates a cache from configuration
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_size, config.default_ttl)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up a live entry, counting a hit or a miss
    pub fn get(&self, key: &str) -> Option<V> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let now = Instant::now();

        let expired = match state.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                let data = entry.data.clone();
                state.hits += 1;
                return Some(data);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            state.remove(key);
            log::debug!("Cache entry expired: {}", key);
        }
        state.misses += 1;
        None
    }

    /// Inserts or overwrites an entry; `None` uses the default TTL
    pub fn set(&self, key: impl Into<String>, data: V, ttl: Option<Duration>) {
        if self.max_size == 0 {
            return;
        }

        let key = key.into();
        let entry = CacheEntry {
            data,
            created_at: Instant::now(),
            ttl: ttl.unwrap_or(self.default_ttl),
        };

        let mut state = self.lock();
        if let Some(existing) = state.entries.get_mut(&key) {
            *existing = entry;
            return;
        }

        while state.entries.len() >= self.max_size {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.entries.remove(&oldest);
                    log::debug!("Cache full, evicted {}", oldest);
                }
                None => break,
            }
        }

        state.order.push_back(key.clone());
        state.entries.insert(key, entry);
    }

    /// Removes every entry whose key starts with `prefix`
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut state = self.lock();
        let doomed: Vec<String> = state
            .order
            .iter()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        doomed.iter().filter(|k| state.remove(k)).count()
    }

    /// Removes all entries and resets statistics
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
        state.hits = 0;
        state.misses = 0;
    }

    /// Number of stored entries, including not-yet-purged expired ones
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let lookups = state.hits + state.misses;
        let (hit_rate, miss_rate) = if lookups == 0 {
            (0.0, 0.0)
        } else {
            (
                state.hits as f64 / lookups as f64,
                state.misses as f64 / lookups as f64,
            )
        };

        CacheStats {
            size: state.entries.len(),
            max_size: self.max_size,
            hits: state.hits,
            misses: state.misses,
            hit_rate,
            miss_rate,
        }
    }
}
