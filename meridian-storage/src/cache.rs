//! Bounded, time-expiring caches for point lookups.
//!
//! Each lookup index gets its own `MappingCache`: a small map with LRU
//! eviction at capacity and TTL expiry on access. Only positive results are
//! ever inserted: a not-found must always go back to the store, so callers
//! never observe a cached absence. The cache is process-local shared state;
//! staleness, bounded by the TTL, is the only risk a stale entry carries.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use meridian_core::{CacheConfig, DirectoryConfig, OverlayMapping, UnderlayMapping};

struct CacheEntry<T> {
    value: T,
    inserted_at: Instant,
    last_used: u64,
}

struct CacheState<T> {
    entries: HashMap<String, CacheEntry<T>>,
    use_counter: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<T> Default for CacheState<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            use_counter: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }
}

/// A bounded map of canonical key to mapping record.
///
/// `get` never blocks on I/O and never fails; `put` overwrites. Lock scope
/// is a handful of memory operations, never held across suspension.
pub struct MappingCache<T> {
    config: CacheConfig,
    state: Mutex<CacheState<T>>,
}

impl<T: Clone> MappingCache<T> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Fetch a live entry, expiring it if its TTL has elapsed.
    pub fn get(&self, key: &str) -> Option<T> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let expired = match state.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() > self.config.ttl,
            None => {
                state.misses += 1;
                return None;
            }
        };

        if expired {
            state.entries.remove(key);
            state.misses += 1;
            return None;
        }

        state.use_counter += 1;
        state.hits += 1;
        let counter = state.use_counter;
        let entry = state.entries.get_mut(key)?;
        entry.last_used = counter;
        Some(entry.value.clone())
    }

    /// Insert or overwrite an entry, evicting the least-recently-used one
    /// when at capacity.
    pub fn put(&self, key: impl Into<String>, value: T) {
        if self.config.capacity == 0 {
            return;
        }

        let key = key.into();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.use_counter += 1;
        let counter = state.use_counter;

        if !state.entries.contains_key(&key) && state.entries.len() >= self.config.capacity {
            let coldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| k.clone());
            if let Some(coldest) = coldest {
                state.entries.remove(&coldest);
                state.evictions += 1;
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                last_used: counter,
            },
        );
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            entry_count: state.entries.len() as u64,
            evictions: state.evictions,
        }
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entry_count: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// The four per-index caches the lookup engine reads through.
///
/// Built once per process and injected at engine construction; torn down
/// with the process, never re-created mid-request.
pub struct DirectoryCaches {
    pub overlay_by_mac: MappingCache<OverlayMapping>,
    pub overlay_by_ip: MappingCache<OverlayMapping>,
    pub underlay_by_node: MappingCache<UnderlayMapping>,
    pub underlay_by_ip: MappingCache<UnderlayMapping>,
}

impl DirectoryCaches {
    pub fn new(config: DirectoryConfig) -> Self {
        Self {
            overlay_by_mac: MappingCache::new(config.overlay_by_mac),
            overlay_by_ip: MappingCache::new(config.overlay_by_ip),
            underlay_by_node: MappingCache::new(config.underlay_by_node),
            underlay_by_ip: MappingCache::new(config.underlay_by_ip),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DirectoryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn small_cache(capacity: usize, ttl: Duration) -> MappingCache<u32> {
        MappingCache::new(CacheConfig::new().with_capacity(capacity).with_ttl(ttl))
    }

    #[test]
    fn test_put_then_get() {
        let cache = small_cache(4, Duration::from_secs(60));
        cache.put("a", 1);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_put_overwrites() {
        let cache = small_cache(4, Duration::from_secs(60));
        cache.put("a", 1);
        cache.put("a", 2);
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_ttl_expires_on_access() {
        let cache = small_cache(4, Duration::from_millis(10));
        cache.put("a", 1);
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cache.get("a"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let cache = small_cache(2, Duration::from_secs(60));
        cache.put("a", 1);
        cache.put("b", 2);
        // Touch "a" so "b" becomes the eviction candidate.
        assert_eq!(cache.get("a"), Some(1));
        cache.put("c", 3);

        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_zero_capacity_never_stores() {
        let cache = small_cache(0, Duration::from_secs(60));
        cache.put("a", 1);
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_stats_hit_rate() {
        let cache = small_cache(4, Duration::from_secs(60));
        cache.put("a", 1);
        cache.get("a");
        cache.get("a");
        cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 0.001);
    }
}
