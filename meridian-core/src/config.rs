//! Configuration types

use std::time::Duration;

/// Configuration for one bounded mapping cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction kicks in.
    pub capacity: usize,
    /// How long an entry stays servable after insertion.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl: Duration::from_secs(10),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the per-entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Per-index cache settings for the lookup engine.
///
/// One instance is built per process and injected at engine construction;
/// the caches live and die with the process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryConfig {
    pub overlay_by_mac: CacheConfig,
    pub overlay_by_ip: CacheConfig,
    pub underlay_by_node: CacheConfig,
    pub underlay_by_ip: CacheConfig,
}

impl DirectoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one cache configuration across all four indexes.
    pub fn with_all(config: CacheConfig) -> Self {
        Self {
            overlay_by_mac: config.clone(),
            overlay_by_ip: config.clone(),
            underlay_by_node: config.clone(),
            underlay_by_ip: config,
        }
    }
}
