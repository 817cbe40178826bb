//! Read path: cache-or-store resolution for directory lookups.
//!
//! The reader consults its per-index caches first, falls back to the store
//! adapter, filters tombstones at this boundary so callers never see
//! "deleted" as a state, and classifies not-found against multiple-match
//! anomalies. It never retries and never caches a negative result.

use std::net::IpAddr;
use std::sync::Arc;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use uuid::Uuid;

use meridian_core::{
    canonical_ip, vnet_mac_ip_key, BucketRegistry, EventLogEntry, LookupIndex, MacAddr,
    MeridianError, MeridianResult, OverlayMapping, StoreError, UnderlayMapping,
};

use crate::cache::DirectoryCaches;
use crate::store::{Filter, FindOptions, Sort, StoreAdapter};

/// Default cap on one event-log fetch.
pub const DEFAULT_EVENT_LOG_LIMIT: usize = 128;

/// Per-lookup options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupOptions {
    /// Skip the cache and consult the store directly. A successful bypass
    /// still refreshes the cache for subsequent reads.
    pub bypass_cache: bool,
}

impl LookupOptions {
    pub fn bypass() -> Self {
        Self { bypass_cache: true }
    }
}

/// Options for an event-log fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventLogOptions {
    /// Never return more than this many entries; fewer is fine.
    pub limit: usize,
}

impl Default for EventLogOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_EVENT_LOG_LIMIT,
        }
    }
}

impl EventLogOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self { limit }
    }
}

/// A lazy, non-restartable sequence of decoded records backed by a store
/// scan. Callers see records as they stream, not as one materialized batch.
pub type MappingStream<T> = BoxStream<'static, MeridianResult<T>>;

/// The lookup engine.
pub struct DirectoryReader {
    store: Arc<dyn StoreAdapter>,
    caches: Arc<DirectoryCaches>,
    buckets: BucketRegistry,
}

impl DirectoryReader {
    pub fn new(
        store: Arc<dyn StoreAdapter>,
        caches: Arc<DirectoryCaches>,
        buckets: BucketRegistry,
    ) -> Self {
        Self {
            store,
            caches,
            buckets,
        }
    }

    /// The caches this reader feeds; exposed for inspection and stats.
    pub fn caches(&self) -> &DirectoryCaches {
        &self.caches
    }

    /// Resolve a compute node's underlay address by node id.
    pub async fn underlay_by_node(
        &self,
        cn_id: Uuid,
        opts: LookupOptions,
    ) -> MeridianResult<UnderlayMapping> {
        let cache_key = cn_id.to_string();
        if !opts.bypass_cache {
            if let Some(mapping) = self.caches.underlay_by_node.get(&cache_key) {
                return Ok(mapping);
            }
        }

        let bucket = &self.buckets.underlay.name;
        let obj = match self.store.get(bucket, &cache_key).await {
            Ok(obj) => obj,
            Err(StoreError::NotFound { .. }) => {
                return Err(MeridianError::NotFound {
                    index: LookupIndex::UnderlayNode,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mapping: UnderlayMapping = obj.decode(bucket)?;
        self.cache_underlay(&mapping);
        Ok(mapping)
    }

    /// Resolve an underlay mapping by its physical address.
    ///
    /// This is a secondary-index scan; the point caches are never consulted.
    /// The ip must be unique across live records; more than one match is a
    /// data-integrity fault, reported as `MultipleMatches` and never
    /// repaired here.
    pub async fn underlay_by_ip(&self, ip: IpAddr) -> MeridianResult<UnderlayMapping> {
        let ip = canonical_ip(ip);
        let bucket = self.buckets.underlay.name.clone();
        let filter = Filter::field("ip", ip.to_string());

        let mut stream = self
            .store
            .find(&bucket, filter, FindOptions::default())
            .await?;

        let mut matches: Vec<UnderlayMapping> = Vec::new();
        while let Some(obj) = stream.next().await {
            matches.push(obj?.decode(&bucket)?);
        }

        match matches.len() {
            0 => Err(MeridianError::NotFound {
                index: LookupIndex::UnderlayIp,
            }),
            1 => {
                let mapping = matches.remove(0);
                self.cache_underlay(&mapping);
                Ok(mapping)
            }
            count => {
                tracing::warn!(ip = %ip, count, "underlay ip index is not unique");
                Err(MeridianError::MultipleMatches {
                    index: LookupIndex::UnderlayIp,
                    count,
                })
            }
        }
    }

    /// Resolve an overlay mapping by (mac, vnet).
    ///
    /// The store does not guarantee a single live record for the pair, so
    /// the last live record observed on the scan wins; tombstones are
    /// skipped while streaming.
    pub async fn overlay_by_mac_vnet(
        &self,
        mac: MacAddr,
        vnet_id: u32,
        opts: LookupOptions,
    ) -> MeridianResult<OverlayMapping> {
        let cache_key = format!("{mac},{vnet_id}");
        if !opts.bypass_cache {
            if let Some(mapping) = self.caches.overlay_by_mac.get(&cache_key) {
                return Ok(mapping);
            }
        }

        let bucket = self.buckets.overlay.name.clone();
        let filter = Filter::field("mac", mac.to_u64()).and("vnet_id", vnet_id);
        let mut stream = self
            .store
            .find(&bucket, filter, FindOptions::default())
            .await?;

        let mut found: Option<OverlayMapping> = None;
        while let Some(obj) = stream.next().await {
            let mapping: OverlayMapping = obj?.decode(&bucket)?;
            if mapping.deleted {
                continue;
            }
            found = Some(mapping);
        }

        let mapping = found.ok_or(MeridianError::NotFound {
            index: LookupIndex::OverlayMacVnet,
        })?;
        self.caches.overlay_by_mac.put(cache_key, mapping.clone());
        Ok(mapping)
    }

    /// Resolve an overlay mapping by its canonical (ip, vnet) key.
    pub async fn overlay_by_ip_vnet(
        &self,
        ip: IpAddr,
        vnet_id: u32,
        opts: LookupOptions,
    ) -> MeridianResult<OverlayMapping> {
        let key = vnet_mac_ip_key(ip, vnet_id);
        if !opts.bypass_cache {
            if let Some(mapping) = self.caches.overlay_by_ip.get(&key) {
                return Ok(mapping);
            }
        }

        let bucket = &self.buckets.overlay.name;
        let obj = match self.store.get(bucket, &key).await {
            Ok(obj) => obj,
            Err(StoreError::NotFound { .. }) => {
                return Err(MeridianError::NotFound {
                    index: LookupIndex::OverlayIpVnet,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mapping: OverlayMapping = obj.decode(bucket)?;
        if mapping.deleted {
            // A tombstone at the key is an absence, not a result.
            return Err(MeridianError::NotFound {
                index: LookupIndex::OverlayIpVnet,
            });
        }

        self.caches.overlay_by_ip.put(key, mapping.clone());
        Ok(mapping)
    }

    /// Stream every live overlay mapping in a vnet. An empty stream is
    /// success, not an error.
    pub async fn overlay_mappings_in_vnet(
        &self,
        vnet_id: u32,
    ) -> MeridianResult<MappingStream<OverlayMapping>> {
        let bucket = self.buckets.overlay.name.clone();
        let stream = self
            .store
            .find(
                &bucket,
                Filter::field("vnet_id", vnet_id),
                FindOptions::default(),
            )
            .await?;

        let mapped = stream
            .map(move |item| -> MeridianResult<Option<OverlayMapping>> {
                let mapping: OverlayMapping = item?.decode(&bucket)?;
                Ok((!mapping.deleted).then_some(mapping))
            })
            .filter_map(|result| async move {
                match result {
                    Ok(Some(mapping)) => Some(Ok(mapping)),
                    Ok(None) => None,
                    Err(e) => Some(Err(e)),
                }
            });

        Ok(Box::pin(mapped))
    }

    /// Stream pending event-log entries addressed to one compute node,
    /// oldest first, bounded by `opts.limit`.
    pub async fn event_log(
        &self,
        cn_id: Uuid,
        opts: EventLogOptions,
    ) -> MeridianResult<MappingStream<EventLogEntry>> {
        let bucket = self.buckets.events.name.clone();
        let find = FindOptions::default()
            .with_limit(opts.limit)
            .with_sort(Sort::mtime_ascending());

        let stream = self
            .store
            .find(&bucket, Filter::field("cn_id", cn_id.to_string()), find)
            .await?;

        let mapped = stream
            .take(opts.limit)
            .map(move |item| -> MeridianResult<EventLogEntry> {
                let entry = item?.decode(&bucket)?;
                Ok(entry)
            });

        Ok(Box::pin(mapped))
    }

    fn cache_underlay(&self, mapping: &UnderlayMapping) {
        self.caches
            .underlay_by_node
            .put(mapping.cn_id.to_string(), mapping.clone());
        self.caches
            .underlay_by_ip
            .put(canonical_ip(mapping.ip).to_string(), mapping.clone());
    }
}
