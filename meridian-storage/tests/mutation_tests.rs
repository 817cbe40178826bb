//! Integration tests for the mutation engine
//!
//! Tests verify:
//! - Create-or-replace writes and version defaulting
//! - Read-modify-write merge semantics (supplied wins, absent keeps)
//! - The etag compare-and-swap: a raced update fails, never overwrites
//! - Unconditional deletes and tombstoning via update
//! - Batch composition of a primary mutation with shootdown entries

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use uuid::Uuid;

use meridian_core::{
    BatchOperation, BucketRegistry, LookupIndex, MacAddr, MeridianError, StoreError,
};
use meridian_events::EventLogBuilder;
use meridian_storage::{
    DirectoryCaches, DirectoryReader, DirectoryWriter, EventLogOptions, Filter, FindOptions,
    LookupOptions, MemoryStore, OverlayMappingParams, OverlayMappingUpdate, PutOptions,
    RecordStream, StoreAdapter, StoredObject, UnderlayMappingParams, UnderlayMappingUpdate,
    VnetRouteParams, VnetRouteUpdate,
};

// ============================================================================
// TEST SUPPORT
// ============================================================================

/// Store wrapper that simulates a racing writer: immediately after the
/// first point read, it rewrites the object so the reader's etag goes
/// stale before the read-modify-write completes.
struct RacingStore {
    inner: MemoryStore,
    raced: AtomicBool,
}

impl RacingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            raced: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StoreAdapter for RacingStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        let obj = self.inner.get(bucket, key).await?;
        if !self.raced.swap(true, Ordering::SeqCst) {
            // The interfering writer lands between our read and our write.
            self.inner
                .put(bucket, key, obj.value.clone(), PutOptions::default())
                .await?;
        }
        Ok(obj)
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        value: Value,
        opts: PutOptions,
    ) -> Result<(), StoreError> {
        self.inner.put(bucket, key, value, opts).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.inner.delete(bucket, key).await
    }

    async fn find(
        &self,
        bucket: &str,
        filter: Filter,
        opts: FindOptions,
    ) -> Result<RecordStream, StoreError> {
        self.inner.find(bucket, filter, opts).await
    }

    async fn batch(&self, ops: Vec<BatchOperation>) -> Result<(), StoreError> {
        self.inner.batch(ops).await
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    reader: DirectoryReader,
    writer: DirectoryWriter,
    buckets: BucketRegistry,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let buckets = BucketRegistry::default();
    Harness {
        store: Arc::clone(&store),
        reader: DirectoryReader::new(
            store.clone(),
            Arc::new(DirectoryCaches::with_defaults()),
            buckets.clone(),
        ),
        writer: DirectoryWriter::new(store, buckets.clone()),
        buckets,
    }
}

fn mac(last: u8) -> MacAddr {
    MacAddr::from([0x02, 0x08, 0x20, 0x00, 0x00, last])
}

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn overlay_params(seed: u8, vnet_id: u32) -> OverlayMappingParams {
    OverlayMappingParams {
        mac: mac(seed),
        ip: ip(&format!("10.0.0.{seed}")),
        cn_id: Uuid::from_u128(u128::from(seed)),
        vnet_id,
        router: false,
        version: None,
        deleted: false,
    }
}

fn route_params() -> VnetRouteParams {
    VnetRouteParams {
        vnet_id: 5,
        vlan_id: 100,
        subnet: "10.0.1.0/24".parse().unwrap(),
        remote_vnet_id: 6,
        remote_vlan_id: 200,
        remote_subnet: "192.168.0.0/16".parse().unwrap(),
        remote_dc_id: 1,
        remote_send_mac: mac(0xEE),
        version: None,
        deleted: false,
    }
}

// ============================================================================
// CREATE
// ============================================================================

#[tokio::test]
async fn test_create_defaults_version_to_schema() {
    let h = harness();
    let created = h.writer.create_overlay(overlay_params(1, 42)).await.unwrap();
    assert_eq!(created.version, h.buckets.schema_version);

    let pinned = h
        .writer
        .create_overlay(OverlayMappingParams {
            version: Some(7),
            ..overlay_params(2, 42)
        })
        .await
        .unwrap();
    assert_eq!(pinned.version, 7);
}

#[tokio::test]
async fn test_create_replaces_existing_record() {
    let h = harness();
    h.writer.create_overlay(overlay_params(3, 42)).await.unwrap();

    // Same (ip, vnet) key, different compute node: create wins outright.
    let replacement = h
        .writer
        .create_overlay(OverlayMappingParams {
            cn_id: Uuid::from_u128(77),
            ..overlay_params(3, 42)
        })
        .await
        .unwrap();

    let found = h
        .reader
        .overlay_by_ip_vnet(ip("10.0.0.3"), 42, LookupOptions::bypass())
        .await
        .unwrap();
    assert_eq!(found, replacement);
}

#[tokio::test]
async fn test_create_canonicalizes_address() {
    let h = harness();
    let created = h
        .writer
        .create_overlay(OverlayMappingParams {
            ip: ip("::ffff:10.0.0.4"),
            ..overlay_params(4, 42)
        })
        .await
        .unwrap();
    assert_eq!(created.ip, ip("10.0.0.4"));
    assert_eq!(created.key(), "10.0.0.4,42");
}

// ============================================================================
// UPDATE (READ-MODIFY-WRITE)
// ============================================================================

#[tokio::test]
async fn test_update_merges_supplied_over_stored() {
    let h = harness();
    let original = h.writer.create_overlay(overlay_params(5, 42)).await.unwrap();

    let new_node = Uuid::from_u128(55);
    let updated = h
        .writer
        .update_overlay(OverlayMappingUpdate {
            ip: original.ip,
            vnet_id: original.vnet_id,
            mac: None,
            cn_id: Some(new_node),
            router: None,
            version: None,
            deleted: None,
        })
        .await
        .unwrap();

    // Supplied field won; absent fields kept their stored values.
    assert_eq!(updated.cn_id, new_node);
    assert_eq!(updated.mac, original.mac);
    assert_eq!(updated.router, original.router);
    assert_eq!(updated.version, original.version);
    assert!(!updated.deleted);
}

#[tokio::test]
async fn test_update_missing_record_is_not_found() {
    let h = harness();
    let err = h
        .writer
        .update_overlay(OverlayMappingUpdate {
            ip: ip("10.255.0.1"),
            vnet_id: 42,
            mac: None,
            cn_id: None,
            router: None,
            version: None,
            deleted: None,
        })
        .await
        .unwrap_err();
    assert_eq!(
        err,
        MeridianError::NotFound {
            index: LookupIndex::OverlayIpVnet
        }
    );
}

#[tokio::test]
async fn test_raced_update_fails_with_concurrent_modification() {
    let store = Arc::new(RacingStore::new());
    let buckets = BucketRegistry::default();
    let writer = DirectoryWriter::new(store.clone(), buckets.clone());

    // Seed directly through the inner adapter so the race flag stays unset.
    writer.create_overlay(overlay_params(6, 42)).await.unwrap();

    // The racing writer wins; this read-modify-write must lose loudly.
    let err = writer
        .update_overlay(OverlayMappingUpdate {
            ip: ip("10.0.0.6"),
            vnet_id: 42,
            mac: None,
            cn_id: Some(Uuid::from_u128(66)),
            router: None,
            version: None,
            deleted: None,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, MeridianError::ConcurrentModification { .. }));

    // The interfering write survived untouched.
    let obj = store
        .get(&buckets.overlay.name, "10.0.0.6,42")
        .await
        .unwrap();
    assert_eq!(obj.value["cn_id"], Uuid::from_u128(6).to_string());
}

#[tokio::test]
async fn test_tombstone_via_update_retains_record() {
    let h = harness();
    let created = h.writer.create_overlay(overlay_params(7, 42)).await.unwrap();

    h.writer
        .update_overlay(OverlayMappingUpdate {
            ip: created.ip,
            vnet_id: created.vnet_id,
            mac: None,
            cn_id: None,
            router: None,
            version: None,
            deleted: Some(true),
        })
        .await
        .unwrap();

    // Logically absent...
    let err = h
        .reader
        .overlay_by_ip_vnet(created.ip, created.vnet_id, LookupOptions::bypass())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        MeridianError::NotFound {
            index: LookupIndex::OverlayIpVnet
        }
    );

    // ...but physically retained until externally reaped.
    let obj = h
        .store
        .get(&h.buckets.overlay.name, &created.key())
        .await
        .unwrap();
    assert_eq!(obj.value["deleted"], true);
}

// ============================================================================
// REMOVE
// ============================================================================

#[tokio::test]
async fn test_remove_overlay_deletes_outright() {
    let h = harness();
    let created = h.writer.create_overlay(overlay_params(8, 42)).await.unwrap();

    h.writer.remove_overlay(created.ip, created.vnet_id).await.unwrap();

    let gone = h.store.get(&h.buckets.overlay.name, &created.key()).await;
    assert!(matches!(gone, Err(StoreError::NotFound { .. })));
}

#[tokio::test]
async fn test_remove_missing_overlay_is_not_found() {
    let h = harness();
    let err = h.writer.remove_overlay(ip("10.254.0.1"), 42).await.unwrap_err();
    assert_eq!(
        err,
        MeridianError::NotFound {
            index: LookupIndex::OverlayIpVnet
        }
    );
}

// ============================================================================
// UNDERLAY MAPPINGS
// ============================================================================

#[tokio::test]
async fn test_underlay_update_and_hard_delete() {
    let h = harness();
    let cn_id = Uuid::from_u128(9);
    h.writer
        .create_underlay(UnderlayMappingParams {
            cn_id,
            ip: ip("172.16.0.9"),
            port: 4789,
        })
        .await
        .unwrap();

    let updated = h
        .writer
        .update_underlay(UnderlayMappingUpdate {
            cn_id,
            ip: None,
            port: Some(4790),
        })
        .await
        .unwrap();
    assert_eq!(updated.port, 4790);
    assert_eq!(updated.ip, ip("172.16.0.9"));

    h.writer.remove_underlay(cn_id).await.unwrap();
    let gone = h
        .store
        .get(&h.buckets.underlay.name, &cn_id.to_string())
        .await;
    assert!(matches!(gone, Err(StoreError::NotFound { .. })));
}

// ============================================================================
// VNET ROUTES
// ============================================================================

#[tokio::test]
async fn test_route_create_update_remove_cycle() {
    let h = harness();
    let created = h.writer.create_route(route_params()).await.unwrap();
    assert_eq!(created.version, h.buckets.schema_version);

    let updated = h
        .writer
        .update_route(VnetRouteUpdate {
            vnet_id: created.vnet_id,
            vlan_id: created.vlan_id,
            subnet: created.subnet,
            remote_subnet: created.remote_subnet,
            remote_vnet_id: None,
            remote_vlan_id: None,
            remote_dc_id: Some(3),
            remote_send_mac: None,
            version: None,
            deleted: None,
        })
        .await
        .unwrap();
    assert_eq!(updated.remote_dc_id, 3);
    assert_eq!(updated.remote_send_mac, created.remote_send_mac);

    h.writer
        .remove_route(
            created.vnet_id,
            created.vlan_id,
            created.subnet,
            created.remote_subnet,
        )
        .await
        .unwrap();
    let gone = h
        .store
        .get(&h.buckets.routes.name, &created.key().unwrap())
        .await;
    assert!(matches!(gone, Err(StoreError::NotFound { .. })));
}

// ============================================================================
// BATCH COMPOSITION
// ============================================================================

#[tokio::test]
async fn test_mutation_and_shootdowns_apply_atomically() {
    let h = harness();
    let builder = EventLogBuilder::new(&h.buckets);
    let nodes = vec![Uuid::from_u128(21), Uuid::from_u128(22)];

    let params = overlay_params(10, 42);
    let mut ops = vec![h.writer.overlay_batch(params.clone()).unwrap()];
    ops.extend(
        builder
            .vl3_batch(42, params.ip, params.mac, 7, &nodes, None)
            .unwrap(),
    );
    h.store.batch(ops).await.unwrap();

    // Primary record landed.
    let found = h
        .reader
        .overlay_by_ip_vnet(params.ip, 42, LookupOptions::bypass())
        .await
        .unwrap();
    assert_eq!(found.mac, params.mac);

    // Every target node got exactly one pending entry.
    for node in &nodes {
        let stream = h
            .reader
            .event_log(*node, EventLogOptions::default())
            .await
            .unwrap();
        let entries: Vec<_> = stream
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].cn_id, *node);
    }
}

#[tokio::test]
async fn test_consumed_entry_delete_batch_empties_log() {
    let h = harness();
    let builder = EventLogBuilder::new(&h.buckets);
    let node = Uuid::from_u128(30);

    let ops = builder
        .vl2_batch(42, mac(11), std::slice::from_ref(&node), None)
        .unwrap();
    h.store.batch(ops).await.unwrap();

    let stream = h.reader.event_log(node, EventLogOptions::default()).await.unwrap();
    let entries: Vec<_> = stream
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(entries.len(), 1);

    // Consumer acknowledges: the entry disappears by id.
    h.store
        .batch(vec![builder.delete_batch(entries[0].id)])
        .await
        .unwrap();

    let stream = h.reader.event_log(node, EventLogOptions::default()).await.unwrap();
    assert_eq!(stream.collect::<Vec<_>>().await.len(), 0);
}
