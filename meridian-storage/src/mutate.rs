//! Write path: create, update, and remove directory mappings.
//!
//! Creates are unconditional create-or-replace; updates are read-modify-
//! write cycles guarded by the etag captured at the read, surfacing
//! `ConcurrentModification` when another writer races. The caller retries
//! the whole cycle; this engine never retries internally. Deletes are
//! unconditional: once a key is removed, any racing writer's state is
//! irrelevant.
//!
//! Each mutation also has a pure batch-descriptor form so callers can fuse
//! a primary write with its event-log entries into one atomic submission.

use std::net::IpAddr;
use std::sync::Arc;

use ipnetwork::IpNetwork;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use meridian_core::{
    canonical_ip, canonical_subnet, vnet_mac_ip_key, vnet_route_key, BatchOperation,
    BucketRegistry, Etag, LookupIndex, MacAddr, MeridianError, MeridianResult, OverlayMapping,
    StoreError, UnderlayMapping, VnetRouteMapping,
};

use crate::store::{PutOptions, StoreAdapter, StoredObject};

/// Fields for a new overlay mapping. `version` defaults to the registry's
/// schema version when absent.
#[derive(Debug, Clone)]
pub struct OverlayMappingParams {
    pub mac: MacAddr,
    pub ip: IpAddr,
    pub cn_id: Uuid,
    pub vnet_id: u32,
    pub router: bool,
    pub version: Option<u32>,
    pub deleted: bool,
}

/// Partial update of an overlay mapping. `ip` and `vnet_id` identify the
/// record; a supplied field wins, an absent field keeps the stored value.
/// Setting `deleted` to true is how a mapping is tombstoned.
#[derive(Debug, Clone)]
pub struct OverlayMappingUpdate {
    pub ip: IpAddr,
    pub vnet_id: u32,
    pub mac: Option<MacAddr>,
    pub cn_id: Option<Uuid>,
    pub router: Option<bool>,
    pub version: Option<u32>,
    pub deleted: Option<bool>,
}

/// Fields for a new underlay mapping.
#[derive(Debug, Clone)]
pub struct UnderlayMappingParams {
    pub cn_id: Uuid,
    pub ip: IpAddr,
    pub port: u16,
}

/// Partial update of an underlay mapping, keyed by node id.
#[derive(Debug, Clone)]
pub struct UnderlayMappingUpdate {
    pub cn_id: Uuid,
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
}

/// Fields for a new vnet route mapping.
#[derive(Debug, Clone)]
pub struct VnetRouteParams {
    pub vnet_id: u32,
    pub vlan_id: u16,
    pub subnet: IpNetwork,
    pub remote_vnet_id: u32,
    pub remote_vlan_id: u16,
    pub remote_subnet: IpNetwork,
    pub remote_dc_id: u32,
    pub remote_send_mac: MacAddr,
    pub version: Option<u32>,
    pub deleted: bool,
}

/// Partial update of a vnet route mapping. The four key fields identify the
/// record; everything else merges over the stored values.
#[derive(Debug, Clone)]
pub struct VnetRouteUpdate {
    pub vnet_id: u32,
    pub vlan_id: u16,
    pub subnet: IpNetwork,
    pub remote_subnet: IpNetwork,
    pub remote_vnet_id: Option<u32>,
    pub remote_vlan_id: Option<u16>,
    pub remote_dc_id: Option<u32>,
    pub remote_send_mac: Option<MacAddr>,
    pub version: Option<u32>,
    pub deleted: Option<bool>,
}

/// The mutation engine.
pub struct DirectoryWriter {
    store: Arc<dyn StoreAdapter>,
    buckets: BucketRegistry,
}

impl DirectoryWriter {
    pub fn new(store: Arc<dyn StoreAdapter>, buckets: BucketRegistry) -> Self {
        Self { store, buckets }
    }

    // ========================================================================
    // OVERLAY MAPPINGS
    // ========================================================================

    /// Write an overlay mapping at its canonical key, replacing whatever is
    /// there. The cache is not consulted; readers pick the record up on
    /// their next miss or TTL expiry.
    pub async fn create_overlay(
        &self,
        params: OverlayMappingParams,
    ) -> MeridianResult<OverlayMapping> {
        let record = self.overlay_record(params);
        let key = record.key();
        let value = encode(&self.buckets.overlay.name, &record)?;

        tracing::debug!(key = %key, vnet_id = record.vnet_id, "create overlay mapping");
        self.store
            .put(&self.buckets.overlay.name, &key, value, PutOptions::default())
            .await?;
        Ok(record)
    }

    /// Read-modify-write an overlay mapping under its etag.
    pub async fn update_overlay(
        &self,
        update: OverlayMappingUpdate,
    ) -> MeridianResult<OverlayMapping> {
        let bucket = self.buckets.overlay.name.clone();
        let key = vnet_mac_ip_key(update.ip, update.vnet_id);

        let obj = self
            .read_for_update(&bucket, &key, LookupIndex::OverlayIpVnet)
            .await?;
        let current: OverlayMapping = obj.decode(&bucket)?;

        let merged = OverlayMapping {
            mac: update.mac.unwrap_or(current.mac),
            ip: canonical_ip(update.ip),
            cn_id: update.cn_id.unwrap_or(current.cn_id),
            vnet_id: update.vnet_id,
            router: update.router.unwrap_or(current.router),
            version: update.version.unwrap_or(current.version),
            deleted: update.deleted.unwrap_or(current.deleted),
        };

        let value = encode(&bucket, &merged)?;
        self.guarded_put(&bucket, &key, value, obj.etag).await?;
        Ok(merged)
    }

    /// Delete the record at the canonical (ip, vnet) key outright. No etag
    /// guard: a removal stands regardless of concurrent writers.
    pub async fn remove_overlay(&self, ip: IpAddr, vnet_id: u32) -> MeridianResult<()> {
        let key = vnet_mac_ip_key(ip, vnet_id);
        tracing::debug!(key = %key, "remove overlay mapping");
        self.delete(&self.buckets.overlay.name, &key, LookupIndex::OverlayIpVnet)
            .await
    }

    /// Pure descriptor form of [`create_overlay`](Self::create_overlay) for
    /// atomic composition with event-log entries.
    pub fn overlay_batch(&self, params: OverlayMappingParams) -> MeridianResult<BatchOperation> {
        let record = self.overlay_record(params);
        let value = encode(&self.buckets.overlay.name, &record)?;
        Ok(BatchOperation::put(
            self.buckets.overlay.name.clone(),
            record.key(),
            value,
        ))
    }

    // ========================================================================
    // UNDERLAY MAPPINGS
    // ========================================================================

    /// Write an underlay mapping keyed by compute-node id.
    pub async fn create_underlay(
        &self,
        params: UnderlayMappingParams,
    ) -> MeridianResult<UnderlayMapping> {
        let record = underlay_record(params);
        let key = record.key();
        let value = encode(&self.buckets.underlay.name, &record)?;

        tracing::debug!(cn_id = %record.cn_id, "create underlay mapping");
        self.store
            .put(&self.buckets.underlay.name, &key, value, PutOptions::default())
            .await?;
        Ok(record)
    }

    /// Read-modify-write an underlay mapping under its etag.
    pub async fn update_underlay(
        &self,
        update: UnderlayMappingUpdate,
    ) -> MeridianResult<UnderlayMapping> {
        let bucket = self.buckets.underlay.name.clone();
        let key = update.cn_id.to_string();

        let obj = self
            .read_for_update(&bucket, &key, LookupIndex::UnderlayNode)
            .await?;
        let current: UnderlayMapping = obj.decode(&bucket)?;

        let merged = UnderlayMapping {
            cn_id: update.cn_id,
            ip: update.ip.map(canonical_ip).unwrap_or(current.ip),
            port: update.port.unwrap_or(current.port),
        };

        let value = encode(&bucket, &merged)?;
        self.guarded_put(&bucket, &key, value, obj.etag).await?;
        Ok(merged)
    }

    /// Hard-delete a node's underlay mapping.
    pub async fn remove_underlay(&self, cn_id: Uuid) -> MeridianResult<()> {
        tracing::debug!(cn_id = %cn_id, "remove underlay mapping");
        self.delete(
            &self.buckets.underlay.name,
            &cn_id.to_string(),
            LookupIndex::UnderlayNode,
        )
        .await
    }

    /// Pure descriptor form of [`create_underlay`](Self::create_underlay).
    pub fn underlay_batch(&self, params: UnderlayMappingParams) -> MeridianResult<BatchOperation> {
        let record = underlay_record(params);
        let value = encode(&self.buckets.underlay.name, &record)?;
        Ok(BatchOperation::put(
            self.buckets.underlay.name.clone(),
            record.key(),
            value,
        ))
    }

    /// Pure descriptor deleting a node's underlay mapping.
    pub fn underlay_delete_batch(&self, cn_id: Uuid) -> BatchOperation {
        BatchOperation::delete(self.buckets.underlay.name.clone(), cn_id.to_string())
    }

    // ========================================================================
    // VNET ROUTE MAPPINGS
    // ========================================================================

    /// Write a vnet route mapping at its canonical key.
    pub async fn create_route(&self, params: VnetRouteParams) -> MeridianResult<VnetRouteMapping> {
        let record = self.route_record(params)?;
        let key = record.key()?;
        let value = encode(&self.buckets.routes.name, &record)?;

        tracing::debug!(key = %key, "create vnet route");
        self.store
            .put(&self.buckets.routes.name, &key, value, PutOptions::default())
            .await?;
        Ok(record)
    }

    /// Read-modify-write a vnet route mapping under its etag.
    pub async fn update_route(&self, update: VnetRouteUpdate) -> MeridianResult<VnetRouteMapping> {
        let bucket = self.buckets.routes.name.clone();
        let key = vnet_route_key(
            update.vnet_id,
            update.vlan_id,
            update.subnet,
            update.remote_subnet,
        )?;

        let obj = self
            .read_for_update(&bucket, &key, LookupIndex::VnetRoute)
            .await?;
        let current: VnetRouteMapping = obj.decode(&bucket)?;

        let merged = VnetRouteMapping {
            vnet_id: update.vnet_id,
            vlan_id: update.vlan_id,
            subnet: canonical_subnet(update.subnet)?,
            remote_vnet_id: update.remote_vnet_id.unwrap_or(current.remote_vnet_id),
            remote_vlan_id: update.remote_vlan_id.unwrap_or(current.remote_vlan_id),
            remote_subnet: canonical_subnet(update.remote_subnet)?,
            remote_dc_id: update.remote_dc_id.unwrap_or(current.remote_dc_id),
            remote_send_mac: update.remote_send_mac.unwrap_or(current.remote_send_mac),
            version: update.version.unwrap_or(current.version),
            deleted: update.deleted.unwrap_or(current.deleted),
        };

        let value = encode(&bucket, &merged)?;
        self.guarded_put(&bucket, &key, value, obj.etag).await?;
        Ok(merged)
    }

    /// Delete a vnet route mapping outright.
    pub async fn remove_route(
        &self,
        vnet_id: u32,
        vlan_id: u16,
        subnet: IpNetwork,
        remote_subnet: IpNetwork,
    ) -> MeridianResult<()> {
        let key = vnet_route_key(vnet_id, vlan_id, subnet, remote_subnet)?;
        tracing::debug!(key = %key, "remove vnet route");
        self.delete(&self.buckets.routes.name, &key, LookupIndex::VnetRoute)
            .await
    }

    /// Pure descriptor form of [`create_route`](Self::create_route).
    pub fn route_batch(&self, params: VnetRouteParams) -> MeridianResult<BatchOperation> {
        let record = self.route_record(params)?;
        let key = record.key()?;
        let value = encode(&self.buckets.routes.name, &record)?;
        Ok(BatchOperation::put(
            self.buckets.routes.name.clone(),
            key,
            value,
        ))
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn overlay_record(&self, params: OverlayMappingParams) -> OverlayMapping {
        OverlayMapping {
            mac: params.mac,
            ip: canonical_ip(params.ip),
            cn_id: params.cn_id,
            vnet_id: params.vnet_id,
            router: params.router,
            version: params.version.unwrap_or(self.buckets.schema_version),
            deleted: params.deleted,
        }
    }

    fn route_record(&self, params: VnetRouteParams) -> MeridianResult<VnetRouteMapping> {
        Ok(VnetRouteMapping {
            vnet_id: params.vnet_id,
            vlan_id: params.vlan_id,
            subnet: canonical_subnet(params.subnet)?,
            remote_vnet_id: params.remote_vnet_id,
            remote_vlan_id: params.remote_vlan_id,
            remote_subnet: canonical_subnet(params.remote_subnet)?,
            remote_dc_id: params.remote_dc_id,
            remote_send_mac: params.remote_send_mac,
            version: params.version.unwrap_or(self.buckets.schema_version),
            deleted: params.deleted,
        })
    }

    async fn read_for_update(
        &self,
        bucket: &str,
        key: &str,
        index: LookupIndex,
    ) -> MeridianResult<StoredObject> {
        match self.store.get(bucket, key).await {
            Ok(obj) => Ok(obj),
            Err(StoreError::NotFound { .. }) => Err(MeridianError::NotFound { index }),
            Err(e) => Err(e.into()),
        }
    }

    async fn guarded_put(
        &self,
        bucket: &str,
        key: &str,
        value: Value,
        etag: Etag,
    ) -> MeridianResult<()> {
        match self
            .store
            .put(bucket, key, value, PutOptions::guarded(etag))
            .await
        {
            Ok(()) => Ok(()),
            Err(StoreError::EtagMismatch { .. }) => {
                tracing::debug!(bucket, key, "etag precondition failed");
                Err(MeridianError::ConcurrentModification {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, bucket: &str, key: &str, index: LookupIndex) -> MeridianResult<()> {
        match self.store.delete(bucket, key).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound { .. }) => Err(MeridianError::NotFound { index }),
            Err(e) => Err(e.into()),
        }
    }
}

fn underlay_record(params: UnderlayMappingParams) -> UnderlayMapping {
    UnderlayMapping {
        cn_id: params.cn_id,
        ip: canonical_ip(params.ip),
        port: params.port,
    }
}

fn encode<T: Serialize>(bucket: &str, record: &T) -> Result<Value, StoreError> {
    serde_json::to_value(record).map_err(|e| StoreError::BadRecord {
        bucket: bucket.to_string(),
        reason: e.to_string(),
    })
}
