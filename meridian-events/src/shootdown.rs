//! Shootdown event construction.
//!
//! Every batch method returns put descriptors only; no I/O happens here.
//! The caller fuses them with the primary mutation and submits the combined
//! batch atomically, so remote agents never observe a mapping change
//! without its notifications (or vice versa).
//!
//! Suppression is a correctness requirement, not an optimization: consumers
//! treat every entry as "something changed, re-resolve", so an entry for an
//! unchanged mapping would trigger pointless invalidation storms.

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde_json::Value;
use uuid::Uuid;

use meridian_core::{
    canonical_ip, canonical_subnet, BatchOperation, BucketRegistry, EventLogEntry, EventPayload,
    MacAddr, MeridianResult, OverlayMapping, StoreError,
};

/// Endpoints of a changed vnet route, as handed to
/// [`EventLogBuilder::route_batch`].
#[derive(Debug, Clone)]
pub struct RouteEventParams {
    pub src_vnet_id: u32,
    pub dst_vnet_id: u32,
    pub src_vlan_id: u16,
    pub dst_vlan_id: u16,
    pub src_subnet: IpNetwork,
    pub dst_subnet: IpNetwork,
    pub dc_id: u32,
}

/// Builds uniquely-keyed, idempotent change notifications for remote
/// agents. Entries are addressed only by their freshly generated id; the
/// producer creates and deletes them, never updates one.
pub struct EventLogBuilder {
    bucket: String,
    version: u32,
}

impl EventLogBuilder {
    pub fn new(registry: &BucketRegistry) -> Self {
        Self {
            bucket: registry.events.name.clone(),
            version: registry.schema_version,
        }
    }

    /// One VL2 shootdown per target node.
    ///
    /// Returns an empty batch when `existing` already carries the new mac:
    /// nothing observable changed, so nobody gets told to re-resolve.
    pub fn vl2_batch(
        &self,
        vnet_id: u32,
        mac: MacAddr,
        targets: &[Uuid],
        existing: Option<&OverlayMapping>,
    ) -> MeridianResult<Vec<BatchOperation>> {
        if let Some(previous) = existing {
            if previous.mac == mac {
                return Ok(Vec::new());
            }
        }

        targets
            .iter()
            .map(|cn_id| {
                self.put_entry(*cn_id, vnet_id, EventPayload::Vl2 { mac, vnet_id })
            })
            .collect()
    }

    /// One VL3 shootdown per target node.
    ///
    /// Suppressed only when both the mac and the ip are unchanged from
    /// `existing`.
    pub fn vl3_batch(
        &self,
        vnet_id: u32,
        ip: IpAddr,
        mac: MacAddr,
        vlan_id: u16,
        targets: &[Uuid],
        existing: Option<&OverlayMapping>,
    ) -> MeridianResult<Vec<BatchOperation>> {
        let ip = canonical_ip(ip);
        if let Some(previous) = existing {
            if previous.mac == mac && canonical_ip(previous.ip) == ip {
                return Ok(Vec::new());
            }
        }

        targets
            .iter()
            .map(|cn_id| {
                self.put_entry(
                    *cn_id,
                    vnet_id,
                    EventPayload::Vl3 {
                        ip,
                        mac,
                        vlan_id,
                        vnet_id,
                    },
                )
            })
            .collect()
    }

    /// One route shootdown per target node. Each payload carries both
    /// endpoints' canonical network address with the prefix length split
    /// out of the CIDR notation.
    pub fn route_batch(
        &self,
        params: &RouteEventParams,
        targets: &[Uuid],
    ) -> MeridianResult<Vec<BatchOperation>> {
        let src = canonical_subnet(params.src_subnet)?;
        let dst = canonical_subnet(params.dst_subnet)?;

        targets
            .iter()
            .map(|cn_id| {
                self.put_entry(
                    *cn_id,
                    params.src_vnet_id,
                    EventPayload::Route {
                        src_vnet_id: params.src_vnet_id,
                        dst_vnet_id: params.dst_vnet_id,
                        src_vlan_id: params.src_vlan_id,
                        dst_vlan_id: params.dst_vlan_id,
                        src_ip: src.network(),
                        src_prefix_len: src.prefix(),
                        dst_ip: dst.network(),
                        dst_prefix_len: dst.prefix(),
                        dc_id: params.dc_id,
                    },
                )
            })
            .collect()
    }

    /// Descriptor removing a consumed entry, for the consumer's
    /// acknowledgement path.
    pub fn delete_batch(&self, id: Uuid) -> BatchOperation {
        BatchOperation::delete(self.bucket.clone(), id.to_string())
    }

    fn put_entry(
        &self,
        cn_id: Uuid,
        vnet_id: u32,
        payload: EventPayload,
    ) -> MeridianResult<BatchOperation> {
        let entry = EventLogEntry {
            id: Uuid::now_v7(),
            cn_id,
            vnet_id,
            version: self.version,
            payload,
        };
        let value = encode(&self.bucket, &entry)?;
        Ok(BatchOperation::put(
            self.bucket.clone(),
            entry.id.to_string(),
            value,
        ))
    }
}

fn encode(bucket: &str, entry: &EventLogEntry) -> Result<Value, StoreError> {
    serde_json::to_value(entry).map_err(|e| StoreError::BadRecord {
        bucket: bucket.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::BatchOp;
    use std::collections::HashSet;

    fn builder() -> EventLogBuilder {
        EventLogBuilder::new(&BucketRegistry::default())
    }

    fn mac(last: u8) -> MacAddr {
        MacAddr::from([0x00, 0x11, 0x22, 0x33, 0x44, last])
    }

    fn existing_mapping(m: MacAddr, ip: &str) -> OverlayMapping {
        OverlayMapping {
            mac: m,
            ip: ip.parse().unwrap(),
            cn_id: Uuid::nil(),
            vnet_id: 44,
            router: false,
            version: 1,
            deleted: false,
        }
    }

    fn targets(n: usize) -> Vec<Uuid> {
        (0..n).map(|_| Uuid::now_v7()).collect()
    }

    #[test]
    fn test_vl2_suppressed_when_mac_unchanged() {
        let existing = existing_mapping(mac(0x55), "10.0.0.5");
        let batch = builder()
            .vl2_batch(44, mac(0x55), &targets(3), Some(&existing))
            .unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_vl2_one_entry_per_target_with_distinct_ids() {
        let existing = existing_mapping(mac(0x55), "10.0.0.5");
        let nodes = targets(3);
        let batch = builder()
            .vl2_batch(44, mac(0x56), &nodes, Some(&existing))
            .unwrap();

        assert_eq!(batch.len(), nodes.len());
        let ids: HashSet<&str> = batch.iter().map(|op| op.key.as_str()).collect();
        assert_eq!(ids.len(), nodes.len());
    }

    #[test]
    fn test_vl2_without_existing_record_always_emits() {
        let batch = builder().vl2_batch(44, mac(0x55), &targets(2), None).unwrap();
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn test_vl3_suppressed_only_when_mac_and_ip_unchanged() {
        let b = builder();
        let existing = existing_mapping(mac(0x55), "10.0.0.5");
        let nodes = targets(2);

        let unchanged = b
            .vl3_batch(44, "10.0.0.5".parse().unwrap(), mac(0x55), 7, &nodes, Some(&existing))
            .unwrap();
        assert!(unchanged.is_empty());

        let moved_ip = b
            .vl3_batch(44, "10.0.0.6".parse().unwrap(), mac(0x55), 7, &nodes, Some(&existing))
            .unwrap();
        assert_eq!(moved_ip.len(), 2);

        let moved_mac = b
            .vl3_batch(44, "10.0.0.5".parse().unwrap(), mac(0x56), 7, &nodes, Some(&existing))
            .unwrap();
        assert_eq!(moved_mac.len(), 2);
    }

    #[test]
    fn test_vl3_suppression_is_notation_invariant() {
        let existing = existing_mapping(mac(0x55), "10.0.0.5");
        let batch = builder()
            .vl3_batch(
                44,
                "::ffff:10.0.0.5".parse().unwrap(),
                mac(0x55),
                7,
                &targets(2),
                Some(&existing),
            )
            .unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_route_payload_splits_cidr() {
        let params = RouteEventParams {
            src_vnet_id: 5,
            dst_vnet_id: 6,
            src_vlan_id: 100,
            dst_vlan_id: 200,
            src_subnet: "10.0.1.9/24".parse().unwrap(),
            dst_subnet: "192.168.0.0/16".parse().unwrap(),
            dc_id: 1,
        };
        let batch = builder().route_batch(&params, &targets(1)).unwrap();
        assert_eq!(batch.len(), 1);

        let BatchOp::Put { value, .. } = &batch[0].op else {
            panic!("expected put descriptor");
        };
        assert_eq!(value["payload"]["type"], "route");
        assert_eq!(value["payload"]["src_ip"], "10.0.1.0");
        assert_eq!(value["payload"]["src_prefix_len"], 24);
        assert_eq!(value["payload"]["dst_ip"], "192.168.0.0");
        assert_eq!(value["payload"]["dst_prefix_len"], 16);
    }

    #[test]
    fn test_entry_key_matches_entry_id() {
        let batch = builder().vl2_batch(44, mac(0x55), &targets(1), None).unwrap();
        let BatchOp::Put { value, .. } = &batch[0].op else {
            panic!("expected put descriptor");
        };
        assert_eq!(value["id"], batch[0].key);
        assert_eq!(value["payload"]["type"], "vl2");
    }

    #[test]
    fn test_delete_batch_targets_entry_by_id() {
        let id = Uuid::now_v7();
        let op = builder().delete_batch(id);
        assert_eq!(op.key, id.to_string());
        assert!(matches!(op.op, BatchOp::Delete));
    }
}
