//! Directory record structures.
//!
//! These are the shapes stored in (and indexed by) the external object
//! store. Overlay and route mappings are tombstoned with `deleted` rather
//! than destroyed; lookups treat tombstones as absent while the record
//! stays physically retained until reaped.

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::KeyError;
use crate::keys::{vnet_mac_ip_key, vnet_route_key};
use crate::types::MacAddr;

/// Association of a virtual MAC+IP within a vnet to the compute node that
/// hosts it. Unique per (ip, vnet); the same mac may appear in many vnets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayMapping {
    pub mac: MacAddr,
    pub ip: IpAddr,
    pub cn_id: Uuid,
    pub vnet_id: u32,
    /// Whether this mapping answers for a vnet router address.
    #[serde(default)]
    pub router: bool,
    pub version: u32,
    #[serde(default)]
    pub deleted: bool,
}

impl OverlayMapping {
    /// Canonical store key for this record.
    pub fn key(&self) -> String {
        vnet_mac_ip_key(self.ip, self.vnet_id)
    }
}

/// Association of a compute node to its physical network address and port.
/// One live record per node; `ip` must be unique across live records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnderlayMapping {
    pub cn_id: Uuid,
    pub ip: IpAddr,
    pub port: u16,
}

impl UnderlayMapping {
    /// Underlay mappings are keyed by compute-node id.
    pub fn key(&self) -> String {
        self.cn_id.to_string()
    }
}

/// A routing relationship between two vnet subnets, carrying everything a
/// forwarding agent needs to reach the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VnetRouteMapping {
    pub vnet_id: u32,
    pub vlan_id: u16,
    pub subnet: IpNetwork,
    pub remote_vnet_id: u32,
    pub remote_vlan_id: u16,
    pub remote_subnet: IpNetwork,
    pub remote_dc_id: u32,
    pub remote_send_mac: MacAddr,
    pub version: u32,
    #[serde(default)]
    pub deleted: bool,
}

impl VnetRouteMapping {
    /// Canonical store key for this record.
    pub fn key(&self) -> Result<String, KeyError> {
        vnet_route_key(self.vnet_id, self.vlan_id, self.subnet, self.remote_subnet)
    }
}

/// One change notification addressed to one compute node.
///
/// Entries are append-only: the producer creates them alongside a primary
/// mutation and deletes them once the consumer acknowledges; nothing ever
/// updates one in place. `id` is the store key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Uuid,
    pub cn_id: Uuid,
    pub vnet_id: u32,
    pub version: u32,
    pub payload: EventPayload,
}

/// What changed. Consumers treat every entry as "something changed,
/// re-resolve", so each variant carries just enough to invalidate the right
/// cached state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// A L2 (mac within vnet) mapping changed.
    Vl2 { mac: MacAddr, vnet_id: u32 },
    /// A L3 (ip within vnet) mapping changed.
    Vl3 {
        ip: IpAddr,
        mac: MacAddr,
        vlan_id: u16,
        vnet_id: u32,
    },
    /// A route between two vnet subnets changed. Subnets travel split into
    /// network address and prefix length.
    Route {
        src_vnet_id: u32,
        dst_vnet_id: u32,
        src_vlan_id: u16,
        dst_vlan_id: u16,
        src_ip: IpAddr,
        src_prefix_len: u8,
        dst_ip: IpAddr,
        dst_prefix_len: u8,
        dc_id: u32,
    },
}
