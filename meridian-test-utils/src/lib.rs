//! Meridian Test Utilities
//!
//! Centralized test infrastructure for the Meridian workspace:
//! - Proptest generators for addresses, ids, and mapping records
//! - Fixtures for common directory scenarios
//! - Re-exports of the in-memory store adapter and the types tests reach
//!   for most often

// Re-export the in-memory adapter from its source crate
pub use meridian_storage::MemoryStore;

// Re-export core types for convenience
pub use meridian_core::{
    BatchOperation, BucketRegistry, EventLogEntry, EventPayload, MacAddr, MeridianError,
    MeridianResult, OverlayMapping, UnderlayMapping, VnetRouteMapping,
};
pub use meridian_events::EventLogBuilder;

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use proptest::prelude::*;
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

/// Any 48-bit MAC address.
pub fn mac_addr() -> impl Strategy<Value = MacAddr> {
    any::<[u8; 6]>().prop_map(MacAddr::from)
}

/// Any IPv4 address.
pub fn ipv4_addr() -> impl Strategy<Value = IpAddr> {
    any::<[u8; 4]>().prop_map(IpAddr::from)
}

/// Any IPv6 address, already in canonical form.
pub fn ipv6_addr() -> impl Strategy<Value = IpAddr> {
    any::<[u8; 16]>().prop_map(|bytes| IpAddr::from(bytes).to_canonical())
}

/// Either address family.
pub fn ip_addr() -> impl Strategy<Value = IpAddr> {
    prop_oneof![ipv4_addr(), ipv6_addr()]
}

/// A vnet id inside the 24-bit VXLAN-style space.
pub fn vnet_id() -> impl Strategy<Value = u32> {
    0u32..(1 << 24)
}

/// Any UUID.
pub fn uuid() -> impl Strategy<Value = Uuid> {
    any::<u128>().prop_map(Uuid::from_u128)
}

/// An IPv4 subnet with its host bits already masked off.
pub fn ipv4_subnet() -> impl Strategy<Value = IpNetwork> {
    (any::<[u8; 4]>(), 0u8..=32).prop_map(|(octets, prefix)| {
        let net = IpNetwork::new(IpAddr::from(octets), prefix)
            .expect("prefix is within range");
        IpNetwork::new(net.network(), prefix).expect("masked network is valid")
    })
}

/// A full overlay mapping record.
pub fn overlay_mapping() -> impl Strategy<Value = OverlayMapping> {
    (
        mac_addr(),
        ip_addr(),
        uuid(),
        vnet_id(),
        any::<bool>(),
        1u32..10,
        any::<bool>(),
    )
        .prop_map(
            |(mac, ip, cn_id, vnet_id, router, version, deleted)| OverlayMapping {
                mac,
                ip,
                cn_id,
                vnet_id,
                router,
                version,
                deleted,
            },
        )
}

/// A full underlay mapping record.
pub fn underlay_mapping() -> impl Strategy<Value = UnderlayMapping> {
    (uuid(), ip_addr(), any::<u16>()).prop_map(|(cn_id, ip, port)| UnderlayMapping {
        cn_id,
        ip,
        port,
    })
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A deterministic overlay mapping for scenario tests. `seed` varies the
/// identity fields so fixtures never collide with each other.
pub fn overlay_fixture(seed: u8, vnet_id: u32) -> OverlayMapping {
    OverlayMapping {
        mac: MacAddr::from([0x02, 0x08, 0x20, 0x00, 0x00, seed]),
        ip: IpAddr::from([10, 0, vnet_id as u8, seed]),
        cn_id: Uuid::from_u128(u128::from(seed)),
        vnet_id,
        router: false,
        version: 1,
        deleted: false,
    }
}

/// A deterministic underlay mapping for scenario tests.
pub fn underlay_fixture(seed: u8) -> UnderlayMapping {
    UnderlayMapping {
        cn_id: Uuid::from_u128(u128::from(seed)),
        ip: IpAddr::from([172, 16, 0, seed]),
        port: 4789,
    }
}
