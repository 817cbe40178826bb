//! Canonical key derivation for directory buckets.
//!
//! Every record is addressed by a string key derived from its identity
//! tuple. The derivation must be injective: no two distinct tuples may
//! collide, and the same tuple must produce the same key no matter which
//! textual notation the caller started from. IPv4-mapped IPv6 addresses
//! collapse to their dotted IPv4 form, and subnets are masked down to their
//! network address before joining.

use std::net::IpAddr;

use ipnetwork::IpNetwork;

use crate::error::KeyError;

/// Delimiter between key components. Never appears inside a canonical IP,
/// subnet, or decimal id, which is what keeps the join injective.
const KEY_DELIMITER: char = ',';

/// Reduce an address to its single canonical family representation.
///
/// `::ffff:10.0.0.1` and `10.0.0.1` are the same address on the wire; both
/// canonicalize to the IPv4 form.
pub fn canonical_ip(ip: IpAddr) -> IpAddr {
    ip.to_canonical()
}

/// Parse an address from text, canonicalizing the result.
pub fn parse_ip(addr: &str) -> Result<IpAddr, KeyError> {
    addr.parse::<IpAddr>()
        .map(canonical_ip)
        .map_err(|_| KeyError::InvalidAddress {
            addr: addr.to_string(),
        })
}

/// Mask a subnet down to its canonical form: network address (host bits
/// cleared, canonical family) plus prefix length.
pub fn canonical_subnet(subnet: IpNetwork) -> Result<IpNetwork, KeyError> {
    IpNetwork::new(canonical_ip(subnet.network()), subnet.prefix()).map_err(|e| {
        KeyError::InvalidSubnet {
            subnet: subnet.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Parse a CIDR subnet from text, canonicalizing the result.
pub fn parse_subnet(subnet: &str) -> Result<IpNetwork, KeyError> {
    let parsed = subnet
        .parse::<IpNetwork>()
        .map_err(|e| KeyError::InvalidSubnet {
            subnet: subnet.to_string(),
            reason: e.to_string(),
        })?;
    canonical_subnet(parsed)
}

/// Key for an overlay mapping: canonical IP joined with the vnet id.
pub fn vnet_mac_ip_key(ip: IpAddr, vnet_id: u32) -> String {
    format!("{}{}{}", canonical_ip(ip), KEY_DELIMITER, vnet_id)
}

/// Key for a vnet route mapping: vnet id, vlan id, canonical local subnet,
/// canonical remote subnet.
pub fn vnet_route_key(
    vnet_id: u32,
    vlan_id: u16,
    subnet: IpNetwork,
    remote_subnet: IpNetwork,
) -> Result<String, KeyError> {
    let local = canonical_subnet(subnet)?;
    let remote = canonical_subnet(remote_subnet)?;
    Ok(format!(
        "{vnet_id}{KEY_DELIMITER}{vlan_id}{KEY_DELIMITER}{local}{KEY_DELIMITER}{remote}"
    ))
}
