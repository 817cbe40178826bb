//! Network identity primitives.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Highest value representable in 48 bits; anything above is not a MAC.
const MAC_MAX: u64 = (1 << 48) - 1;

/// A 48-bit Ethernet MAC address.
///
/// Stored records carry MACs as plain integers so that the store can index
/// and filter on them numerically; the textual colon-hex form is only used
/// at display boundaries.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MacAddr {
    inner: [u8; 6],
}

impl MacAddr {
    pub const ZERO: Self = Self { inner: [0x00; 6] };
    pub const BROADCAST: Self = Self { inner: [0xFF; 6] };

    /// Return the bytes of the MAC address.
    #[inline]
    pub fn bytes(&self) -> [u8; 6] {
        self.inner
    }

    pub const fn from_const(bytes: [u8; 6]) -> Self {
        Self { inner: bytes }
    }

    /// The numeric form stored in (and filtered on by) the object store.
    pub fn to_u64(&self) -> u64 {
        self.inner
            .iter()
            .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
    }

    /// Rebuild an address from its numeric form.
    ///
    /// Returns `None` when the value does not fit in 48 bits.
    pub fn from_u64(value: u64) -> Option<Self> {
        if value > MAC_MAX {
            return None;
        }

        let raw = value.to_be_bytes();
        let mut bytes = [0u8; 6];
        bytes.copy_from_slice(&raw[2..8]);
        Some(Self { inner: bytes })
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(bytes: [u8; 6]) -> Self {
        Self { inner: bytes }
    }
}

impl FromStr for MacAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<u8> = s
            .split(':')
            .map(|part| {
                u8::from_str_radix(part, 16).map_err(|_| format!("bad octet: {part}"))
            })
            .collect::<Result<Vec<u8>, _>>()?;

        if octets.len() != 6 {
            return Err(format!("incorrect number of bytes: {}", octets.len()));
        }

        let bytes =
            [octets[0], octets[1], octets[2], octets[3], octets[4], octets[5]];

        Ok(MacAddr { inner: bytes })
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.inner[0],
            self.inner[1],
            self.inner[2],
            self.inner[3],
            self.inner[4],
            self.inner[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MacAddr({self})")
    }
}

impl Serialize for MacAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.to_u64())
    }
}

impl<'de> Deserialize<'de> for MacAddr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u64::deserialize(deserializer)?;
        MacAddr::from_u64(value)
            .ok_or_else(|| de::Error::custom(format!("MAC out of range: {value}")))
    }
}

/// The index a lookup was resolved against.
///
/// Carried by `NotFound` and `MultipleMatches` errors so callers can tell
/// which resolution path came up empty or inconsistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookupIndex {
    /// Underlay mapping by compute-node id (primary key).
    UnderlayNode,
    /// Underlay mapping by underlay IP (secondary index).
    UnderlayIp,
    /// Overlay mapping by (mac, vnet) filter.
    OverlayMacVnet,
    /// Overlay mapping by canonical (ip, vnet) key.
    OverlayIpVnet,
    /// Vnet route mapping by canonical route key.
    VnetRoute,
}

impl fmt::Display for LookupIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            LookupIndex::UnderlayNode => "underlay cn",
            LookupIndex::UnderlayIp => "underlay ip",
            LookupIndex::OverlayMacVnet => "overlay mac+vnet",
            LookupIndex::OverlayIpVnet => "overlay ip+vnet",
            LookupIndex::VnetRoute => "vnet route",
        };
        write!(f, "{name}")
    }
}
