//! Meridian Core - Directory Data Types
//!
//! Pure data structures for the Meridian virtual-network directory: record
//! shapes, canonical key derivation, the error taxonomy, batch descriptors,
//! and the bucket registry. All other crates depend on this one; it carries
//! no I/O.

pub mod batch;
pub mod buckets;
pub mod config;
pub mod error;
pub mod keys;
pub mod mapping;
pub mod types;

pub use batch::{BatchOp, BatchOperation, Etag};
pub use buckets::{BucketRegistry, BucketSpec, IndexField, IndexType, SCHEMA_VERSION};
pub use config::{CacheConfig, DirectoryConfig};
pub use error::{KeyError, MeridianError, MeridianResult, StoreError};
pub use keys::{
    canonical_ip, canonical_subnet, parse_ip, parse_subnet, vnet_mac_ip_key, vnet_route_key,
};
pub use mapping::{
    EventLogEntry, EventPayload, OverlayMapping, UnderlayMapping, VnetRouteMapping,
};
pub use types::{LookupIndex, MacAddr};
