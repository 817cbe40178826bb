//! Bucket registry: logical entity names to physical store buckets.
//!
//! The engines never hardcode physical bucket names; they resolve them
//! through a `BucketRegistry` handed in at construction. Deployments that
//! prefix or version their buckets override the defaults here.

use serde::{Deserialize, Serialize};

/// Schema version stamped into newly written versioned records.
pub const SCHEMA_VERSION: u32 = 1;

/// Index column types understood by the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    String,
    Number,
    Boolean,
}

/// One indexed field of a bucket's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexField {
    pub name: String,
    pub kind: IndexType,
}

impl IndexField {
    fn new(name: &str, kind: IndexType) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

/// A single bucket: its physical name and the fields the store indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub name: String,
    pub index: Vec<IndexField>,
}

/// Maps the four logical entities to physical buckets, plus the schema
/// version stamped into new records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRegistry {
    pub overlay: BucketSpec,
    pub underlay: BucketSpec,
    pub routes: BucketSpec,
    pub events: BucketSpec,
    pub schema_version: u32,
}

impl Default for BucketRegistry {
    fn default() -> Self {
        Self {
            overlay: BucketSpec {
                name: "meridian_vnet_mac_ip".to_string(),
                index: vec![
                    IndexField::new("mac", IndexType::Number),
                    IndexField::new("ip", IndexType::String),
                    IndexField::new("cn_id", IndexType::String),
                    IndexField::new("vnet_id", IndexType::Number),
                    IndexField::new("version", IndexType::Number),
                    IndexField::new("deleted", IndexType::Boolean),
                ],
            },
            underlay: BucketSpec {
                name: "meridian_underlay_mappings".to_string(),
                index: vec![
                    IndexField::new("cn_id", IndexType::String),
                    IndexField::new("ip", IndexType::String),
                    IndexField::new("port", IndexType::Number),
                ],
            },
            routes: BucketSpec {
                name: "meridian_vnet_routes".to_string(),
                index: vec![
                    IndexField::new("vnet_id", IndexType::Number),
                    IndexField::new("vlan_id", IndexType::Number),
                    IndexField::new("subnet", IndexType::String),
                    IndexField::new("remote_vnet_id", IndexType::Number),
                    IndexField::new("version", IndexType::Number),
                    IndexField::new("deleted", IndexType::Boolean),
                ],
            },
            events: BucketSpec {
                name: "meridian_cn_net_events".to_string(),
                index: vec![
                    IndexField::new("cn_id", IndexType::String),
                    IndexField::new("vnet_id", IndexType::Number),
                ],
            },
            schema_version: SCHEMA_VERSION,
        }
    }
}
