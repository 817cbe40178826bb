//! Batch descriptors and the optimistic-concurrency token.
//!
//! A `BatchOperation` describes one write without performing it. The
//! mutation engine and the event-log builder both hand these back to the
//! caller, who combines a primary mutation with its event-log entries and
//! submits the lot as a single all-or-nothing request to the store adapter.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque version token returned by the store on read and required on
/// conditional write. The engines only ever compare and echo it back;
/// its contents mean nothing outside the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Etag(String);

impl Etag {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Etag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Etag {
    fn from(token: String) -> Self {
        Self(token)
    }
}

/// What a batch operation does to its key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum BatchOp {
    Put {
        value: Value,
        /// Present when the put must be guarded by a previously observed
        /// etag.
        etag: Option<Etag>,
    },
    Delete,
}

/// A single deferred write against one bucket/key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperation {
    pub bucket: String,
    pub key: String,
    #[serde(flatten)]
    pub op: BatchOp,
}

impl BatchOperation {
    /// An unconditional create-or-replace.
    pub fn put(bucket: impl Into<String>, key: impl Into<String>, value: Value) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            op: BatchOp::Put { value, etag: None },
        }
    }

    /// A put guarded by the etag observed at last read.
    pub fn guarded_put(
        bucket: impl Into<String>,
        key: impl Into<String>,
        value: Value,
        etag: Etag,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            op: BatchOp::Put {
                value,
                etag: Some(etag),
            },
        }
    }

    /// An unconditional delete.
    pub fn delete(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            op: BatchOp::Delete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_descriptor_carries_no_etag() {
        let op = BatchOperation::put("bucket", "key", serde_json::json!({"a": 1}));
        assert!(matches!(op.op, BatchOp::Put { etag: None, .. }));
    }

    #[test]
    fn test_guarded_put_keeps_observed_etag() {
        let etag = Etag::new("v17");
        let op = BatchOperation::guarded_put(
            "bucket",
            "key",
            serde_json::json!({}),
            etag.clone(),
        );
        match op.op {
            BatchOp::Put { etag: Some(e), .. } => assert_eq!(e, etag),
            other => panic!("expected guarded put, got {other:?}"),
        }
    }

    #[test]
    fn test_delete_serializes_operation_tag() {
        let op = BatchOperation::delete("bucket", "key");
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["operation"], "delete");
        assert_eq!(json["bucket"], "bucket");
    }
}
