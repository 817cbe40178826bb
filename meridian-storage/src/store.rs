//! Store adapter contract.
//!
//! Meridian consumes a versioned, etag-capable indexed object store through
//! this trait; it never implements one (the in-memory adapter in
//! [`crate::memory`] exists for tests and as reference semantics). All
//! engine I/O suspends here and nowhere else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde_json::Value;

use meridian_core::{BatchOperation, Etag, StoreError};

/// A stream of raw objects from a filtered scan. Lazy, finite in practice,
/// and non-restartable: once consumed, a new scan must be issued.
pub type RecordStream = BoxStream<'static, Result<StoredObject, StoreError>>;

/// One object as read from the store: its key, raw value, the etag to echo
/// on conditional writes, and the store-assigned modification time.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub key: String,
    pub value: Value,
    pub etag: Etag,
    pub mtime: DateTime<Utc>,
}

impl StoredObject {
    /// Deserialize the raw value into a typed record.
    pub fn decode<T: DeserializeOwned>(&self, bucket: &str) -> Result<T, StoreError> {
        serde_json::from_value(self.value.clone()).map_err(|e| StoreError::BadRecord {
            bucket: bucket.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Options for a single put.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// When present, the put only applies if the stored etag still matches.
    pub etag: Option<Etag>,
}

impl PutOptions {
    /// Guard the put with the etag observed at last read.
    pub fn guarded(etag: Etag) -> Self {
        Self { etag: Some(etag) }
    }
}

/// Fields a scan can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    /// Store-assigned modification time.
    Mtime,
}

/// Scan ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: SortField,
    pub ascending: bool,
}

impl Sort {
    pub fn mtime_ascending() -> Self {
        Self {
            field: SortField::Mtime,
            ascending: true,
        }
    }
}

/// Options for a filtered scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Advisory cap on returned records; the adapter never exceeds it.
    pub limit: Option<usize>,
    pub sort: Option<Sort>,
}

impl FindOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }
}

/// A conjunction of field-equality clauses over a bucket's indexed fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    /// Start a filter with one field-equality clause.
    pub fn field(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            clauses: vec![(name.into(), value.into())],
        }
    }

    /// Add another clause; all clauses must match.
    pub fn and(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((name.into(), value.into()));
        self
    }

    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    /// Whether a raw record value satisfies every clause.
    pub fn matches(&self, record: &Value) -> bool {
        self.clauses
            .iter()
            .all(|(name, expected)| record.get(name) == Some(expected))
    }
}

/// The versioned object store the directory sits on.
///
/// `batch` is all-or-nothing; the engines rely on that transactional
/// guarantee rather than re-implementing it. Timeouts and retries belong to
/// the caller or the adapter implementation, never to the engines.
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Point read. `StoreError::NotFound` when the key is absent.
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError>;

    /// Create-or-replace, optionally guarded by an etag.
    /// `StoreError::EtagMismatch` when the guard fails.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        value: Value,
        opts: PutOptions,
    ) -> Result<(), StoreError>;

    /// Unconditional delete. `StoreError::NotFound` when the key is absent.
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Filtered scan returning a lazy record stream.
    async fn find(
        &self,
        bucket: &str,
        filter: Filter,
        opts: FindOptions,
    ) -> Result<RecordStream, StoreError>;

    /// Apply a set of operations atomically: all of them, or none.
    async fn batch(&self, ops: Vec<BatchOperation>) -> Result<(), StoreError>;
}
