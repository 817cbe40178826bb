//! In-memory store adapter.
//!
//! Backs the test suites and doubles as reference semantics for the store
//! contract: etags change on every successful put, conditional writes
//! compare the caller's etag against the stored one, and `batch` applies
//! all operations or none of them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde_json::Value;

use meridian_core::{BatchOp, BatchOperation, Etag, StoreError};

use crate::store::{
    Filter, FindOptions, PutOptions, RecordStream, SortField, StoreAdapter, StoredObject,
};

#[derive(Debug, Clone)]
struct StoredRecord {
    value: Value,
    etag: Etag,
    mtime: DateTime<Utc>,
    /// Monotonic write sequence; orders records when mtimes collide and
    /// stands in for insertion order on unsorted scans.
    seq: u64,
}

type Bucket = HashMap<String, StoredRecord>;

/// A `StoreAdapter` living entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    buckets: RwLock<HashMap<String, Bucket>>,
    seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn make_record(&self, value: Value) -> StoredRecord {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        StoredRecord {
            value,
            etag: Etag::new(format!("{seq:016x}")),
            mtime: Utc::now(),
            seq,
        }
    }

    /// Number of objects currently stored in a bucket.
    pub fn bucket_len(&self, bucket: &str) -> usize {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        buckets.get(bucket).map_or(0, |b| b.len())
    }
}

fn check_precondition(
    bucket: &str,
    key: &str,
    existing: Option<&StoredRecord>,
    expected: Option<&Etag>,
) -> Result<(), StoreError> {
    match (expected, existing) {
        (None, _) => Ok(()),
        (Some(want), Some(record)) if record.etag == *want => Ok(()),
        (Some(_), _) => Err(StoreError::EtagMismatch {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }),
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
        buckets
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|record| StoredObject {
                key: key.to_string(),
                value: record.value.clone(),
                etag: record.etag.clone(),
                mtime: record.mtime,
            })
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        value: Value,
        opts: PutOptions,
    ) -> Result<(), StoreError> {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        let objects = buckets.entry(bucket.to_string()).or_default();
        check_precondition(bucket, key, objects.get(key), opts.etag.as_ref())?;
        objects.insert(key.to_string(), self.make_record(value));
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        let removed = buckets.get_mut(bucket).and_then(|b| b.remove(key));
        match removed {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
        }
    }

    async fn find(
        &self,
        bucket: &str,
        filter: Filter,
        opts: FindOptions,
    ) -> Result<RecordStream, StoreError> {
        let mut matched: Vec<(String, StoredRecord)> = {
            let buckets = self.buckets.read().unwrap_or_else(|e| e.into_inner());
            buckets
                .get(bucket)
                .map(|objects| {
                    objects
                        .iter()
                        .filter(|(_, record)| filter.matches(&record.value))
                        .map(|(key, record)| (key.clone(), record.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };

        match opts.sort {
            Some(sort) => {
                let SortField::Mtime = sort.field;
                matched.sort_by_key(|(_, record)| (record.mtime, record.seq));
                if !sort.ascending {
                    matched.reverse();
                }
            }
            None => matched.sort_by_key(|(_, record)| record.seq),
        }

        if let Some(limit) = opts.limit {
            matched.truncate(limit);
        }

        let objects: Vec<Result<StoredObject, StoreError>> = matched
            .into_iter()
            .map(|(key, record)| {
                Ok(StoredObject {
                    key,
                    value: record.value,
                    etag: record.etag,
                    mtime: record.mtime,
                })
            })
            .collect();

        Ok(stream::iter(objects).boxed())
    }

    async fn batch(&self, ops: Vec<BatchOperation>) -> Result<(), StoreError> {
        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());

        // Validate every precondition before touching anything; a single
        // failure leaves the store untouched.
        for op in &ops {
            let existing = buckets.get(&op.bucket).and_then(|b| b.get(&op.key));
            match &op.op {
                BatchOp::Put { etag, .. } => {
                    check_precondition(&op.bucket, &op.key, existing, etag.as_ref())?;
                }
                BatchOp::Delete => {
                    if existing.is_none() {
                        return Err(StoreError::NotFound {
                            bucket: op.bucket.clone(),
                            key: op.key.clone(),
                        });
                    }
                }
            }
        }

        for op in ops {
            match op.op {
                BatchOp::Put { value, .. } => {
                    let record = self.make_record(value);
                    buckets
                        .entry(op.bucket)
                        .or_default()
                        .insert(op.key, record);
                }
                BatchOp::Delete => {
                    if let Some(objects) = buckets.get_mut(&op.bucket) {
                        objects.remove(&op.key);
                    }
                }
            }
        }

        Ok(())
    }
}
