//! Error types for directory operations

use crate::LookupIndex;
use thiserror::Error;

/// Key derivation and input parsing errors.
///
/// The codec never substitutes a default for malformed input; every bad
/// address or CIDR surfaces here.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid IP address: {addr}")]
    InvalidAddress { addr: String },

    #[error("invalid subnet: {subnet}: {reason}")]
    InvalidSubnet { subnet: String, reason: String },
}

/// Faults surfaced by the store adapter.
///
/// `NotFound` and `EtagMismatch` are translated by the engines into the
/// directory-level taxonomy; `Unavailable` passes through unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no object at {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("etag precondition failed on {bucket}/{key}")]
    EtagMismatch { bucket: String, key: String },

    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("malformed record in {bucket}: {reason}")]
    BadRecord { bucket: String, reason: String },
}

/// Master error type for all directory operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MeridianError {
    /// Point or secondary lookup found nothing live. Tombstoned records are
    /// converted to this at the engine boundary; callers never see "deleted"
    /// as a distinct successful state.
    #[error("{index} mapping not found")]
    NotFound { index: LookupIndex },

    /// A secondary index expected to be unique returned several live
    /// records. This is a data-integrity fault introduced upstream; it is
    /// reported, never auto-resolved.
    #[error("{count} live records match unique {index} index")]
    MultipleMatches { index: LookupIndex, count: usize },

    /// The etag captured at the start of a read-modify-write no longer
    /// matched at write time. The caller must retry the whole cycle.
    #[error("concurrent modification of {bucket}/{key}")]
    ConcurrentModification { bucket: String, key: String },

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for directory operations.
pub type MeridianResult<T> = Result<T, MeridianError>;

// =============================================================================
// TESTS
// =============================================================================
