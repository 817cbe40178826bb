//! Meridian Events - Shootdown Log Construction
//!
//! Builds the change-notification entries that remote agents consume to
//! invalidate their cached mappings. The builder produces batch descriptors
//! only; callers combine them with the primary mutation and submit the
//! whole set as one atomic store request.
//!
//! # Flow
//!
//! ```text
//! mutation ──┐
//!            ├─→ [BatchOperation, ...] ──→ StoreAdapter::batch (atomic)
//! shootdowns ┘
//! ```
//!
//! Entries are write-once: created here, read and then deleted by the
//! consumer, never updated in place.

mod shootdown;

pub use shootdown::{EventLogBuilder, RouteEventParams};

// Re-export the core event types for convenience
pub use meridian_core::{EventLogEntry, EventPayload};
