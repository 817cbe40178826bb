//! Meridian Storage - Store Contract, Caches, and Engines
//!
//! Everything between a caller and the backing object store: the
//! `StoreAdapter` contract, the bounded per-index mapping caches, the
//! lookup engine (`DirectoryReader`), the mutation engine
//! (`DirectoryWriter`), and an in-memory adapter used by tests.

pub mod cache;
pub mod lookup;
pub mod memory;
pub mod mutate;
pub mod store;

pub use cache::{CacheStats, DirectoryCaches, MappingCache};
pub use lookup::{
    DirectoryReader, EventLogOptions, LookupOptions, MappingStream, DEFAULT_EVENT_LOG_LIMIT,
};
pub use memory::MemoryStore;
pub use mutate::{
    DirectoryWriter, OverlayMappingParams, OverlayMappingUpdate, UnderlayMappingParams,
    UnderlayMappingUpdate, VnetRouteParams, VnetRouteUpdate,
};
pub use store::{
    Filter, FindOptions, PutOptions, RecordStream, Sort, SortField, StoreAdapter, StoredObject,
};
