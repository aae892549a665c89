//! Chimera Storage - Cache, Ledger and Style Persistence
//!
//! Storage traits consumed by the generation facade, with in-memory and
//! PostgreSQL implementations, filesystem and in-memory blob stores, and the
//! TTL-cached [`StyleConfigProvider`].

pub mod blob;
pub mod cache;
pub mod memory;
pub mod pg;
pub mod style;
pub mod traits;

pub use blob::{FsBlobStore, MemoryBlobStore};
pub use cache::{CacheStats, TtlCache};
pub use memory::{MemoryCacheStore, MemoryFallbackLog, MemoryLedger, MemoryStyleStore};
pub use pg::{DbConfig, PgStore};
pub use style::{StyleCacheConfig, StyleConfigProvider};
pub use traits::{BlobStore, CacheStore, RequestLedger, StorageResult, StyleStore};
