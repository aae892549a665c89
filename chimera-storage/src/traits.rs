//! Storage traits for the generation cache.
//!
//! Backends implement the raw, fallible operations. The fail-open behaviour
//! callers rely on (`lookup`, `insert`) is provided here once so every
//! backend degrades the same way.

use ::async_trait::async_trait;
use chimera_core::{
    AcquireOutcome, ArtifactKind, CachedArtifact, CompletionStatus, Fingerprint, RequestRecord,
    StorageError, StyleVersion, Timestamp,
};
use std::time::Duration;
use uuid::Uuid;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// ============================================================================
// ARTIFACT CACHE
// ============================================================================

/// Previously generated artifacts keyed by fingerprint.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch the stored artifact for `fingerprint`, expired or not.
    async fn get(&self, fingerprint: &Fingerprint) -> StorageResult<Option<CachedArtifact>>;

    /// Store `artifact` and return the row that ended up in the store.
    ///
    /// An unexpired row already present for the same fingerprint wins; an
    /// expired one is replaced.
    async fn put(&self, artifact: &CachedArtifact) -> StorageResult<CachedArtifact>;

    /// Cache read used on the request path.
    ///
    /// Expired rows and storage errors both read as a miss.
    async fn lookup(&self, fingerprint: &Fingerprint, now: Timestamp) -> Option<CachedArtifact> {
        match self.get(fingerprint).await {
            Ok(Some(artifact)) if !artifact.is_expired(now) => Some(artifact),
            Ok(Some(_)) => {
                tracing::debug!(fingerprint = %fingerprint.short(), "Cached artifact expired");
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fingerprint = %fingerprint.short(),
                    "Cache lookup failed, treating as miss"
                );
                None
            }
        }
    }

    /// Cache write used on the request path.
    ///
    /// A failed write is logged and the unsaved artifact handed back.
    async fn insert(&self, artifact: CachedArtifact) -> CachedArtifact {
        match self.put(&artifact).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::error!(
                    error = %e,
                    fingerprint = %artifact.fingerprint.short(),
                    "Cache write failed, returning uncached artifact"
                );
                artifact
            }
        }
    }
}

// ============================================================================
// REQUEST LEDGER
// ============================================================================

/// Persistent record of in-flight generation attempts.
///
/// At most one non-terminal record may exist per `(fingerprint, kind)`.
#[async_trait]
pub trait RequestLedger: Send + Sync {
    /// Atomically insert a pending record unless a non-terminal one exists.
    async fn try_acquire(
        &self,
        fingerprint: &Fingerprint,
        kind: ArtifactKind,
    ) -> StorageResult<AcquireOutcome>;

    /// Move an owned record from pending to processing and stamp `started_at`.
    async fn mark_processing(&self, record: &RequestRecord) -> StorageResult<RequestRecord>;

    /// Terminal transition of an owned record.
    ///
    /// Returns false when the record was already terminal (e.g. reclaimed
    /// by the sweep) or no longer exists, and was left untouched.
    async fn complete(&self, record: &RequestRecord, status: CompletionStatus)
        -> StorageResult<bool>;

    /// Current state of a record.
    async fn status(&self, id: Uuid) -> StorageResult<Option<RequestRecord>>;

    /// Force non-terminal records that started more than `max_age` ago to
    /// failed. Returns how many were reclaimed.
    ///
    /// Backends without external retention may also drop records that have
    /// been terminal for longer than `max_age`.
    async fn reclaim_stale(&self, max_age: Duration) -> StorageResult<u64>;
}

// ============================================================================
// STYLE VERSIONS
// ============================================================================

/// Versioned style bundles.
#[async_trait]
pub trait StyleStore: Send + Sync {
    async fn list_versions(&self) -> StorageResult<Vec<StyleVersion>>;

    /// The active version, if any.
    async fn active_version(&self) -> StorageResult<Option<StyleVersion>>;

    async fn insert_version(&self, version: &StyleVersion) -> StorageResult<()>;

    /// Deactivate every version then activate `id`.
    ///
    /// Fails with `NotFound` if `id` does not exist, leaving activation as it was.
    async fn activate(&self, id: Uuid) -> StorageResult<()>;

    async fn count_active(&self) -> StorageResult<usize>;
}

// ============================================================================
// BLOBS
// ============================================================================

/// Durable store for large generated payloads.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `data` under `key`, returning a stable, retrievable reference.
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> StorageResult<String>;

    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;
}
