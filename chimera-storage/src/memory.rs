//! In-memory storage backends.
//!
//! Each store keeps its state behind a single mutex so compound operations
//! (acquire, activate) are atomic within the process. Useful for tests and
//! single-instance deployments; coalescing only spans one process here.
//! The ledger drops long-terminal records on each stale sweep, so a
//! long-running instance should run the sweep job.

use crate::cache::CacheStats;
use crate::traits::{CacheStore, RequestLedger, StorageResult, StyleStore};
use ::async_trait::async_trait;
use chimera_core::{
    AcquireOutcome, ArtifactKind, CachedArtifact, Clock, CompletionStatus, FallbackEvent,
    FallbackRecorder, Fingerprint, RequestRecord, RequestStatus, StorageError, StyleVersion,
    SystemClock,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> StorageResult<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| StorageError::LockPoisoned)
}

// ============================================================================
// ARTIFACT CACHE
// ============================================================================

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<Fingerprint, CachedArtifact>,
    hits: u64,
    misses: u64,
}

/// Artifact cache held in a hash map.
#[derive(Debug)]
pub struct MemoryCacheStore {
    state: Mutex<CacheState>,
    clock: Arc<dyn Clock>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            clock,
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            entry_count: state.entries.len() as u64,
        }
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let before = state.entries.len();
        state.entries.retain(|_, a| !a.is_expired(now));
        before - state.entries.len()
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, fingerprint: &Fingerprint) -> StorageResult<Option<CachedArtifact>> {
        let now = self.clock.now();
        let mut state = lock(&self.state)?;
        let found = state.entries.get(fingerprint).cloned();
        match &found {
            Some(a) if !a.is_expired(now) => state.hits += 1,
            _ => state.misses += 1,
        }
        Ok(found)
    }

    async fn put(&self, artifact: &CachedArtifact) -> StorageResult<CachedArtifact> {
        let mut state = lock(&self.state)?;
        if let Some(existing) = state.entries.get(&artifact.fingerprint) {
            if !existing.is_expired(artifact.created_at) {
                return Ok(existing.clone());
            }
        }
        state
            .entries
            .insert(artifact.fingerprint.clone(), artifact.clone());
        Ok(artifact.clone())
    }
}

// ============================================================================
// REQUEST LEDGER
// ============================================================================

#[derive(Debug, Default)]
struct LedgerState {
    records: HashMap<Uuid, RequestRecord>,
    in_flight: HashMap<(Fingerprint, ArtifactKind), Uuid>,
}

/// Request ledger held in memory; acquire is atomic under one lock.
#[derive(Debug)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    clock: Arc<dyn Clock>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            clock,
        }
    }

    /// All records, oldest first.
    pub fn records(&self) -> Vec<RequestRecord> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut records: Vec<_> = state.records.values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    pub fn in_flight_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.in_flight.len()
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestLedger for MemoryLedger {
    async fn try_acquire(
        &self,
        fingerprint: &Fingerprint,
        kind: ArtifactKind,
    ) -> StorageResult<AcquireOutcome> {
        let now = self.clock.now();
        let mut state = lock(&self.state)?;
        let slot = (fingerprint.clone(), kind);

        if let Some(id) = state.in_flight.get(&slot) {
            if let Some(existing) = state.records.get(id) {
                return Ok(AcquireOutcome::AlreadyInFlight(existing.clone()));
            }
        }

        let record = RequestRecord::pending(fingerprint.clone(), kind, now);
        state.in_flight.insert(slot, record.id);
        state.records.insert(record.id, record.clone());
        Ok(AcquireOutcome::Acquired(record))
    }

    async fn mark_processing(&self, record: &RequestRecord) -> StorageResult<RequestRecord> {
        let now = self.clock.now();
        let mut state = lock(&self.state)?;
        let current = state
            .records
            .get_mut(&record.id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "generation_request".to_string(),
                id: record.id.to_string(),
            })?;
        if current.status == RequestStatus::Pending {
            current.status = RequestStatus::Processing;
            current.started_at = Some(now);
            current.updated_at = now;
        }
        Ok(current.clone())
    }

    async fn complete(
        &self,
        record: &RequestRecord,
        status: CompletionStatus,
    ) -> StorageResult<bool> {
        let now = self.clock.now();
        let mut state = lock(&self.state)?;
        // Missing means pruned after going terminal.
        let Some(current) = state.records.get_mut(&record.id) else {
            return Ok(false);
        };
        if current.status.is_terminal() {
            return Ok(false);
        }
        current.status = status.into();
        current.updated_at = now;
        let slot = (current.fingerprint.clone(), current.kind);
        if state.in_flight.get(&slot) == Some(&record.id) {
            state.in_flight.remove(&slot);
        }
        Ok(true)
    }

    async fn status(&self, id: Uuid) -> StorageResult<Option<RequestRecord>> {
        let state = lock(&self.state)?;
        Ok(state.records.get(&id).cloned())
    }

    async fn reclaim_stale(&self, max_age: Duration) -> StorageResult<u64> {
        let now = self.clock.now();
        let mut guard = lock(&self.state)?;
        let state = &mut *guard;

        let retention = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let before = state.records.len();
        state.records.retain(|_, record| {
            !record.status.is_terminal()
                || now.signed_duration_since(record.updated_at) <= retention
        });
        let pruned = before - state.records.len();
        if pruned > 0 {
            tracing::debug!(pruned, "Dropped terminal request records");
        }

        let mut reclaimed = 0u64;
        for record in state.records.values_mut() {
            if record.is_stale(now, max_age) {
                record.status = RequestStatus::Failed;
                record.updated_at = now;
                state
                    .in_flight
                    .remove(&(record.fingerprint.clone(), record.kind));
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }
}

// ============================================================================
// STYLE VERSIONS
// ============================================================================

/// Style versions held in a vector; activation happens under one lock.
#[derive(Debug, Default)]
pub struct MemoryStyleStore {
    versions: Mutex<Vec<StyleVersion>>,
}

impl MemoryStyleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StyleStore for MemoryStyleStore {
    async fn list_versions(&self) -> StorageResult<Vec<StyleVersion>> {
        let mut versions = lock(&self.versions)?.clone();
        versions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(versions)
    }

    async fn active_version(&self) -> StorageResult<Option<StyleVersion>> {
        Ok(lock(&self.versions)?.iter().find(|v| v.is_active).cloned())
    }

    async fn insert_version(&self, version: &StyleVersion) -> StorageResult<()> {
        let mut versions = lock(&self.versions)?;
        if version.is_active {
            for v in versions.iter_mut() {
                v.is_active = false;
            }
        }
        versions.push(version.clone());
        Ok(())
    }

    async fn activate(&self, id: Uuid) -> StorageResult<()> {
        let mut versions = lock(&self.versions)?;
        if !versions.iter().any(|v| v.id == id) {
            return Err(StorageError::NotFound {
                entity: "style_version".to_string(),
                id: id.to_string(),
            });
        }
        for v in versions.iter_mut() {
            v.is_active = v.id == id;
        }
        Ok(())
    }

    async fn count_active(&self) -> StorageResult<usize> {
        Ok(lock(&self.versions)?.iter().filter(|v| v.is_active).count())
    }
}

// ============================================================================
// FALLBACK LOG
// ============================================================================

/// Fallback events kept in memory.
#[derive(Debug, Default)]
pub struct MemoryFallbackLog {
    events: Mutex<Vec<FallbackEvent>>,
}

impl MemoryFallbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<FallbackEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl FallbackRecorder for MemoryFallbackLog {
    async fn record(&self, event: &FallbackEvent) -> Result<(), StorageError> {
        lock(&self.events)?.push(event.clone());
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
