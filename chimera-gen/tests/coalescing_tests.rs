//! Cross-request coalescing through the request ledger.
//!
//! Concurrent requests for one fingerprint reach a provider once; requests
//! that find the slot taken wait on the ledger and read the cache.

use async_trait::async_trait;
use chimera_core::{
    AcquireOutcome, ArtifactKind, CachedArtifact, ChimeraError, ChimeraResult, Clock,
    CompletionStatus, Fingerprint, GenerationError, RequestRecord, RequestStatus, StorageError,
};
use chimera_gen::{ArtifactStrategy, Collaborators, GenerationFacade, ImageStrategy, TextStrategy};
use chimera_storage::{CacheStore, MemoryCacheStore, RequestLedger, StorageResult};
use chimera_test_utils::assertions::{assert_generated_by, assert_generation_error, assert_timed_out};
use chimera_test_utils::fixtures::{banner_params, narration_params, png_bytes};
use chimera_test_utils::{
    png_provider, text_provider, GenerationConfig, Harness, ProviderTier, ScriptedProvider,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_generate_once() {
    let harness = Harness::new();
    let provider = Arc::new(
        ScriptedProvider::image("local-image", ProviderTier::Local, png_bytes(), "image/png")
            .with_delay(Duration::from_millis(200)),
    );
    let facade = Arc::new(harness.image_facade(&[provider.clone()]));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let facade = facade.clone();
            tokio::spawn(async move { facade.generate(banner_params("castle at dusk")).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(provider.calls(), 1);
    assert_eq!(outcomes.iter().filter(|o| !o.cached).count(), 1);
    let reference = outcomes[0].artifact.content.reference().map(str::to_string);
    assert!(reference.is_some());
    for outcome in &outcomes {
        assert!(!outcome.degraded);
        assert_eq!(outcome.artifact.content.reference().map(str::to_string), reference);
        assert_eq!(outcome.artifact.id, outcomes[0].artifact.id);
    }

    assert_eq!(harness.ledger.in_flight_count(), 0);
    let records = harness.ledger.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, RequestStatus::Completed);
    assert_eq!(harness.blobs.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_fingerprints_do_not_coalesce() {
    let harness = Harness::new();
    let provider = Arc::new(
        ScriptedProvider::text("local-text", ProviderTier::Local, "The wind howls.")
            .with_delay(Duration::from_millis(50)),
    );
    let facade = Arc::new(harness.text_facade(&[provider.clone()]));

    let a = {
        let facade = facade.clone();
        tokio::spawn(async move { facade.generate(narration_params("gate:north", "North gate")).await })
    };
    let b = {
        let facade = facade.clone();
        tokio::spawn(async move { facade.generate(narration_params("gate:south", "South gate")).await })
    };

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();
    assert!(!a.cached && !b.cached);
    assert_ne!(a.artifact.fingerprint, b.artifact.fingerprint);
    assert_eq!(provider.calls(), 2);
}

/// Take the slot for the bridge narration as if another process held it.
async fn hold_slot(harness: &Harness, facade: &GenerationFacade<TextStrategy>) -> RequestRecord {
    let fingerprint = facade
        .strategy()
        .fingerprint(&narration_params("bridge:1", "The bridge creaks."));
    match harness
        .ledger
        .try_acquire(&fingerprint, ArtifactKind::Text)
        .await
        .unwrap()
    {
        AcquireOutcome::Acquired(record) => record,
        AcquireOutcome::AlreadyInFlight(_) => panic!("slot unexpectedly held"),
    }
}

#[tokio::test]
async fn test_waiter_fails_when_owner_fails() {
    let harness = Harness::new();
    let provider = text_provider("local-text", ProviderTier::Local, "unused");
    let facade = Arc::new(harness.text_facade(&[provider.clone()]));
    let record = hold_slot(&harness, &facade).await;

    let waiter = {
        let facade = facade.clone();
        tokio::spawn(async move { facade.generate(narration_params("bridge:1", "The bridge creaks.")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness
        .ledger
        .complete(&record, CompletionStatus::Failed)
        .await
        .unwrap());

    let result = waiter.await.unwrap();
    assert_generation_error(&result);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_waiter_times_out_on_stuck_owner() {
    let harness = Harness::new().with_config(
        GenerationConfig::development()
            .with_poll_interval(Duration::from_millis(10))
            .with_poll_max_attempts(3),
    );
    let provider = text_provider("local-text", ProviderTier::Local, "unused");
    let facade = harness.text_facade(&[provider.clone()]);
    let _record = hold_slot(&harness, &facade).await;

    let result = facade.generate(narration_params("bridge:1", "The bridge creaks.")).await;

    assert_timed_out(&result);
    assert_eq!(provider.calls(), 0);
    assert_eq!(harness.ledger.in_flight_count(), 1);
}

#[tokio::test]
async fn test_waiter_regenerates_when_completed_artifact_is_missing() {
    let harness = Harness::new();
    let provider = text_provider("local-text", ProviderTier::Local, "Planks groan underfoot.");
    let facade = Arc::new(harness.text_facade(&[provider.clone()]));
    let record = hold_slot(&harness, &facade).await;

    let waiter = {
        let facade = facade.clone();
        tokio::spawn(async move { facade.generate(narration_params("bridge:1", "The bridge creaks.")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    // Completed without ever writing the cache.
    assert!(harness
        .ledger
        .complete(&record, CompletionStatus::Completed)
        .await
        .unwrap());

    let outcome = waiter.await.unwrap().unwrap();
    assert_generated_by(&outcome, "local-text");
    assert_eq!(outcome.artifact.content.as_text(), Some("Planks groan underfoot."));
    assert_eq!(provider.calls(), 1);
    // Uncoordinated generation takes no new slot but still fills the cache.
    assert_eq!(harness.ledger.records().len(), 1);
    assert!(harness
        .cache
        .get(&outcome.artifact.fingerprint)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_waiter_reads_owner_result_from_cache() {
    let harness = Harness::new();
    let slow = Arc::new(
        ScriptedProvider::image("local-image", ProviderTier::Local, png_bytes(), "image/png")
            .with_delay(Duration::from_millis(150)),
    );
    let owner_facade = Arc::new(harness.image_facade(&[slow.clone()]));
    // A second process with its own provider that must never be reached.
    let unused = png_provider("pollinations", ProviderTier::Remote);
    let waiter_facade = harness.image_facade(&[unused.clone()]);

    let owner = {
        let facade = owner_facade.clone();
        tokio::spawn(async move { facade.generate(banner_params("ruined abbey")).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    let waited = waiter_facade.generate(banner_params("ruined abbey")).await.unwrap();
    let owned = owner.await.unwrap().unwrap();

    assert!(!owned.cached);
    assert!(waited.cached);
    assert_eq!(waited.artifact.id, owned.artifact.id);
    assert_eq!(slow.calls(), 1);
    assert_eq!(unused.calls(), 0);
}

// ============================================================================
// MISS / ACQUIRE WINDOW
// ============================================================================

/// Cache whose `nth` read takes its snapshot and then answers `lag` later.
struct LaggingCache {
    inner: Arc<MemoryCacheStore>,
    reads: AtomicUsize,
    nth: usize,
    lag: Duration,
}

#[async_trait]
impl CacheStore for LaggingCache {
    async fn get(&self, fingerprint: &Fingerprint) -> StorageResult<Option<CachedArtifact>> {
        let read = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = self.inner.get(fingerprint).await;
        if read == self.nth {
            tokio::time::sleep(self.lag).await;
        }
        snapshot
    }

    async fn put(&self, artifact: &CachedArtifact) -> StorageResult<CachedArtifact> {
        self.inner.put(artifact).await
    }
}

#[tokio::test]
async fn test_owner_finishing_before_late_acquire_is_not_regenerated() {
    let harness = Harness::new();
    let provider = Arc::new(
        ScriptedProvider::image("local-image", ProviderTier::Local, png_bytes(), "image/png")
            .with_delay(Duration::from_millis(100)),
    );
    let cache = Arc::new(LaggingCache {
        inner: harness.cache.clone(),
        reads: AtomicUsize::new(0),
        // Reads 1 and 2 are the first request's lookup and post-acquire check.
        nth: 3,
        lag: Duration::from_millis(300),
    });
    let deps = Collaborators::new(cache, harness.ledger.clone(), harness.styles.clone())
        .with_clock(harness.clock.clone());
    let facade = Arc::new(harness.facade(
        ImageStrategy::new(harness.blobs.clone()),
        deps,
        &[provider.clone()],
    ));

    let first = {
        let facade = facade.clone();
        tokio::spawn(async move { facade.generate(banner_params("castle at dusk")).await })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    // Misses the cache, then reaches the ledger after the first owner released it.
    let second = facade.generate(banner_params("castle at dusk")).await.unwrap();
    let first = first.await.unwrap().unwrap();

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(second.artifact.id, first.artifact.id);
    assert_eq!(provider.calls(), 1);
    assert_eq!(harness.blobs.len(), 1);
    assert_eq!(harness.ledger.in_flight_count(), 0);
    assert!(harness
        .ledger
        .records()
        .iter()
        .all(|r| r.status == RequestStatus::Completed));
}

// ============================================================================
// UNREADABLE RECORDS
// ============================================================================

/// Ledger that always reports the slot taken and answers status reads from
/// a script; an exhausted script reads as a connection failure.
struct ScriptedLedger {
    holder: RequestRecord,
    replies: Mutex<VecDeque<StorageResult<Option<RequestRecord>>>>,
    reads: AtomicUsize,
}

impl ScriptedLedger {
    fn new(holder: RequestRecord, replies: Vec<StorageResult<Option<RequestRecord>>>) -> Self {
        Self {
            holder,
            replies: Mutex::new(replies.into()),
            reads: AtomicUsize::new(0),
        }
    }

}

fn processing(holder: &RequestRecord) -> RequestRecord {
    RequestRecord {
        status: RequestStatus::Processing,
        ..holder.clone()
    }
}

fn ledger_down() -> StorageError {
    StorageError::ConnectionFailed {
        reason: "ledger offline".to_string(),
    }
}

#[async_trait]
impl RequestLedger for ScriptedLedger {
    async fn try_acquire(
        &self,
        _fingerprint: &Fingerprint,
        _kind: ArtifactKind,
    ) -> StorageResult<AcquireOutcome> {
        Ok(AcquireOutcome::AlreadyInFlight(self.holder.clone()))
    }

    async fn mark_processing(&self, record: &RequestRecord) -> StorageResult<RequestRecord> {
        Ok(record.clone())
    }

    async fn complete(
        &self,
        _record: &RequestRecord,
        _status: CompletionStatus,
    ) -> StorageResult<bool> {
        Ok(true)
    }

    async fn status(&self, _id: Uuid) -> StorageResult<Option<RequestRecord>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ledger_down()))
    }

    async fn reclaim_stale(&self, _max_age: Duration) -> StorageResult<u64> {
        Ok(0)
    }
}

fn polling_harness() -> Harness {
    Harness::new().with_config(
        GenerationConfig::development()
            .with_poll_interval(Duration::from_millis(5))
            .with_poll_max_attempts(3),
    )
}

/// A text facade waiting on `ledger`'s held slot for the bridge narration.
fn waiting_facade(
    harness: &Harness,
    provider: &Arc<ScriptedProvider>,
    replies: impl FnOnce(&RequestRecord) -> Vec<StorageResult<Option<RequestRecord>>>,
) -> (GenerationFacade<TextStrategy>, Arc<ScriptedLedger>) {
    let fingerprint = TextStrategy.fingerprint(&narration_params("bridge:1", "The bridge creaks."));
    let holder = RequestRecord::pending(fingerprint, ArtifactKind::Text, harness.clock.now());
    let script = replies(&holder);
    let ledger = Arc::new(ScriptedLedger::new(holder, script));
    let deps = Collaborators::new(harness.cache.clone(), ledger.clone(), harness.styles.clone())
        .with_clock(harness.clock.clone());
    (harness.facade(TextStrategy, deps, &[provider.clone()]), ledger)
}

fn assert_record_unavailable<T: std::fmt::Debug>(result: &ChimeraResult<T>) {
    assert!(
        matches!(
            result,
            Err(ChimeraError::Generation(GenerationError::Failed { reason, .. }))
                if reason == "request record unavailable"
        ),
        "Expected an unavailable-record failure, got {:?}",
        result
    );
}

#[tokio::test]
async fn test_unreadable_record_fails_after_poll_budget() {
    let harness = polling_harness();
    let provider = text_provider("local-text", ProviderTier::Local, "unused");
    let (facade, ledger) = waiting_facade(&harness, &provider, |_| Vec::new());

    let result = facade.generate(narration_params("bridge:1", "The bridge creaks.")).await;

    assert_record_unavailable(&result);
    // Every read error used an attempt; none ended the wait early.
    assert_eq!(ledger.reads.load(Ordering::SeqCst), 3);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_missing_record_fails_after_poll_budget() {
    let harness = polling_harness();
    let provider = text_provider("local-text", ProviderTier::Local, "unused");
    let (facade, ledger) = waiting_facade(&harness, &provider, |_| vec![Ok(None), Ok(None), Ok(None)]);

    let result = facade.generate(narration_params("bridge:1", "The bridge creaks.")).await;

    assert_record_unavailable(&result);
    assert_eq!(ledger.reads.load(Ordering::SeqCst), 3);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_last_read_decides_between_failed_and_timed_out() {
    let harness = polling_harness();
    let provider = text_provider("local-text", ProviderTier::Local, "unused");

    // In flight twice, then unreadable on the final attempt.
    let (facade, _) = waiting_facade(&harness, &provider, |holder| {
        vec![
            Ok(Some(processing(holder))),
            Ok(Some(processing(holder))),
            Err(ledger_down()),
        ]
    });
    let result = facade.generate(narration_params("bridge:1", "The bridge creaks.")).await;
    assert_record_unavailable(&result);

    // Unreadable first, still in flight on the final attempt.
    let (facade, _) = waiting_facade(&harness, &provider, |holder| {
        vec![Err(ledger_down()), Ok(None), Ok(Some(processing(holder)))]
    });
    let result = facade.generate(narration_params("bridge:1", "The bridge creaks.")).await;
    assert_timed_out(&result);

    assert_eq!(provider.calls(), 0);
}
