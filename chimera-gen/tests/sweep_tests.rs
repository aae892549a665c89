//! Crash recovery: a dangling ledger record blocks its fingerprint until the
//! sweep reclaims it.

use chimera_core::{AcquireOutcome, ArtifactKind, RequestStatus};
use chimera_gen::jobs::{sweep_once, SweepConfig, SweepMetrics};
use chimera_gen::ArtifactStrategy;
use chimera_storage::RequestLedger;
use chimera_test_utils::assertions::{assert_generated_by, assert_timed_out};
use chimera_test_utils::fixtures::banner_params;
use chimera_test_utils::{png_provider, GenerationConfig, Harness, ProviderTier};
use std::time::Duration;

#[tokio::test]
async fn test_stale_record_is_reclaimed_and_slot_reacquired() {
    let harness = Harness::new().with_config(
        GenerationConfig::development()
            .with_poll_interval(Duration::from_millis(5))
            .with_poll_max_attempts(4),
    );
    let provider = png_provider("local-image", ProviderTier::Local);
    let facade = harness.image_facade(&[provider.clone()]);
    let params = banner_params("collapsed mine");
    let fingerprint = facade.strategy().fingerprint(&params);

    // A process took the slot, started work and died.
    let AcquireOutcome::Acquired(crashed) = harness
        .ledger
        .try_acquire(&fingerprint, ArtifactKind::Image)
        .await
        .unwrap()
    else {
        panic!("slot unexpectedly held");
    };
    harness.ledger.mark_processing(&crashed).await.unwrap();

    // Until reclaimed, requests can only wait.
    assert_timed_out(&facade.generate(params.clone()).await);
    assert_eq!(provider.calls(), 0);

    let config = SweepConfig {
        stale_after: Duration::from_secs(600),
        ..SweepConfig::default()
    };
    let metrics = SweepMetrics::new();

    // Too young to reclaim.
    harness.clock.advance(Duration::from_secs(300));
    sweep_once(harness.ledger.as_ref(), &config, &metrics).await;
    assert_eq!(metrics.snapshot().records_reclaimed, 0);

    harness.clock.advance(Duration::from_secs(301));
    sweep_once(harness.ledger.as_ref(), &config, &metrics).await;
    assert_eq!(metrics.snapshot().records_reclaimed, 1);
    let reclaimed = harness.ledger.status(crashed.id).await.unwrap().unwrap();
    assert_eq!(reclaimed.status, RequestStatus::Failed);

    let outcome = facade.generate(params).await.unwrap();
    assert_generated_by(&outcome, "local-image");
    assert_eq!(provider.calls(), 1);
    assert_eq!(harness.ledger.in_flight_count(), 0);
}

#[tokio::test]
async fn test_sweep_counts_ledger_errors() {
    let ledger = chimera_test_utils::UnavailableLedger;
    let metrics = SweepMetrics::new();

    sweep_once(&ledger, &SweepConfig::default(), &metrics).await;

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.sweep_cycles, 1);
    assert_eq!(snapshot.sweep_errors, 1);
    assert_eq!(snapshot.records_reclaimed, 0);
}
