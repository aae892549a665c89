//! Property-Based Tests for the Request Ledger
//!
//! Property: for any interleaving of acquire / complete / reclaim operations,
//! at most one non-terminal record SHALL exist per (fingerprint, kind), and a
//! slot SHALL be acquirable again once its record is terminal.

use chimera_core::{
    AcquireOutcome, ArtifactKind, CompletionStatus, Fingerprint, ManualClock, RequestStatus,
};
use chimera_storage::{MemoryLedger, RequestLedger};
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Op {
    Acquire { slot: usize, kind: ArtifactKind },
    Complete { slot: usize, kind: ArtifactKind, ok: bool },
    Advance { secs: u64 },
    Reclaim,
}

fn arb_kind() -> impl Strategy<Value = ArtifactKind> {
    prop_oneof![Just(ArtifactKind::Image), Just(ArtifactKind::Text)]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..3, arb_kind()).prop_map(|(slot, kind)| Op::Acquire { slot, kind }),
        3 => (0usize..3, arb_kind(), any::<bool>())
            .prop_map(|(slot, kind, ok)| Op::Complete { slot, kind, ok }),
        2 => (0u64..2400).prop_map(|secs| Op::Advance { secs }),
        1 => Just(Op::Reclaim),
    ]
}

fn fingerprint(slot: usize) -> Fingerprint {
    Fingerprint::from_stored(format!("{:064x}", slot))
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_single_in_flight_record_per_slot(ops in prop::collection::vec(arb_op(), 1..40)) {
        runtime().block_on(async {
            let clock = Arc::new(ManualClock::starting_now());
            let ledger = MemoryLedger::with_clock(clock.clone());
            let mut owned = HashMap::new();

            for op in ops {
                match op {
                    Op::Acquire { slot, kind } => {
                        let outcome = ledger.try_acquire(&fingerprint(slot), kind).await.unwrap();
                        if let AcquireOutcome::Acquired(record) = outcome {
                            owned.insert((slot, kind), record);
                        }
                    }
                    Op::Complete { slot, kind, ok } => {
                        if let Some(record) = owned.remove(&(slot, kind)) {
                            let status = if ok { CompletionStatus::Completed } else { CompletionStatus::Failed };
                            ledger.complete(&record, status).await.unwrap();
                        }
                    }
                    Op::Advance { secs } => clock.advance(Duration::from_secs(secs)),
                    Op::Reclaim => {
                        ledger.reclaim_stale(Duration::from_secs(3600)).await.unwrap();
                    }
                }

                let mut live: HashMap<(Fingerprint, ArtifactKind), usize> = HashMap::new();
                for record in ledger.records() {
                    if !record.status.is_terminal() {
                        *live.entry((record.fingerprint.clone(), record.kind)).or_default() += 1;
                    }
                }
                prop_assert!(live.values().all(|&n| n == 1));
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_acquires_yield_one_owner() {
    let ledger = Arc::new(MemoryLedger::new());
    let fp = fingerprint(7);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let ledger = ledger.clone();
            let fp = fp.clone();
            tokio::spawn(async move { ledger.try_acquire(&fp, ArtifactKind::Image).await })
        })
        .collect();

    let mut acquired = 0;
    let mut waiting_on = Vec::new();
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            AcquireOutcome::Acquired(record) => {
                acquired += 1;
                waiting_on.push(record.id);
            }
            AcquireOutcome::AlreadyInFlight(record) => waiting_on.push(record.id),
        }
    }
    assert_eq!(acquired, 1);
    waiting_on.dedup();
    assert_eq!(waiting_on.len(), 1);
}

#[tokio::test]
async fn test_reclaimed_slot_can_be_reacquired() {
    let clock = Arc::new(ManualClock::starting_now());
    let ledger = MemoryLedger::with_clock(clock.clone());
    let fp = fingerprint(1);

    let AcquireOutcome::Acquired(stuck) = ledger.try_acquire(&fp, ArtifactKind::Image).await.unwrap() else {
        panic!("expected acquire");
    };
    ledger.mark_processing(&stuck).await.unwrap();
    clock.advance(Duration::from_secs(3601));

    assert_eq!(ledger.reclaim_stale(Duration::from_secs(3600)).await.unwrap(), 1);
    assert_eq!(
        ledger.status(stuck.id).await.unwrap().unwrap().status,
        RequestStatus::Failed
    );
    assert!(matches!(
        ledger.try_acquire(&fp, ArtifactKind::Image).await.unwrap(),
        AcquireOutcome::Acquired(_)
    ));
}
