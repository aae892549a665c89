//! Stale Ledger Sweep Background Task
//!
//! A request that crashes while holding a ledger slot leaves a `pending` or
//! `processing` record behind, and every later request for the same
//! fingerprint would wait on it until its poll budget ran out. This task
//! periodically forces such records to `failed` so the slot can be acquired
//! again.
//!
//! The sweep never runs on the request path.
//!
//! # Configuration
//!
//! ```rust
//! use chimera_gen::jobs::SweepConfig;
//! use std::time::Duration;
//!
//! let config = SweepConfig {
//!     check_interval: Duration::from_secs(60), // Sweep every minute
//!     stale_after: Duration::from_secs(3600),  // Reclaim after 1 hour
//!     log_reclaims: true,
//! };
//! ```

use chimera_core::constants::{DEFAULT_STALE_AFTER_SECS, DEFAULT_SWEEP_CHECK_INTERVAL_SECS};
use chimera_core::{env_flag, env_parse};
use chimera_storage::RequestLedger;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the stale ledger sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    /// How often to sweep (default: 60 seconds)
    pub check_interval: Duration,

    /// Non-terminal records whose `started_at` (or `created_at` when never
    /// started) is older than this are reclaimed (default: 1 hour)
    pub stale_after: Duration,

    /// Whether to log each cycle that reclaims records (default: true)
    pub log_reclaims: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_SWEEP_CHECK_INTERVAL_SECS),
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
            log_reclaims: true,
        }
    }
}

impl SweepConfig {
    /// Create SweepConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `CHIMERA_SWEEP_CHECK_INTERVAL_SECS`: How often to sweep (default: 60)
    /// - `CHIMERA_SWEEP_STALE_AFTER_SECS`: Staleness threshold (default: 3600)
    /// - `CHIMERA_SWEEP_LOG_RECLAIMS`: Whether to log reclaims (default: true)
    pub fn from_env() -> Self {
        Self {
            check_interval: Duration::from_secs(env_parse(
                "CHIMERA_SWEEP_CHECK_INTERVAL_SECS",
                DEFAULT_SWEEP_CHECK_INTERVAL_SECS,
            )),
            stale_after: Duration::from_secs(env_parse(
                "CHIMERA_SWEEP_STALE_AFTER_SECS",
                DEFAULT_STALE_AFTER_SECS,
            )),
            log_reclaims: env_flag("CHIMERA_SWEEP_LOG_RECLAIMS", true),
        }
    }

    /// Short intervals for development and tests.
    pub fn development() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
            stale_after: Duration::from_secs(120),
            log_reclaims: true,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for sweep activity since startup.
#[derive(Debug, Default)]
pub struct SweepMetrics {
    /// Records forced to `failed`
    pub records_reclaimed: AtomicU64,

    /// Completed sweep cycles
    pub sweep_cycles: AtomicU64,

    /// Cycles that failed to reach the ledger
    pub sweep_errors: AtomicU64,
}

impl SweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SweepSnapshot {
        SweepSnapshot {
            records_reclaimed: self.records_reclaimed.load(Ordering::Relaxed),
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
            sweep_errors: self.sweep_errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sweep metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSnapshot {
    pub records_reclaimed: u64,
    pub sweep_cycles: u64,
    pub sweep_errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that periodically reclaims stale ledger records.
///
/// Runs until `true` is sent on `shutdown_rx` (or the sender is dropped)
/// and returns the metrics collected over its lifetime.
///
/// # Example
///
/// ```ignore
/// use tokio::sync::watch;
///
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(ledger_sweep_task(ledger, SweepConfig::from_env(), shutdown_rx));
///
/// // Later, trigger shutdown
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn ledger_sweep_task(
    ledger: Arc<dyn RequestLedger>,
    config: SweepConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweepMetrics> {
    let metrics = Arc::new(SweepMetrics::new());

    let mut sweep_interval = interval(config.check_interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        check_interval_secs = config.check_interval.as_secs(),
        stale_after_secs = config.stale_after.as_secs(),
        "Ledger sweep task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Ledger sweep task shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                sweep_once(ledger.as_ref(), &config, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        records_reclaimed = snapshot.records_reclaimed,
        sweep_cycles = snapshot.sweep_cycles,
        sweep_errors = snapshot.sweep_errors,
        "Ledger sweep task completed"
    );

    metrics
}

/// Perform one sweep cycle.
pub async fn sweep_once(ledger: &dyn RequestLedger, config: &SweepConfig, metrics: &SweepMetrics) {
    metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);

    match ledger.reclaim_stale(config.stale_after).await {
        Ok(0) => tracing::trace!("Ledger sweep found no stale records"),
        Ok(count) => {
            metrics.records_reclaimed.fetch_add(count, Ordering::Relaxed);
            if config.log_reclaims {
                tracing::warn!(
                    reclaimed = count,
                    stale_after_secs = config.stale_after.as_secs(),
                    "Reclaimed stale generation requests"
                );
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Ledger sweep failed");
            metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}
