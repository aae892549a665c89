//! Chimera Ledger Sweeper Entry Point
//!
//! Runs the stale ledger sweep against PostgreSQL until interrupted.

use chimera_core::ChimeraResult;
use chimera_gen::jobs::{ledger_sweep_task, SweepConfig};
use chimera_gen::telemetry::{init_tracing, TelemetryConfig};
use chimera_storage::{DbConfig, PgStore, RequestLedger};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ChimeraResult<()> {
    init_tracing(&TelemetryConfig::from_env())?;

    let db_config = DbConfig::from_env();
    tracing::info!(host = %db_config.host, dbname = %db_config.dbname, "Connecting to database");
    let ledger: Arc<dyn RequestLedger> = Arc::new(PgStore::from_config(&db_config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(ledger_sweep_task(ledger, SweepConfig::from_env(), shutdown_rx));

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    match handle.await {
        Ok(metrics) => {
            let snapshot = metrics.snapshot();
            tracing::info!(
                records_reclaimed = snapshot.records_reclaimed,
                sweep_cycles = snapshot.sweep_cycles,
                "Sweeper stopped"
            );
        }
        Err(e) => tracing::error!(error = %e, "Sweep task aborted"),
    }
    Ok(())
}
