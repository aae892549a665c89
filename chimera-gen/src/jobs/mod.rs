//! Background Jobs
//!
//! - `ledger_sweep`: Reclaims ledger records abandoned by crashed requests
//!
//! # Usage
//!
//! ```ignore
//! use chimera_gen::jobs::{ledger_sweep_task, SweepConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(ledger_sweep_task(ledger, SweepConfig::from_env(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod ledger_sweep;

pub use ledger_sweep::{ledger_sweep_task, sweep_once, SweepConfig, SweepMetrics, SweepSnapshot};
