//! Chimera Gen - Coalesced Artifact Generation
//!
//! Ties the storage and provider crates together: a generic
//! [`GenerationFacade`] parameterized by an [`ArtifactStrategy`] per kind,
//! the prompt builders, the degraded placeholder, the stale ledger sweep and
//! telemetry bootstrap.

pub mod facade;
pub mod jobs;
pub mod placeholder;
pub mod prompt;
pub mod service;
pub mod strategy;
pub mod telemetry;

pub use facade::{Collaborators, GenerationFacade, GenerationOutcome};
pub use jobs::{ledger_sweep_task, SweepConfig, SweepMetrics, SweepSnapshot};
pub use placeholder::{placeholder_svg, PLACEHOLDER_CONTENT_TYPE, PLACEHOLDER_PROVIDER};
pub use prompt::{build_image_prompt, build_text_prompt};
pub use service::{GenerationRequest, GenerationService};
pub use strategy::{ArtifactStrategy, ImageStrategy, TextStrategy};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
