//! Chimera Core - Domain Types
//!
//! Artifact parameters, fingerprints, ledger records, style bundles and the
//! error taxonomy shared by every other crate. No I/O happens here.

pub mod artifact;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod fallback;
pub mod fingerprint;
pub mod ledger;
pub mod style;

use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub use artifact::{
    ArtifactContent, ArtifactKind, ArtifactMetadata, CachedArtifact, GenerationContext,
    ImageContextType, ImageDimensions, ImageParams, ParseEnumError, TextParams, TextType,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{env_flag, env_parse, GenerationConfig};
pub use error::{
    ChimeraError, ChimeraResult, ConfigError, GenerationError, PipelineError, ProviderError,
    StorageError, StyleError,
};
pub use fallback::{prompt_preview, FallbackEvent, FallbackRecorder};
pub use fingerprint::{normalize_prompt, Fingerprint, FingerprintBuilder, FINGERPRINT_VERSION};
pub use ledger::{AcquireOutcome, CompletionStatus, RequestRecord, RequestStatus};
pub use style::{ActiveStyle, ImageStyle, StyleBundle, StyleVersion, TextStyle};
