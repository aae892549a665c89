//! Error types for Chimera generation operations

use thiserror::Error;
use uuid::Uuid;

/// Storage layer errors (relational store, blob store).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Query failed during {operation}: {reason}")]
    QueryFailed { operation: String, reason: String },

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Serialization failed for {entity}: {reason}")]
    SerializationFailed { entity: String, reason: String },

    #[error("Blob write failed for {key}: {reason}")]
    BlobWriteFailed { key: String, reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// Shorthand for a failed query.
    pub fn query(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self::QueryFailed {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised by a single generation backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider {provider} is not configured: {reason}")]
    NotConfigured { provider: String, reason: String },

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: i64,
    },

    #[error("Request to {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} cannot produce {shape} output")]
    UnsupportedShape { provider: String, shape: String },
}

impl ProviderError {
    /// Name of the provider that raised this error.
    pub fn provider(&self) -> &str {
        match self {
            Self::NotConfigured { provider, .. }
            | Self::RequestFailed { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::InvalidResponse { provider, .. }
            | Self::UnsupportedShape { provider, .. } => provider,
        }
    }

    /// Whether another attempt against the same provider may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::RateLimited { .. } => true,
            Self::RequestFailed { status, .. } => *status == 0 || *status >= 500,
            Self::InvalidResponse { .. } => true,
            Self::NotConfigured { .. } | Self::UnsupportedShape { .. } => false,
        }
    }
}

/// Errors raised by the provider pipeline as a whole.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("No providers configured for {kind} generation")]
    NoProviders { kind: String },

    #[error("All providers failed (attempted: {attempted:?}): {last_error}")]
    AllProvidersFailed {
        attempted: Vec<String>,
        last_error: String,
    },
}

impl From<PipelineError> for GenerationError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NoProviders { kind } => GenerationError::AllProvidersFailed {
                attempted: Vec::new(),
                last_error: format!("no providers configured for {}", kind),
            },
            PipelineError::AllProvidersFailed {
                attempted,
                last_error,
            } => GenerationError::AllProvidersFailed {
                attempted,
                last_error,
            },
        }
    }
}

/// Terminal outcomes of a generation request as seen by callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("All providers failed (attempted: {attempted:?}): {last_error}")]
    AllProvidersFailed {
        attempted: Vec<String>,
        last_error: String,
    },

    #[error("Timed out waiting for in-flight generation {fingerprint} after {attempts} polls")]
    TimedOut { fingerprint: String, attempts: u32 },

    #[error("Generation failed for {fingerprint}: {reason}")]
    Failed { fingerprint: String, reason: String },

    #[error("Invalid generation request, {field}: {reason}")]
    InvalidRequest { field: String, reason: String },
}

/// Style version management errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StyleError {
    #[error("Style version not found: {version_id}")]
    VersionNotFound { version_id: Uuid },

    #[error("Expected exactly one active style version, found {active_count}")]
    ExclusivityViolated { active_count: usize },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Provider not supported: {provider}")]
    ProviderNotSupported { provider: String },
}

/// Master error type for all Chimera errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChimeraError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Style error: {0}")]
    Style(#[from] StyleError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl ChimeraError {
    /// True for errors that originate in the persistence layer.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result type alias for Chimera operations.
pub type ChimeraResult<T> = Result<T, ChimeraError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_query_failed() {
        let err = StorageError::query("ledger_acquire", "connection reset");
        let msg = format!("{}", err);
        assert!(msg.contains("ledger_acquire"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_provider_error_display_timeout() {
        let err = ProviderError::Timeout {
            provider: "local-image".to_string(),
            timeout_ms: 120_000,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("local-image"));
        assert!(msg.contains("120000"));
        assert_eq!(err.provider(), "local-image");
    }

    #[test]
    fn test_provider_error_transience() {
        let server = ProviderError::RequestFailed {
            provider: "pollinations".to_string(),
            status: 503,
            message: "unavailable".to_string(),
        };
        let client = ProviderError::RequestFailed {
            provider: "pollinations".to_string(),
            status: 400,
            message: "bad prompt".to_string(),
        };
        let unconfigured = ProviderError::NotConfigured {
            provider: "gemini".to_string(),
            reason: "missing api key".to_string(),
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
        assert!(!unconfigured.is_transient());
    }

    #[test]
    fn test_generation_error_display_all_providers_failed() {
        let err = GenerationError::AllProvidersFailed {
            attempted: vec!["local-image".to_string(), "pollinations".to_string()],
            last_error: "status 502".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("All providers failed"));
        assert!(msg.contains("pollinations"));
        assert!(msg.contains("status 502"));
    }

    #[test]
    fn test_pipeline_error_converts_to_all_providers_failed() {
        let err: GenerationError = PipelineError::NoProviders {
            kind: "image".to_string(),
        }
        .into();
        match err {
            GenerationError::AllProvidersFailed { attempted, last_error } => {
                assert!(attempted.is_empty());
                assert!(last_error.contains("no providers configured"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_style_error_display_exclusivity() {
        let err = StyleError::ExclusivityViolated { active_count: 2 };
        assert!(format!("{}", err).contains("found 2"));
    }

    #[test]
    fn test_chimera_error_from_variants() {
        let storage = ChimeraError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, ChimeraError::Storage(_)));
        assert!(storage.is_storage());

        let generation = ChimeraError::from(GenerationError::TimedOut {
            fingerprint: "abc".to_string(),
            attempts: 30,
        });
        assert!(matches!(generation, ChimeraError::Generation(_)));
        assert!(!generation.is_storage());

        let style = ChimeraError::from(StyleError::VersionNotFound {
            version_id: Uuid::nil(),
        });
        assert!(matches!(style, ChimeraError::Style(_)));

        let config = ChimeraError::from(ConfigError::ProviderNotSupported {
            provider: "dalle".to_string(),
        });
        assert!(matches!(config, ChimeraError::Config(_)));
    }
}
