//! Provider fallback events.

use crate::constants::PROMPT_PREVIEW_CHARS;
use crate::{StorageError, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A provider failed and the pipeline moved on.
///
/// `to_provider` is `None` when the failing provider was the last one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackEvent {
    pub from_provider: String,
    pub to_provider: Option<String>,
    pub reason: String,
    pub prompt_preview: String,
    pub occurred_at: Timestamp,
}

impl FallbackEvent {
    pub fn new(
        from_provider: impl Into<String>,
        to_provider: Option<String>,
        reason: impl Into<String>,
        prompt: &str,
    ) -> Self {
        Self {
            from_provider: from_provider.into(),
            to_provider,
            reason: reason.into(),
            prompt_preview: prompt_preview(prompt),
            occurred_at: chrono::Utc::now(),
        }
    }
}

/// First `PROMPT_PREVIEW_CHARS` characters of a prompt, cut on a char boundary.
pub fn prompt_preview(prompt: &str) -> String {
    prompt.chars().take(PROMPT_PREVIEW_CHARS).collect()
}

/// Sink for fallback events. Callers treat errors as non-fatal.
#[async_trait]
pub trait FallbackRecorder: Send + Sync {
    async fn record(&self, event: &FallbackEvent) -> Result<(), StorageError>;
}
