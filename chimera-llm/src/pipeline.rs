//! Ordered provider fallback.
//!
//! A [`ProviderPipeline`] holds providers in priority order, each with its
//! own [`RetryPolicy`]. A run walks them strictly one at a time: the first
//! success wins, every failure after retries produces a [`FallbackEvent`],
//! and the run fails only when the list is exhausted.

use crate::{GenerationProvider, Payload, ProviderTier, Shape};
use chimera_core::{FallbackEvent, FallbackRecorder, PipelineError, ProviderError};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// RETRY POLICY
// ============================================================================

/// Per-provider attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts against this provider before moving on (at least 1)
    pub max_attempts: u32,
    /// Hard bound on a single attempt
    pub attempt_timeout: Duration,
    /// Pause between attempts against the same provider
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            attempt_timeout: Duration::from_secs(60),
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, attempt_timeout: Duration, retry_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempt_timeout,
            retry_delay,
        }
    }

    /// One attempt bounded by `attempt_timeout`.
    pub fn single(attempt_timeout: Duration) -> Self {
        Self::new(1, attempt_timeout, Duration::ZERO)
    }

    /// Delay before the next attempt after `error`.
    ///
    /// A rate-limit hint longer than the configured delay is honoured, but
    /// never beyond one attempt timeout.
    fn delay_after(&self, error: &ProviderError) -> Duration {
        match error {
            ProviderError::RateLimited { retry_after_ms, .. } if *retry_after_ms > 0 => {
                let hinted = Duration::from_millis(*retry_after_ms as u64);
                hinted.max(self.retry_delay).min(self.attempt_timeout)
            }
            _ => self.retry_delay,
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// A provider and its retry policy.
#[derive(Clone)]
pub struct PipelineEntry {
    pub provider: Arc<dyn GenerationProvider>,
    pub policy: RetryPolicy,
}

impl std::fmt::Debug for PipelineEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineEntry")
            .field("provider", &self.provider.name())
            .field("tier", &self.provider.tier())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Result of a successful pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    pub payload: Payload,
    /// Provider that produced the payload
    pub provider: String,
    /// Providers that failed earlier in this run, in order
    pub failed_providers: Vec<String>,
}

/// Ordered list of providers for one artifact kind.
#[derive(Clone)]
pub struct ProviderPipeline {
    label: String,
    entries: Vec<PipelineEntry>,
    recorder: Option<Arc<dyn FallbackRecorder>>,
}

impl std::fmt::Debug for ProviderPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderPipeline")
            .field("label", &self.label)
            .field("entries", &self.entries)
            .field("recorder", &self.recorder.is_some())
            .finish()
    }
}

impl ProviderPipeline {
    /// Create an empty pipeline. `label` names the artifact kind in errors.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entries: Vec::new(),
            recorder: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn GenerationProvider>, policy: RetryPolicy) -> Self {
        self.push(provider, policy);
        self
    }

    pub fn push(&mut self, provider: Arc<dyn GenerationProvider>, policy: RetryPolicy) {
        self.entries.push(PipelineEntry { provider, policy });
    }

    /// Persist fallback events through `recorder` in addition to logging them.
    pub fn with_recorder(mut self, recorder: Arc<dyn FallbackRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Provider names in configured order.
    pub fn provider_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.provider.name().to_string())
            .collect()
    }

    /// Entries in the order a run will try them.
    ///
    /// With a preferred tier, entries of that tier move to the front; the
    /// relative order within each tier is kept.
    pub fn ordered(&self, prefer: Option<ProviderTier>) -> Vec<&PipelineEntry> {
        let mut ordered: Vec<&PipelineEntry> = self.entries.iter().collect();
        if let Some(tier) = prefer {
            ordered.sort_by_key(|e| e.provider.tier() != tier);
        }
        ordered
    }

    /// Run the pipeline for `prompt`.
    pub async fn run(
        &self,
        prompt: &str,
        shape: &Shape,
        prefer: Option<ProviderTier>,
    ) -> Result<PipelineOutput, PipelineError> {
        let ordered = self.ordered(prefer);
        if ordered.is_empty() {
            return Err(PipelineError::NoProviders {
                kind: self.label.clone(),
            });
        }

        let mut failed_providers = Vec::new();
        let mut last_error = String::new();

        for (index, entry) in ordered.iter().enumerate() {
            let name = entry.provider.name();
            match self.attempt(entry, prompt, shape).await {
                Ok(payload) => {
                    tracing::info!(
                        pipeline = %self.label,
                        provider = %name,
                        failed_before = failed_providers.len(),
                        "Generation succeeded"
                    );
                    return Ok(PipelineOutput {
                        payload,
                        provider: name.to_string(),
                        failed_providers,
                    });
                }
                Err(e) => {
                    let next = ordered.get(index + 1).map(|n| n.provider.name().to_string());
                    self.fallback(FallbackEvent::new(name, next, e.to_string(), prompt))
                        .await;
                    failed_providers.push(name.to_string());
                    last_error = e.to_string();
                }
            }
        }

        tracing::error!(
            pipeline = %self.label,
            attempted = ?failed_providers,
            last_error = %last_error,
            "All providers failed"
        );
        Err(PipelineError::AllProvidersFailed {
            attempted: failed_providers,
            last_error,
        })
    }

    /// Try one provider under its policy.
    async fn attempt(
        &self,
        entry: &PipelineEntry,
        prompt: &str,
        shape: &Shape,
    ) -> Result<Payload, ProviderError> {
        let provider = &entry.provider;
        let policy = entry.policy;
        let mut attempt = 1;

        loop {
            let result = match tokio::time::timeout(
                policy.attempt_timeout,
                provider.generate(prompt, shape, policy.attempt_timeout),
            )
            .await
            {
                Ok(result) => result.and_then(|payload| check_payload(provider.name(), shape, payload)),
                Err(_) => Err(ProviderError::Timeout {
                    provider: provider.name().to_string(),
                    timeout_ms: policy.attempt_timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(payload) => return Ok(payload),
                Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                    let delay = policy.delay_after(&e);
                    tracing::debug!(
                        provider = %provider.name(),
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fallback(&self, event: FallbackEvent) {
        tracing::warn!(
            from_provider = %event.from_provider,
            to_provider = event.to_provider.as_deref().unwrap_or("none"),
            reason = %event.reason,
            prompt_preview = %event.prompt_preview,
            "Provider fallback"
        );
        if let Some(recorder) = &self.recorder {
            if let Err(e) = recorder.record(&event).await {
                tracing::warn!(error = %e, "Failed to persist fallback event");
            }
        }
    }
}

/// Reject payloads that do not match the requested shape.
fn check_payload(provider: &str, shape: &Shape, payload: Payload) -> Result<Payload, ProviderError> {
    let invalid = |reason: &str| ProviderError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.to_string(),
    };
    match (shape, &payload) {
        (Shape::Image { .. }, Payload::Bytes { data, .. }) if data.is_empty() => {
            Err(invalid("empty image body"))
        }
        (Shape::Image { .. }, Payload::Bytes { .. }) => Ok(payload),
        (Shape::Text { .. }, Payload::Text(text)) if text.trim().is_empty() => {
            Err(invalid("empty text"))
        }
        (Shape::Text { .. }, Payload::Text(_)) => Ok(payload),
        (shape, _) => Err(invalid(&format!("payload does not match {} shape", shape.name()))),
    }
}
