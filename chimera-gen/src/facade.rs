//! Coalesced, cached, multi-provider generation.
//!
//! One [`GenerationFacade`] per artifact kind drives each request through
//! `checking-cache -> acquiring -> generating | waiting -> done | failed`:
//!
//! 1. A cache hit returns immediately.
//! 2. On a miss the request tries to acquire the ledger slot for its
//!    fingerprint, then checks the cache once more in case a previous owner
//!    finished in between. The owner renders the prompt from the active
//!    style, runs the provider pipeline, caches the result and releases the
//!    slot.
//! 3. A request that finds the slot taken polls the ledger until the owner
//!    finishes, then reads the cache.
//!
//! Coordination is fail-open: if the ledger cannot be reached the request
//! generates on its own, and cache errors degrade to misses.

use crate::strategy::ArtifactStrategy;
use crate::placeholder::PLACEHOLDER_PROVIDER;
use chimera_core::{
    AcquireOutcome, ArtifactContent, ArtifactMetadata, CachedArtifact, ChimeraResult, Clock,
    CompletionStatus, Fingerprint, GenerationConfig, GenerationError, RequestRecord,
    RequestStatus, SystemClock, Timestamp,
};
use chimera_llm::ProviderPipeline;
use chimera_storage::{CacheStore, RequestLedger, StyleConfigProvider};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info_span, Instrument};
use uuid::Uuid;

// ============================================================================
// TYPES
// ============================================================================

/// Result handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub artifact: CachedArtifact,
    /// Served from the cache rather than generated by this request
    pub cached: bool,
    /// A placeholder substituted for a failed generation
    pub degraded: bool,
}

/// Shared storage collaborators for every facade in a process.
#[derive(Clone)]
pub struct Collaborators {
    pub cache: Arc<dyn CacheStore>,
    pub ledger: Arc<dyn RequestLedger>,
    pub styles: Arc<StyleConfigProvider>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        ledger: Arc<dyn RequestLedger>,
        styles: Arc<StyleConfigProvider>,
    ) -> Self {
        Self {
            cache,
            ledger,
            styles,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("styles", &self.styles)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// FACADE
// ============================================================================

/// Generation entry point for one artifact kind.
pub struct GenerationFacade<S: ArtifactStrategy> {
    strategy: S,
    deps: Collaborators,
    pipeline: ProviderPipeline,
    config: GenerationConfig,
}

impl<S: ArtifactStrategy + std::fmt::Debug> std::fmt::Debug for GenerationFacade<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationFacade")
            .field("kind", &S::KIND)
            .field("strategy", &self.strategy)
            .field("pipeline", &self.pipeline)
            .field("config", &self.config)
            .finish()
    }
}

impl<S: ArtifactStrategy> GenerationFacade<S> {
    pub fn new(
        strategy: S,
        deps: Collaborators,
        pipeline: ProviderPipeline,
        config: GenerationConfig,
    ) -> Self {
        if pipeline.is_empty() {
            tracing::warn!(
                kind = %S::KIND.as_db_str(),
                "No providers configured, every request will fail or degrade"
            );
        }
        Self {
            strategy,
            deps,
            pipeline,
            config,
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn pipeline(&self) -> &ProviderPipeline {
        &self.pipeline
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Return the artifact for `params`, generating it at most once across
    /// concurrent callers.
    pub async fn generate(&self, params: S::Params) -> ChimeraResult<GenerationOutcome> {
        self.strategy.validate(&params)?;
        let fingerprint = self.strategy.fingerprint(&params);
        let span = info_span!(
            "generate",
            kind = S::KIND.as_db_str(),
            fingerprint = %fingerprint.short()
        );
        self.run(params, fingerprint).instrument(span).await
    }

    async fn run(
        &self,
        params: S::Params,
        fingerprint: Fingerprint,
    ) -> ChimeraResult<GenerationOutcome> {
        if let Some(artifact) = self.deps.cache.lookup(&fingerprint, self.now()).await {
            tracing::debug!("Cache hit");
            return Ok(cached(artifact));
        }

        match self.deps.ledger.try_acquire(&fingerprint, S::KIND).await {
            Ok(AcquireOutcome::Acquired(record)) => {
                tracing::debug!(request_id = %record.id, "Ledger slot acquired");
                // A previous owner may have finished between our miss and the acquire.
                if let Some(artifact) = self.deps.cache.lookup(&fingerprint, self.now()).await {
                    tracing::debug!(request_id = %record.id, "Cache filled before acquire");
                    self.release(Some(&record), CompletionStatus::Completed).await;
                    return Ok(cached(artifact));
                }
                self.generate_owned(&params, &fingerprint, Some(record)).await
            }
            Ok(AcquireOutcome::AlreadyInFlight(record)) => {
                tracing::debug!(request_id = %record.id, "Generation already in flight, waiting");
                self.wait_for(&params, &fingerprint, record).await
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Ledger unavailable, generating without coordination"
                );
                self.generate_owned(&params, &fingerprint, None).await
            }
        }
    }

    /// Generate as the owner of `record` (or uncoordinated when `None`).
    async fn generate_owned(
        &self,
        params: &S::Params,
        fingerprint: &Fingerprint,
        record: Option<RequestRecord>,
    ) -> ChimeraResult<GenerationOutcome> {
        let record = match record {
            Some(record) => Some(self.mark_processing(record).await),
            None => None,
        };

        let style = self.deps.styles.get_active().await;
        let prompt = self.strategy.prompt(params, &style.bundle);
        let shape = self.strategy.shape(params, &style.bundle);
        let prefer = self.strategy.preferred_tier(params);

        let generated = match self.pipeline.run(&prompt, &shape, prefer).await {
            Ok(output) => self
                .strategy
                .persist(fingerprint, params, output.payload)
                .await
                .map(|content| (content, output.provider, output.failed_providers)),
            Err(e) => Err(GenerationError::from(e)),
        };

        match generated {
            Ok((content, provider, failed_providers)) => {
                let now = self.now();
                let artifact = CachedArtifact {
                    id: Uuid::now_v7(),
                    fingerprint: fingerprint.clone(),
                    kind: S::KIND,
                    content,
                    metadata: ArtifactMetadata {
                        provider,
                        style_version_id: style.version_id,
                        generated_at: now,
                        failed_providers,
                    },
                    created_at: now,
                    expires_at: expires_at(now, self.config.artifact_ttl),
                };
                let stored = self.deps.cache.insert(artifact).await;
                self.release(record.as_ref(), CompletionStatus::Completed).await;
                tracing::info!(provider = %stored.metadata.provider, "Artifact generated");
                Ok(GenerationOutcome {
                    artifact: stored,
                    cached: false,
                    degraded: false,
                })
            }
            Err(e) => {
                self.release(record.as_ref(), CompletionStatus::Failed).await;
                match self.strategy.degraded(params) {
                    Some(content) => {
                        tracing::warn!(
                            error = %e,
                            "Generation failed, serving placeholder"
                        );
                        Ok(self.placeholder(fingerprint, content, style.version_id))
                    }
                    None => {
                        tracing::error!(error = %e, "Generation failed");
                        Err(e.into())
                    }
                }
            }
        }
    }

    /// Poll the ledger until another request's attempt finishes.
    async fn wait_for(
        &self,
        params: &S::Params,
        fingerprint: &Fingerprint,
        record: RequestRecord,
    ) -> ChimeraResult<GenerationOutcome> {
        let attempts = self.config.poll_max_attempts.max(1);
        let mut last_seen = Some(record.status);

        for attempt in 1..=attempts {
            tokio::time::sleep(self.config.poll_interval).await;

            match self.deps.ledger.status(record.id).await {
                Ok(Some(current)) => {
                    last_seen = Some(current.status);
                    match current.status {
                        RequestStatus::Completed => {
                            if let Some(artifact) =
                                self.deps.cache.lookup(fingerprint, self.now()).await
                            {
                                tracing::debug!(attempt, "In-flight generation completed");
                                return Ok(cached(artifact));
                            }
                            // The owner finished but its cache write was lost.
                            tracing::warn!(
                                request_id = %record.id,
                                "Completed generation missing from cache, regenerating"
                            );
                            return self.generate_owned(params, fingerprint, None).await;
                        }
                        RequestStatus::Failed => {
                            return Err(GenerationError::Failed {
                                fingerprint: fingerprint.to_string(),
                                reason: "in-flight generation failed".to_string(),
                            }
                            .into());
                        }
                        RequestStatus::Pending | RequestStatus::Processing => {
                            tracing::trace!(attempt, status = %current.status, "Still in flight");
                        }
                    }
                }
                Ok(None) => {
                    last_seen = None;
                    tracing::debug!(attempt, request_id = %record.id, "Request record not found");
                }
                Err(e) => {
                    last_seen = None;
                    tracing::warn!(
                        attempt,
                        error = %e,
                        request_id = %record.id,
                        "Failed to read request status"
                    );
                }
            }
        }

        match last_seen {
            Some(_) => {
                tracing::warn!(attempts, "Gave up waiting for in-flight generation");
                Err(GenerationError::TimedOut {
                    fingerprint: fingerprint.to_string(),
                    attempts,
                }
                .into())
            }
            None => Err(GenerationError::Failed {
                fingerprint: fingerprint.to_string(),
                reason: "request record unavailable".to_string(),
            }
            .into()),
        }
    }

    async fn mark_processing(&self, record: RequestRecord) -> RequestRecord {
        match self.deps.ledger.mark_processing(&record).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    request_id = %record.id,
                    "Failed to mark request processing"
                );
                record
            }
        }
    }

    async fn release(&self, record: Option<&RequestRecord>, status: CompletionStatus) {
        let Some(record) = record else {
            return;
        };
        match self.deps.ledger.complete(record, status).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(
                request_id = %record.id,
                "Request already terminal, likely reclaimed by the sweep"
            ),
            // The sweep reclaims the record eventually.
            Err(e) => tracing::warn!(
                error = %e,
                request_id = %record.id,
                "Failed to release ledger slot"
            ),
        }
    }

    fn placeholder(
        &self,
        fingerprint: &Fingerprint,
        content: ArtifactContent,
        style_version_id: Option<Uuid>,
    ) -> GenerationOutcome {
        let now = self.now();
        GenerationOutcome {
            artifact: CachedArtifact {
                id: Uuid::now_v7(),
                fingerprint: fingerprint.clone(),
                kind: S::KIND,
                content,
                metadata: ArtifactMetadata {
                    provider: PLACEHOLDER_PROVIDER.to_string(),
                    style_version_id,
                    generated_at: now,
                    failed_providers: self.pipeline.provider_names(),
                },
                created_at: now,
                expires_at: now,
            },
            cached: false,
            degraded: true,
        }
    }

    fn now(&self) -> Timestamp {
        self.deps.clock.now()
    }
}

fn cached(artifact: CachedArtifact) -> GenerationOutcome {
    GenerationOutcome {
        artifact,
        cached: true,
        degraded: false,
    }
}

fn expires_at(now: Timestamp, ttl: Duration) -> Timestamp {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
}
