//! Chimera Test Utilities
//!
//! Shared test infrastructure for the Chimera workspace:
//! - Proptest generators for request parameters
//! - Fixtures for style bundles and image bytes
//! - Storage doubles that always fail, for fail-open paths
//! - A [`Harness`] wiring in-memory stores, a manual clock and scripted
//!   providers into ready-to-use facades

pub use chimera_core::{
    ArtifactContent, ArtifactKind, ChimeraError, ChimeraResult, Fingerprint, GenerationConfig,
    GenerationError, ImageContextType, ImageDimensions, ImageParams, ManualClock, ProviderError,
    RequestStatus, StorageError, StyleBundle, TextParams, TextType,
};
pub use chimera_llm::{Payload, ProviderTier, ScriptedProvider, ScriptedResponse};

use async_trait::async_trait;
use chimera_core::{AcquireOutcome, CachedArtifact, CompletionStatus, RequestRecord};
use chimera_gen::{ArtifactStrategy, Collaborators, GenerationFacade, ImageStrategy, TextStrategy};
use chimera_llm::{GenerationProvider, ProviderPipeline, RetryPolicy};
use chimera_storage::{
    CacheStore, MemoryBlobStore, MemoryCacheStore, MemoryFallbackLog, MemoryLedger,
    MemoryStyleStore, RequestLedger, StorageResult, StyleCacheConfig, StyleConfigProvider,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    /// Generate an ImageContextType variant.
    pub fn arb_image_context_type() -> impl Strategy<Value = ImageContextType> {
        prop_oneof![
            Just(ImageContextType::CharacterPortrait),
            Just(ImageContextType::LocationBanner),
            Just(ImageContextType::ItemIcon),
            Just(ImageContextType::BiomeTile),
            Just(ImageContextType::UiElement),
        ]
    }

    /// Generate a TextType variant.
    pub fn arb_text_type() -> impl Strategy<Value = TextType> {
        prop_oneof![
            Just(TextType::Narration),
            Just(TextType::Description),
            Just(TextType::Dialogue),
            Just(TextType::QuestText),
            Just(TextType::Flavor),
        ]
    }

    /// Generate dimensions inside the accepted range.
    pub fn arb_dimensions() -> impl Strategy<Value = ImageDimensions> {
        (1u32..=2048, 1u32..=2048).prop_map(|(w, h)| ImageDimensions::new(w, h))
    }

    /// Generate a prompt that is non-empty after normalization.
    pub fn arb_prompt() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9 ,.'-]{0,60}"
    }

    /// Re-space a prompt without changing its normalized form.
    pub fn arb_respaced(prompt: String) -> impl Strategy<Value = String> {
        let words: Vec<String> = prompt.split_whitespace().map(str::to_string).collect();
        let gaps = words.len() + 1;
        prop::collection::vec(prop_oneof![Just(" "), Just("  "), Just("\t"), Just("\n ")], gaps)
            .prop_map(move |seps| {
                let mut out = String::from(seps[0]);
                for (i, word) in words.iter().enumerate() {
                    if i > 0 {
                        out.push_str(seps[i]);
                    }
                    out.push_str(word);
                }
                out.push_str(seps[gaps - 1]);
                out
            })
    }

    /// Generate a free-form context map.
    pub fn arb_context() -> impl Strategy<Value = Vec<(String, String)>> {
        prop::collection::vec(("[a-z]{1,8}", "[a-z0-9 ]{0,16}"), 0..4)
    }

    /// Generate valid ImageParams.
    pub fn arb_image_params() -> impl Strategy<Value = ImageParams> {
        (
            arb_prompt(),
            arb_dimensions(),
            arb_image_context_type(),
            arb_context(),
        )
            .prop_map(|(prompt, dimensions, context_type, context)| {
                context.into_iter().fold(
                    ImageParams::new(prompt, dimensions, context_type),
                    |params, (k, v)| params.with_context(k, v),
                )
            })
    }

    /// Generate valid TextParams.
    pub fn arb_text_params() -> impl Strategy<Value = TextParams> {
        (
            "[a-z]{1,8}:[0-9]{1,4}",
            arb_text_type(),
            arb_prompt(),
            arb_context(),
            any::<bool>(),
        )
            .prop_map(|(context_key, text_type, prompt, context, prefer_remote)| {
                let params = context.into_iter().fold(
                    TextParams::new(context_key, text_type, prompt),
                    |params, (k, v)| params.with_context(k, v),
                );
                if prefer_remote {
                    params.preferring_remote()
                } else {
                    params
                }
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;

    /// Bytes that sniff as a PNG.
    pub fn png_bytes() -> Vec<u8> {
        let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
        data.extend_from_slice(&[0, 0, 0, 13, b'I', b'H', b'D', b'R', 0, 0, 0, 1, 0, 0, 0, 1]);
        data
    }

    /// Bytes that sniff as a JPEG.
    pub fn jpeg_bytes() -> Vec<u8> {
        vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F']
    }

    pub fn banner_params(prompt: &str) -> ImageParams {
        ImageParams::new(
            prompt,
            ImageDimensions::new(1024, 256),
            ImageContextType::LocationBanner,
        )
    }

    pub fn portrait_params(prompt: &str) -> ImageParams {
        ImageParams::new(
            prompt,
            ImageDimensions::new(512, 512),
            ImageContextType::CharacterPortrait,
        )
    }

    /// Text identity is the context key and type; the prompt is not part of it.
    pub fn narration_params(context_key: &str, prompt: &str) -> TextParams {
        TextParams::new(context_key, TextType::Narration, prompt)
    }

    /// A bundle distinguishable from the built-in one by its base prompt.
    pub fn style_bundle(base_prompt: &str) -> StyleBundle {
        let mut bundle = StyleBundle::default();
        bundle.image.base_prompt = base_prompt.to_string();
        bundle
    }
}

// ============================================================================
// UNAVAILABLE STORES
// ============================================================================

fn offline(what: &str) -> StorageError {
    StorageError::ConnectionFailed {
        reason: format!("{} offline", what),
    }
}

/// Cache whose every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCache;

#[async_trait]
impl CacheStore for UnavailableCache {
    async fn get(&self, _fingerprint: &Fingerprint) -> StorageResult<Option<CachedArtifact>> {
        Err(offline("cache"))
    }

    async fn put(&self, _artifact: &CachedArtifact) -> StorageResult<CachedArtifact> {
        Err(offline("cache"))
    }
}

/// Ledger whose every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableLedger;

#[async_trait]
impl RequestLedger for UnavailableLedger {
    async fn try_acquire(
        &self,
        _fingerprint: &Fingerprint,
        _kind: ArtifactKind,
    ) -> StorageResult<AcquireOutcome> {
        Err(offline("ledger"))
    }

    async fn mark_processing(&self, _record: &RequestRecord) -> StorageResult<RequestRecord> {
        Err(offline("ledger"))
    }

    async fn complete(
        &self,
        _record: &RequestRecord,
        _status: CompletionStatus,
    ) -> StorageResult<bool> {
        Err(offline("ledger"))
    }

    async fn status(&self, _id: Uuid) -> StorageResult<Option<RequestRecord>> {
        Err(offline("ledger"))
    }

    async fn reclaim_stale(&self, _max_age: Duration) -> StorageResult<u64> {
        Err(offline("ledger"))
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// Timeout applied to every scripted provider attempt.
pub const TEST_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

/// In-memory collaborators sharing one manual clock.
///
/// Polling sleeps use real (or paused tokio) time; only timestamps, TTLs and
/// staleness follow the manual clock.
#[derive(Debug)]
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub cache: Arc<MemoryCacheStore>,
    pub ledger: Arc<MemoryLedger>,
    pub style_store: Arc<MemoryStyleStore>,
    pub styles: Arc<StyleConfigProvider>,
    pub blobs: Arc<MemoryBlobStore>,
    pub fallback_log: Arc<MemoryFallbackLog>,
    pub config: GenerationConfig,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::starting_now());
        let style_store = Arc::new(MemoryStyleStore::new());
        let styles = Arc::new(StyleConfigProvider::with_clock(
            style_store.clone(),
            StyleCacheConfig::default(),
            clock.clone(),
        ));
        Self {
            cache: Arc::new(MemoryCacheStore::with_clock(clock.clone())),
            ledger: Arc::new(MemoryLedger::with_clock(clock.clone())),
            style_store,
            styles,
            blobs: Arc::new(MemoryBlobStore::new()),
            fallback_log: Arc::new(MemoryFallbackLog::new()),
            config: GenerationConfig::development(),
            clock,
        }
    }

    pub fn with_config(mut self, config: GenerationConfig) -> Self {
        self.config = config;
        self
    }

    /// Collaborators backed by the harness stores.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(self.cache.clone(), self.ledger.clone(), self.styles.clone())
            .with_clock(self.clock.clone())
    }

    /// Pipeline over `providers` in order, recording fallbacks to the log.
    pub fn pipeline(&self, label: &str, providers: &[Arc<ScriptedProvider>]) -> ProviderPipeline {
        providers.iter().fold(
            ProviderPipeline::new(label).with_recorder(self.fallback_log.clone()),
            |pipeline, provider| {
                let provider: Arc<dyn GenerationProvider> = provider.clone();
                pipeline.with_provider(provider, RetryPolicy::single(TEST_ATTEMPT_TIMEOUT))
            },
        )
    }

    pub fn facade<S: ArtifactStrategy>(
        &self,
        strategy: S,
        deps: Collaborators,
        providers: &[Arc<ScriptedProvider>],
    ) -> GenerationFacade<S> {
        let pipeline = self.pipeline(S::KIND.as_db_str(), providers);
        GenerationFacade::new(strategy, deps, pipeline, self.config.clone())
    }

    pub fn image_facade(&self, providers: &[Arc<ScriptedProvider>]) -> GenerationFacade<ImageStrategy> {
        self.facade(
            ImageStrategy::new(self.blobs.clone()),
            self.collaborators(),
            providers,
        )
    }

    pub fn text_facade(&self, providers: &[Arc<ScriptedProvider>]) -> GenerationFacade<TextStrategy> {
        self.facade(TextStrategy, self.collaborators(), providers)
    }
}

/// Scripted image provider answering with [`fixtures::png_bytes`].
pub fn png_provider(name: &str, tier: ProviderTier) -> Arc<ScriptedProvider> {
    Arc::new(ScriptedProvider::image(name, tier, fixtures::png_bytes(), "image/png"))
}

/// Scripted text provider answering with `text`.
pub fn text_provider(name: &str, tier: ProviderTier, text: &str) -> Arc<ScriptedProvider> {
    Arc::new(ScriptedProvider::text(name, tier, text))
}

/// Scripted provider that always fails with a server error.
pub fn failing_provider(name: &str, tier: ProviderTier) -> Arc<ScriptedProvider> {
    Arc::new(ScriptedProvider::failing(
        name,
        tier,
        ProviderError::RequestFailed {
            provider: name.to_string(),
            status: 503,
            message: "unavailable".to_string(),
        },
    ))
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    use super::*;
    use chimera_gen::GenerationOutcome;

    /// Assert that an outcome was freshly generated by `provider`.
    pub fn assert_generated_by(outcome: &GenerationOutcome, provider: &str) {
        assert!(!outcome.cached, "Expected a fresh generation, got a cache hit");
        assert!(!outcome.degraded, "Expected a real artifact, got a placeholder");
        assert_eq!(outcome.artifact.metadata.provider, provider);
    }

    /// Assert that an outcome is the degraded placeholder.
    pub fn assert_placeholder(outcome: &GenerationOutcome) {
        assert!(outcome.degraded, "Expected a placeholder");
        assert!(!outcome.cached);
        assert_eq!(outcome.artifact.metadata.provider, chimera_gen::PLACEHOLDER_PROVIDER);
        assert!(
            matches!(outcome.artifact.content, ArtifactContent::Inline { .. }),
            "Placeholder should be inline, got {:?}",
            outcome.artifact.content
        );
    }

    /// Assert that a result failed with a generation error.
    pub fn assert_generation_error<T: std::fmt::Debug>(result: &ChimeraResult<T>) {
        assert!(
            matches!(result, Err(ChimeraError::Generation(_))),
            "Expected GenerationError, got {:?}",
            result
        );
    }

    /// Assert that a result timed out waiting on another request.
    pub fn assert_timed_out<T: std::fmt::Debug>(result: &ChimeraResult<T>) {
        assert!(
            matches!(
                result,
                Err(ChimeraError::Generation(GenerationError::TimedOut { .. }))
            ),
            "Expected TimedOut, got {:?}",
            result
        );
    }
}
