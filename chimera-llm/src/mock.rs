//! Scripted provider for tests and local development.

use crate::{GenerationProvider, Payload, ProviderTier, Shape};
use async_trait::async_trait;
use chimera_core::ProviderError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedResponse {
    Reply(Payload),
    Fail(ProviderError),
}

/// Provider that replays queued responses, then repeats a default one.
///
/// Counts calls and remembers prompts so tests can assert how often the
/// pipeline reached it.
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    tier: ProviderTier,
    queue: Mutex<VecDeque<ScriptedResponse>>,
    default: ScriptedResponse,
    delay: Duration,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>, tier: ProviderTier, default: ScriptedResponse) -> Self {
        Self {
            name: name.into(),
            tier,
            queue: Mutex::new(VecDeque::new()),
            default,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `text`.
    pub fn text(name: impl Into<String>, tier: ProviderTier, text: impl Into<String>) -> Self {
        Self::new(name, tier, ScriptedResponse::Reply(Payload::Text(text.into())))
    }

    /// Always answers with `data`.
    pub fn image(
        name: impl Into<String>,
        tier: ProviderTier,
        data: Vec<u8>,
        content_type: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            tier,
            ScriptedResponse::Reply(Payload::Bytes {
                data,
                content_type: content_type.into(),
            }),
        )
    }

    /// Always fails with `error`.
    pub fn failing(name: impl Into<String>, tier: ProviderTier, error: ProviderError) -> Self {
        Self::new(name, tier, ScriptedResponse::Fail(error))
    }

    /// Queue a response served before the default.
    pub fn queued(self, response: ScriptedResponse) -> Self {
        self.lock_queue().push_back(response);
        self
    }

    /// Sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<ScriptedResponse>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn tier(&self) -> ProviderTier {
        self.tier
    }

    async fn generate(
        &self,
        prompt: &str,
        _shape: &Shape,
        _timeout: Duration,
    ) -> Result<Payload, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(prompt.to_string());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let response = self
            .lock_queue()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());
        match response {
            ScriptedResponse::Reply(payload) => Ok(payload),
            ScriptedResponse::Fail(error) => Err(error),
        }
    }
}
