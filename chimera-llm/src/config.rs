//! Provider pipelines built from environment variables.
//!
//! # Environment Variables
//! - `CHIMERA_IMAGE_PROVIDERS`: Comma-separated image providers in priority
//!   order (default: `local,pollinations`)
//! - `CHIMERA_TEXT_PROVIDERS`: Comma-separated text providers in priority
//!   order (default: `local,gemini`)
//! - `CHIMERA_LOCAL_IMAGE_ENDPOINT`: Local image server root (required for `local`)
//! - `CHIMERA_LOCAL_IMAGE_API`: `automatic1111` or `openai` (default: `automatic1111`)
//! - `CHIMERA_LOCAL_IMAGE_MODEL`: Model for the OpenAI-compatible API (default: `stable-diffusion`)
//! - `CHIMERA_POLLINATIONS_URL`: Pollinations root (default: public API)
//! - `CHIMERA_LOCAL_TEXT_ENDPOINT`: Chat-completions root (default: `http://localhost:1234/v1`)
//! - `CHIMERA_LOCAL_TEXT_MODEL`: Local text model (default: `local-model`)
//! - `CHIMERA_GEMINI_API_KEY`: Gemini API key (required for `gemini`)
//! - `CHIMERA_GEMINI_MODEL`: Gemini model (default: `gemini-2.5-flash`)

use crate::pipeline::{ProviderPipeline, RetryPolicy};
use crate::providers::{
    gemini, local_text, pollinations, GeminiProvider, LocalImageApi, LocalImageProvider,
    LocalTextProvider, PollinationsProvider,
};
use chimera_core::FallbackRecorder;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_IMAGE_PROVIDERS: &str = "local,pollinations";
pub const DEFAULT_TEXT_PROVIDERS: &str = "local,gemini";
pub const DEFAULT_LOCAL_IMAGE_MODEL: &str = "stable-diffusion";

const POLLINATIONS_ATTEMPTS: u32 = 2;
const POLLINATIONS_TIMEOUT: Duration = Duration::from_secs(45);
const POLLINATIONS_RETRY_DELAY: Duration = Duration::from_secs(1);
const LOCAL_TEXT_TIMEOUT: Duration = Duration::from_secs(60);
const GEMINI_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for every known provider, plus the priority lists.
#[derive(Clone, PartialEq, Eq)]
pub struct ProvidersConfig {
    pub image_providers: Vec<String>,
    pub text_providers: Vec<String>,
    pub local_image_endpoint: Option<String>,
    pub local_image_api: String,
    pub local_image_model: String,
    pub pollinations_url: String,
    pub local_text_endpoint: String,
    pub local_text_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
}

impl std::fmt::Debug for ProvidersConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvidersConfig")
            .field("image_providers", &self.image_providers)
            .field("text_providers", &self.text_providers)
            .field("local_image_endpoint", &self.local_image_endpoint)
            .field("local_image_api", &self.local_image_api)
            .field("local_text_endpoint", &self.local_text_endpoint)
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("gemini_model", &self.gemini_model)
            .finish()
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            image_providers: split_list(DEFAULT_IMAGE_PROVIDERS),
            text_providers: split_list(DEFAULT_TEXT_PROVIDERS),
            local_image_endpoint: None,
            local_image_api: "automatic1111".to_string(),
            local_image_model: DEFAULT_LOCAL_IMAGE_MODEL.to_string(),
            pollinations_url: pollinations::DEFAULT_BASE_URL.to_string(),
            local_text_endpoint: local_text::DEFAULT_ENDPOINT.to_string(),
            local_text_model: local_text::DEFAULT_MODEL.to_string(),
            gemini_api_key: None,
            gemini_model: gemini::DEFAULT_MODEL.to_string(),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl ProvidersConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            image_providers: non_empty_var("CHIMERA_IMAGE_PROVIDERS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.image_providers),
            text_providers: non_empty_var("CHIMERA_TEXT_PROVIDERS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.text_providers),
            local_image_endpoint: non_empty_var("CHIMERA_LOCAL_IMAGE_ENDPOINT"),
            local_image_api: non_empty_var("CHIMERA_LOCAL_IMAGE_API")
                .unwrap_or(defaults.local_image_api),
            local_image_model: non_empty_var("CHIMERA_LOCAL_IMAGE_MODEL")
                .unwrap_or(defaults.local_image_model),
            pollinations_url: non_empty_var("CHIMERA_POLLINATIONS_URL")
                .unwrap_or(defaults.pollinations_url),
            local_text_endpoint: non_empty_var("CHIMERA_LOCAL_TEXT_ENDPOINT")
                .unwrap_or(defaults.local_text_endpoint),
            local_text_model: non_empty_var("CHIMERA_LOCAL_TEXT_MODEL")
                .unwrap_or(defaults.local_text_model),
            gemini_api_key: non_empty_var("CHIMERA_GEMINI_API_KEY"),
            gemini_model: non_empty_var("CHIMERA_GEMINI_MODEL").unwrap_or(defaults.gemini_model),
        }
    }

    /// Build the image pipeline in `image_providers` order.
    ///
    /// Unknown or misconfigured entries are logged and skipped.
    pub fn image_pipeline(&self, recorder: Option<Arc<dyn FallbackRecorder>>) -> ProviderPipeline {
        let mut pipeline = ProviderPipeline::new("image");
        for name in &self.image_providers {
            match name.as_str() {
                "local" | "local-image" => {
                    let Some(endpoint) = &self.local_image_endpoint else {
                        tracing::warn!(
                            provider = %name,
                            "CHIMERA_LOCAL_IMAGE_ENDPOINT not set, skipping local image provider"
                        );
                        continue;
                    };
                    let api = match self.local_image_api.parse::<LocalImageApi>() {
                        Ok(api) => api,
                        Err(e) => {
                            tracing::warn!(provider = %name, error = %e, "Skipping local image provider");
                            continue;
                        }
                    };
                    pipeline.push(
                        Arc::new(LocalImageProvider::new(
                            endpoint.clone(),
                            self.local_image_model.clone(),
                            api,
                        )),
                        RetryPolicy::single(api.default_timeout()),
                    );
                }
                "pollinations" => pipeline.push(
                    Arc::new(PollinationsProvider::new(self.pollinations_url.clone())),
                    RetryPolicy::new(
                        POLLINATIONS_ATTEMPTS,
                        POLLINATIONS_TIMEOUT,
                        POLLINATIONS_RETRY_DELAY,
                    ),
                ),
                other => tracing::warn!(provider = %other, "Unknown image provider, skipping"),
            }
        }
        with_recorder(pipeline, recorder)
    }

    /// Build the text pipeline in `text_providers` order.
    ///
    /// Unknown or misconfigured entries are logged and skipped.
    pub fn text_pipeline(&self, recorder: Option<Arc<dyn FallbackRecorder>>) -> ProviderPipeline {
        let mut pipeline = ProviderPipeline::new("text");
        for name in &self.text_providers {
            match name.as_str() {
                "local" | "local-text" => pipeline.push(
                    Arc::new(LocalTextProvider::new(
                        self.local_text_endpoint.clone(),
                        self.local_text_model.clone(),
                    )),
                    RetryPolicy::single(LOCAL_TEXT_TIMEOUT),
                ),
                "gemini" => {
                    let Some(api_key) = &self.gemini_api_key else {
                        tracing::warn!(
                            provider = %name,
                            "CHIMERA_GEMINI_API_KEY not set, skipping Gemini provider"
                        );
                        continue;
                    };
                    pipeline.push(
                        Arc::new(GeminiProvider::new(api_key.clone(), self.gemini_model.clone())),
                        RetryPolicy::single(GEMINI_TIMEOUT),
                    );
                }
                other => tracing::warn!(provider = %other, "Unknown text provider, skipping"),
            }
        }
        with_recorder(pipeline, recorder)
    }
}

fn with_recorder(
    pipeline: ProviderPipeline,
    recorder: Option<Arc<dyn FallbackRecorder>>,
) -> ProviderPipeline {
    match recorder {
        Some(recorder) => pipeline.with_recorder(recorder),
        None => pipeline,
    }
}
