//! Google Gemini hosted text generation.

use super::types::{Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part};
use super::{
    error_from_response, invalid_response, nested_error_message, transport_error,
    unsupported_shape,
};
use crate::{GenerationProvider, Payload, ProviderTier, Shape};
use async_trait::async_trait;
use chimera_core::ProviderError;
use reqwest::Client;
use std::time::Duration;

const PROVIDER: &str = "gemini";

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const TEMPERATURE: f32 = 0.8;

/// Text provider backed by the Gemini `generateContent` REST API.
#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point at a different API root (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl GenerationProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn tier(&self) -> ProviderTier {
        ProviderTier::Remote
    }

    async fn generate(
        &self,
        prompt: &str,
        shape: &Shape,
        timeout: Duration,
    ) -> Result<Payload, ProviderError> {
        let Shape::Text { max_tokens, .. } = shape else {
            return Err(unsupported_shape(PROVIDER, shape));
        };

        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                max_output_tokens: *max_tokens,
            },
        };
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, timeout, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response, nested_error_message).await);
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| invalid_response(PROVIDER, format!("Failed to parse response: {}", e)))?;
        parsed
            .first_text()
            .map(|text| Payload::Text(text.trim().to_string()))
            .ok_or_else(|| invalid_response(PROVIDER, "No text in response"))
    }
}
