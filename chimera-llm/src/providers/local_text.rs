//! Self-hosted text generation over an OpenAI-compatible chat API.
//!
//! LM Studio, Ollama (`/v1`) and llama.cpp's server all speak this protocol.

use super::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use super::{
    error_from_response, invalid_response, nested_error_message, transport_error,
    unsupported_shape,
};
use crate::{GenerationProvider, Payload, ProviderTier, Shape};
use async_trait::async_trait;
use chimera_core::ProviderError;
use reqwest::Client;
use std::time::Duration;

const PROVIDER: &str = "local-text";

pub const DEFAULT_ENDPOINT: &str = "http://localhost:1234/v1";
pub const DEFAULT_MODEL: &str = "local-model";
const TEMPERATURE: f32 = 0.7;

/// Text provider for a local chat-completions server.
#[derive(Debug, Clone)]
pub struct LocalTextProvider {
    client: Client,
    endpoint: String,
    model: String,
}

impl Default for LocalTextProvider {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT, DEFAULT_MODEL)
    }
}

impl LocalTextProvider {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl GenerationProvider for LocalTextProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn tier(&self) -> ProviderTier {
        ProviderTier::Local
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

        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: TEMPERATURE,
            max_tokens: *max_tokens,
        };
        let response = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, timeout, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response, nested_error_message).await);
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| invalid_response(PROVIDER, format!("Failed to parse response: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| Payload::Text(choice.message.content.trim().to_string()))
            .ok_or_else(|| invalid_response(PROVIDER, "No choices in response"))
    }
}
