//! Self-hosted image generation (Automatic1111 or OpenAI-compatible).

use super::types::{
    ImageGenerationRequest, ImageGenerationResponse, Txt2ImgRequest, Txt2ImgResponse,
};
use super::{
    error_from_response, invalid_response, nested_error_message, transport_error,
    unsupported_shape,
};
use crate::{sniff_image_type, GenerationProvider, Payload, ProviderTier, Shape};
use async_trait::async_trait;
use base64::Engine;
use chimera_core::{ImageDimensions, ProviderError};
use reqwest::Client;
use std::time::Duration;

const PROVIDER: &str = "local-image";

/// Used when the active style carries no negative prompt.
pub const DEFAULT_NEGATIVE_PROMPT: &str = "blurry, low quality, distorted, ugly, bad anatomy";

const TXT2IMG_STEPS: u32 = 20;
const TXT2IMG_CFG_SCALE: f32 = 7.0;
const TXT2IMG_SAMPLER: &str = "DPM++ 2M Karras";

/// Wire protocol spoken by the local image server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalImageApi {
    /// `POST /sdapi/v1/txt2img`
    Automatic1111,
    /// `POST /images/generations`
    OpenAi,
}

impl std::str::FromStr for LocalImageApi {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "automatic1111" | "a1111" => Ok(LocalImageApi::Automatic1111),
            "openai" => Ok(LocalImageApi::OpenAi),
            other => Err(format!("unknown local image api '{}'", other)),
        }
    }
}

impl LocalImageApi {
    /// Suggested attempt timeout for this API.
    pub fn default_timeout(&self) -> Duration {
        match self {
            LocalImageApi::Automatic1111 => Duration::from_secs(120),
            LocalImageApi::OpenAi => Duration::from_secs(60),
        }
    }
}

/// Image provider for a self-hosted Stable Diffusion server.
#[derive(Debug, Clone)]
pub struct LocalImageProvider {
    client: Client,
    endpoint: String,
    model: String,
    api: LocalImageApi,
}

impl LocalImageProvider {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api: LocalImageApi) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api,
        }
    }

    pub fn api(&self) -> LocalImageApi {
        self.api
    }

    async fn txt2img(
        &self,
        prompt: &str,
        dimensions: ImageDimensions,
        negative_prompt: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>, ProviderError> {
        let body = Txt2ImgRequest {
            prompt,
            negative_prompt,
            width: dimensions.width,
            height: dimensions.height,
            steps: TXT2IMG_STEPS,
            cfg_scale: TXT2IMG_CFG_SCALE,
            sampler_name: TXT2IMG_SAMPLER,
            batch_size: 1,
            n_iter: 1,
        };
        let response = self
            .client
            .post(format!("{}/sdapi/v1/txt2img", self.endpoint))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, timeout, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response, nested_error_message).await);
        }

        let parsed: Txt2ImgResponse = response
            .json()
            .await
            .map_err(|e| invalid_response(PROVIDER, format!("Failed to parse response: {}", e)))?;
        let encoded = parsed
            .images
            .first()
            .ok_or_else(|| invalid_response(PROVIDER, "No image in response"))?;
        decode_base64(encoded)
    }

    async fn openai_generate(
        &self,
        prompt: &str,
        dimensions: ImageDimensions,
        timeout: Duration,
    ) -> Result<Vec<u8>, ProviderError> {
        let body = ImageGenerationRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: dimensions.to_string(),
            response_format: "b64_json",
        };
        let response = self
            .client
            .post(format!("{}/images/generations", self.endpoint))
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, timeout, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response, nested_error_message).await);
        }

        let parsed: ImageGenerationResponse = response
            .json()
            .await
            .map_err(|e| invalid_response(PROVIDER, format!("Failed to parse response: {}", e)))?;
        let image = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| invalid_response(PROVIDER, "No image in response"))?;

        match (image.b64_json, image.url) {
            (Some(encoded), _) => decode_base64(&encoded),
            (None, Some(url)) => self.fetch(&url, timeout).await,
            (None, None) => Err(invalid_response(PROVIDER, "Image has neither data nor url")),
        }
    }

    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, timeout, e))?;
        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response, nested_error_message).await);
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| invalid_response(PROVIDER, format!("Failed to read image: {}", e)))
    }
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, ProviderError> {
    // Some servers prefix a data URL header.
    let raw = encoded
        .split_once(";base64,")
        .map(|(_, data)| data)
        .unwrap_or(encoded);
    base64::engine::general_purpose::STANDARD
        .decode(raw.trim())
        .map_err(|e| invalid_response(PROVIDER, format!("Invalid base64 image: {}", e)))
}

#[async_trait]
impl GenerationProvider for LocalImageProvider {
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
        let Shape::Image {
            dimensions,
            negative_prompt,
            ..
        } = shape
        else {
            return Err(unsupported_shape(PROVIDER, shape));
        };

        let data = match self.api {
            LocalImageApi::Automatic1111 => {
                let negative = negative_prompt
                    .as_deref()
                    .unwrap_or(DEFAULT_NEGATIVE_PROMPT);
                self.txt2img(prompt, *dimensions, negative, timeout).await?
            }
            LocalImageApi::OpenAi => self.openai_generate(prompt, *dimensions, timeout).await?,
        };

        let content_type = sniff_image_type(&data)
            .map(|(mime, _)| mime)
            .unwrap_or("image/png");
        Ok(Payload::Bytes {
            data,
            content_type: content_type.to_string(),
        })
    }
}
