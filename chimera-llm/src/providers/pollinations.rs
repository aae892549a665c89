//! Pollinations hosted image generation.

use super::{error_from_response, invalid_response, transport_error, unsupported_shape};
use crate::{sniff_image_type, GenerationProvider, Payload, ProviderTier, Shape};
use async_trait::async_trait;
use chimera_core::{ImageContextType, ImageDimensions, ProviderError};
use reqwest::{Client, Url};
use std::time::Duration;

const PROVIDER: &str = "pollinations";

pub const DEFAULT_BASE_URL: &str = "https://image.pollinations.ai";
const USER_AGENT: &str = "Project-Chimera/1.0";

/// Image provider backed by the public Pollinations API.
///
/// Small assets (item icons, biome tiles) use the faster `turbo` model;
/// everything else uses `flux`.
#[derive(Debug, Clone)]
pub struct PollinationsProvider {
    client: Client,
    base_url: String,
}

impl Default for PollinationsProvider {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl PollinationsProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn model_for(context_type: ImageContextType) -> &'static str {
        match context_type {
            ImageContextType::ItemIcon | ImageContextType::BiomeTile => "turbo",
            _ => "flux",
        }
    }

    /// Build the request URL. The prompt is a single percent-encoded path segment.
    pub fn request_url(
        &self,
        prompt: &str,
        dimensions: ImageDimensions,
        context_type: ImageContextType,
        seed: i64,
    ) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&format!("{}/prompt/", self.base_url))
            .map_err(|e| invalid_response(PROVIDER, format!("Invalid base url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| invalid_response(PROVIDER, "Base url cannot have a path"))?
            .pop_if_empty()
            .push(prompt);
        url.query_pairs_mut()
            .append_pair("width", &dimensions.width.to_string())
            .append_pair("height", &dimensions.height.to_string())
            .append_pair("nologo", "true")
            .append_pair("enhance", "true")
            .append_pair("model", Self::model_for(context_type))
            .append_pair("seed", &seed.to_string());
        Ok(url)
    }
}

#[async_trait]
impl GenerationProvider for PollinationsProvider {
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
        let Shape::Image {
            dimensions,
            context_type,
            ..
        } = shape
        else {
            return Err(unsupported_shape(PROVIDER, shape));
        };

        let seed = chrono::Utc::now().timestamp_millis();
        let url = self.request_url(prompt, *dimensions, *context_type, seed)?;

        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, timeout, e))?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response, |_| None).await);
        }

        let header_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let data = response
            .bytes()
            .await
            .map_err(|e| invalid_response(PROVIDER, format!("Failed to read image: {}", e)))?
            .to_vec();

        let content_type = match sniff_image_type(&data) {
            Some((mime, _)) => mime.to_string(),
            None => match header_type {
                Some(t) if t.starts_with("image/") => t,
                other => {
                    return Err(invalid_response(
                        PROVIDER,
                        format!("Response is not an image (content-type {:?})", other),
                    ))
                }
            },
        };

        Ok(Payload::Bytes { data, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_selection() {
        assert_eq!(PollinationsProvider::model_for(ImageContextType::ItemIcon), "turbo");
        assert_eq!(PollinationsProvider::model_for(ImageContextType::BiomeTile), "turbo");
        assert_eq!(
            PollinationsProvider::model_for(ImageContextType::CharacterPortrait),
            "flux"
        );
        assert_eq!(PollinationsProvider::model_for(ImageContextType::UiElement), "flux");
    }

    #[test]
    fn test_request_url_encodes_prompt() {
        let provider = PollinationsProvider::default();
        let url = provider
            .request_url(
                "a dwarf/smith, 50% soot",
                ImageDimensions::new(256, 256),
                ImageContextType::ItemIcon,
                42,
            )
            .unwrap();
        let s = url.as_str();
        assert!(s.starts_with("https://image.pollinations.ai/prompt/a%20dwarf%2Fsmith"));
        assert!(s.contains("%25%20soot?"));
        assert_eq!(url.path_segments().map(|p| p.count()), Some(2));
        assert!(s.contains("width=256"));
        assert!(s.contains("model=turbo"));
        assert!(s.contains("nologo=true"));
        assert!(s.contains("seed=42"));
    }
}
