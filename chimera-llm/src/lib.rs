//! Chimera LLM - Generation Providers
//!
//! Provider-agnostic trait for image and text backends, the concrete HTTP
//! adapters, and the [`ProviderPipeline`] that tries them in order.
//! Providers are registered explicitly, either in code or from the
//! environment through [`ProvidersConfig`].

pub mod config;
pub mod mock;
pub mod pipeline;
pub mod providers;

use async_trait::async_trait;
use chimera_core::{ImageContextType, ImageDimensions, ProviderError, TextType};
use std::time::Duration;

pub use config::ProvidersConfig;
pub use mock::{ScriptedProvider, ScriptedResponse};
pub use pipeline::{PipelineEntry, PipelineOutput, ProviderPipeline, RetryPolicy};
pub use providers::{
    GeminiProvider, LocalImageApi, LocalImageProvider, LocalTextProvider, PollinationsProvider,
};

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// Where a provider runs. Used to reorder a pipeline for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderTier {
    /// Self-hosted backend, usually cheaper and faster.
    Local,
    /// Hosted third-party service.
    Remote,
}

impl std::fmt::Display for ProviderTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderTier::Local => write!(f, "local"),
            ProviderTier::Remote => write!(f, "remote"),
        }
    }
}

/// What the caller wants back from a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Image {
        dimensions: ImageDimensions,
        context_type: ImageContextType,
        negative_prompt: Option<String>,
    },
    Text {
        text_type: TextType,
        max_tokens: u32,
    },
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Image { .. } => "image",
            Shape::Text { .. } => "text",
        }
    }
}

/// Raw provider output, before it is stored.
#[derive(Clone, PartialEq, Eq)]
pub enum Payload {
    Bytes { data: Vec<u8>, content_type: String },
    Text(String),
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Bytes { data, content_type } => f
                .debug_struct("Bytes")
                .field("len", &data.len())
                .field("content_type", content_type)
                .finish(),
            Payload::Text(text) => f.debug_tuple("Text").field(text).finish(),
        }
    }
}

/// A single generation backend.
///
/// Implementations must be thread-safe (Send + Sync). `timeout` is the
/// per-attempt budget; adapters pass it to their HTTP client and the
/// pipeline enforces it again from the outside.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Stable name used in logs, fallback events and artifact metadata.
    fn name(&self) -> &str;

    fn tier(&self) -> ProviderTier;

    async fn generate(
        &self,
        prompt: &str,
        shape: &Shape,
        timeout: Duration,
    ) -> Result<Payload, ProviderError>;
}

/// Guess an image content type from magic bytes.
///
/// Returns the MIME type and the file extension to store it under.
pub fn sniff_image_type(data: &[u8]) -> Option<(&'static str, &'static str)> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(("image/png", "png"))
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(("image/jpeg", "jpg"))
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some(("image/webp", "webp"))
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some(("image/gif", "gif"))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_image_type() {
        assert_eq!(
            sniff_image_type(b"\x89PNG\r\n\x1a\n...."),
            Some(("image/png", "png"))
        );
        assert_eq!(
            sniff_image_type(&[0xFF, 0xD8, 0xFF, 0xE0]),
            Some(("image/jpeg", "jpg"))
        );
        assert_eq!(
            sniff_image_type(b"RIFF\0\0\0\0WEBPVP8 "),
            Some(("image/webp", "webp"))
        );
        assert_eq!(sniff_image_type(b"<svg"), None);
        assert_eq!(sniff_image_type(b""), None);
    }

    #[test]
    fn test_payload_debug_hides_bytes() {
        let payload = Payload::Bytes {
            data: vec![7; 4096],
            content_type: "image/png".to_string(),
        };
        let debug = format!("{:?}", payload);
        assert!(debug.contains("4096"));
        assert!(!debug.contains("7, 7"));
    }
}
