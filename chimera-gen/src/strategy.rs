//! Per-kind behaviour plugged into the generic facade.

use crate::placeholder::placeholder_content;
use crate::prompt::{build_image_prompt, build_text_prompt};
use async_trait::async_trait;
use chimera_core::{
    ArtifactContent, ArtifactKind, Fingerprint, GenerationError, ImageParams, StyleBundle,
    TextParams,
};
use chimera_llm::{sniff_image_type, Payload, ProviderTier, Shape};
use chimera_storage::BlobStore;
use std::sync::Arc;

/// Everything that differs between artifact kinds.
///
/// The facade owns caching, coalescing and fallback; a strategy only says
/// how to fingerprint, prompt, shape and persist its own params.
#[async_trait]
pub trait ArtifactStrategy: Send + Sync + 'static {
    type Params: Clone + std::fmt::Debug + Send + Sync;

    const KIND: ArtifactKind;

    fn validate(&self, params: &Self::Params) -> Result<(), GenerationError>;

    fn fingerprint(&self, params: &Self::Params) -> Fingerprint;

    fn prompt(&self, params: &Self::Params, style: &StyleBundle) -> String;

    fn shape(&self, params: &Self::Params, style: &StyleBundle) -> Shape;

    /// Tier to try first for this request; `None` keeps the configured order.
    fn preferred_tier(&self, _params: &Self::Params) -> Option<ProviderTier> {
        None
    }

    /// Turn provider output into storable content.
    async fn persist(
        &self,
        fingerprint: &Fingerprint,
        params: &Self::Params,
        payload: Payload,
    ) -> Result<ArtifactContent, GenerationError>;

    /// Content served to the owning request when generation fails.
    ///
    /// `None` surfaces the error instead.
    fn degraded(&self, _params: &Self::Params) -> Option<ArtifactContent> {
        None
    }
}

// ============================================================================
// IMAGES
// ============================================================================

/// Images: bytes go to the blob store, failures degrade to a placeholder.
#[derive(Clone)]
pub struct ImageStrategy {
    blobs: Arc<dyn BlobStore>,
}

impl std::fmt::Debug for ImageStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageStrategy").finish_non_exhaustive()
    }
}

impl ImageStrategy {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// Deterministic blob key: `images/{context_type}/{fingerprint}.{ext}`.
    pub fn blob_key(params: &ImageParams, fingerprint: &Fingerprint, extension: &str) -> String {
        format!(
            "images/{}/{}.{}",
            params.context_type.as_str(),
            fingerprint.as_str(),
            extension
        )
    }
}

fn extension_for(content_type: &str, data: &[u8]) -> &'static str {
    if let Some((_, ext)) = sniff_image_type(data) {
        return ext;
    }
    match content_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        _ => "png",
    }
}

#[async_trait]
impl ArtifactStrategy for ImageStrategy {
    type Params = ImageParams;

    const KIND: ArtifactKind = ArtifactKind::Image;

    fn validate(&self, params: &ImageParams) -> Result<(), GenerationError> {
        params.validate()
    }

    fn fingerprint(&self, params: &ImageParams) -> Fingerprint {
        params.fingerprint()
    }

    fn prompt(&self, params: &ImageParams, style: &StyleBundle) -> String {
        build_image_prompt(
            &params.prompt,
            params.context_type,
            &params.context,
            &style.image,
        )
    }

    fn shape(&self, params: &ImageParams, style: &StyleBundle) -> Shape {
        Shape::Image {
            dimensions: params.dimensions,
            context_type: params.context_type,
            negative_prompt: style.image.negative_prompt.clone(),
        }
    }

    async fn persist(
        &self,
        fingerprint: &Fingerprint,
        params: &ImageParams,
        payload: Payload,
    ) -> Result<ArtifactContent, GenerationError> {
        let Payload::Bytes { data, content_type } = payload else {
            return Err(GenerationError::Failed {
                fingerprint: fingerprint.to_string(),
                reason: "image provider returned text".to_string(),
            });
        };

        let key = Self::blob_key(params, fingerprint, extension_for(&content_type, &data));
        let size_bytes = data.len() as u64;
        let reference = self
            .blobs
            .put(&key, &data, &content_type)
            .await
            .map_err(|e| GenerationError::Failed {
                fingerprint: fingerprint.to_string(),
                reason: format!("blob upload failed: {}", e),
            })?;

        Ok(ArtifactContent::Blob {
            reference,
            content_type,
            size_bytes,
        })
    }

    fn degraded(&self, params: &ImageParams) -> Option<ArtifactContent> {
        Some(placeholder_content(params.dimensions))
    }
}

// ============================================================================
// TEXT
// ============================================================================

/// Text: stored inline, failures surface as errors.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextStrategy;

#[async_trait]
impl ArtifactStrategy for TextStrategy {
    type Params = TextParams;

    const KIND: ArtifactKind = ArtifactKind::Text;

    fn validate(&self, params: &TextParams) -> Result<(), GenerationError> {
        params.validate()
    }

    fn fingerprint(&self, params: &TextParams) -> Fingerprint {
        params.fingerprint()
    }

    fn prompt(&self, params: &TextParams, style: &StyleBundle) -> String {
        build_text_prompt(&params.prompt, params.text_type, &params.context, style)
    }

    fn shape(&self, params: &TextParams, _style: &StyleBundle) -> Shape {
        Shape::Text {
            text_type: params.text_type,
            max_tokens: params.text_type.max_tokens(),
        }
    }

    fn preferred_tier(&self, params: &TextParams) -> Option<ProviderTier> {
        if params.prefer_remote || params.text_type.prefers_remote() {
            Some(ProviderTier::Remote)
        } else {
            None
        }
    }

    async fn persist(
        &self,
        fingerprint: &Fingerprint,
        _params: &TextParams,
        payload: Payload,
    ) -> Result<ArtifactContent, GenerationError> {
        match payload {
            Payload::Text(content) => Ok(ArtifactContent::Text { content }),
            Payload::Bytes { .. } => Err(GenerationError::Failed {
                fingerprint: fingerprint.to_string(),
                reason: "text provider returned bytes".to_string(),
            }),
        }
    }
}
