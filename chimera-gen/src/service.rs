//! Both facades behind one entry point.

use crate::facade::{Collaborators, GenerationFacade, GenerationOutcome};
use crate::strategy::{ImageStrategy, TextStrategy};
use chimera_core::{ArtifactKind, ChimeraResult, GenerationConfig, ImageParams, TextParams};
use chimera_llm::ProviderPipeline;
use chimera_storage::BlobStore;
use std::sync::Arc;

/// A request for either artifact kind.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    Image(ImageParams),
    Text(TextParams),
}

impl GenerationRequest {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            GenerationRequest::Image(_) => ArtifactKind::Image,
            GenerationRequest::Text(_) => ArtifactKind::Text,
        }
    }
}

impl From<ImageParams> for GenerationRequest {
    fn from(params: ImageParams) -> Self {
        GenerationRequest::Image(params)
    }
}

impl From<TextParams> for GenerationRequest {
    fn from(params: TextParams) -> Self {
        GenerationRequest::Text(params)
    }
}

/// Image and text generation sharing one set of collaborators.
#[derive(Debug)]
pub struct GenerationService {
    images: GenerationFacade<ImageStrategy>,
    texts: GenerationFacade<TextStrategy>,
}

impl GenerationService {
    pub fn new(images: GenerationFacade<ImageStrategy>, texts: GenerationFacade<TextStrategy>) -> Self {
        Self { images, texts }
    }

    /// Wire both facades from shared collaborators and per-kind pipelines.
    pub fn from_parts(
        deps: Collaborators,
        blobs: Arc<dyn BlobStore>,
        image_pipeline: ProviderPipeline,
        text_pipeline: ProviderPipeline,
    ) -> Self {
        Self::new(
            GenerationFacade::new(
                ImageStrategy::new(blobs),
                deps.clone(),
                image_pipeline,
                GenerationConfig::from_env(ArtifactKind::Image),
            ),
            GenerationFacade::new(
                TextStrategy,
                deps,
                text_pipeline,
                GenerationConfig::from_env(ArtifactKind::Text),
            ),
        )
    }

    pub fn images(&self) -> &GenerationFacade<ImageStrategy> {
        &self.images
    }

    pub fn texts(&self) -> &GenerationFacade<TextStrategy> {
        &self.texts
    }

    pub async fn generate(&self, request: GenerationRequest) -> ChimeraResult<GenerationOutcome> {
        match request {
            GenerationRequest::Image(params) => self.images.generate(params).await,
            GenerationRequest::Text(params) => self.texts.generate(params).await,
        }
    }

    pub async fn generate_image(&self, params: ImageParams) -> ChimeraResult<GenerationOutcome> {
        self.images.generate(params).await
    }

    pub async fn generate_text(&self, params: TextParams) -> ChimeraResult<GenerationOutcome> {
        self.texts.generate(params).await
    }
}
