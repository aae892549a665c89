//! Artifact kinds, generation parameters and the cached artifact record.

use crate::constants::MAX_IMAGE_DIMENSION;
use crate::fingerprint::{normalize_prompt, Fingerprint, FingerprintBuilder};
use crate::{GenerationError, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Free-form caller context forwarded to the prompt builder.
///
/// A `BTreeMap` keeps serialization order stable.
pub type GenerationContext = BTreeMap<String, serde_json::Value>;

// ============================================================================
// ARTIFACT KIND
// ============================================================================

/// The two families of generated artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Image,
    Text,
}

impl ArtifactKind {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ArtifactKind::Image => "image",
            ArtifactKind::Text => "text",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "image" => Ok(ArtifactKind::Image),
            "text" => Ok(ArtifactKind::Text),
            _ => Err(ParseEnumError::new("artifact kind", s)),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an enum from its string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub what: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.what, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

// ============================================================================
// IMAGE PARAMETERS
// ============================================================================

/// Where a generated image is displayed in the game client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageContextType {
    CharacterPortrait,
    LocationBanner,
    ItemIcon,
    BiomeTile,
    UiElement,
}

impl ImageContextType {
    pub const ALL: [ImageContextType; 5] = [
        ImageContextType::CharacterPortrait,
        ImageContextType::LocationBanner,
        ImageContextType::ItemIcon,
        ImageContextType::BiomeTile,
        ImageContextType::UiElement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageContextType::CharacterPortrait => "character_portrait",
            ImageContextType::LocationBanner => "location_banner",
            ImageContextType::ItemIcon => "item_icon",
            ImageContextType::BiomeTile => "biome_tile",
            ImageContextType::UiElement => "ui_element",
        }
    }
}

impl fmt::Display for ImageContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageContextType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("image context type", s))
    }
}

/// Pixel dimensions of a requested image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

impl ImageDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for ImageDimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parameters for an image generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageParams {
    pub prompt: String,
    pub dimensions: ImageDimensions,
    pub context_type: ImageContextType,
    #[serde(default)]
    pub context: GenerationContext,
}

impl ImageParams {
    pub fn new(
        prompt: impl Into<String>,
        dimensions: ImageDimensions,
        context_type: ImageContextType,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            dimensions,
            context_type,
            context: GenerationContext::new(),
        }
    }

    /// Attach a context entry (e.g. `biome`).
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Reject requests that no backend could serve.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if normalize_prompt(&self.prompt).is_empty() {
            return Err(GenerationError::InvalidRequest {
                field: "prompt".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        for (field, value) in [("width", self.dimensions.width), ("height", self.dimensions.height)] {
            if value == 0 || value > MAX_IMAGE_DIMENSION {
                return Err(GenerationError::InvalidRequest {
                    field: field.to_string(),
                    reason: format!("must be between 1 and {}", MAX_IMAGE_DIMENSION),
                });
            }
        }
        Ok(())
    }

    /// Fingerprint over kind, normalized prompt, dimensions and context type.
    ///
    /// The free-form context map is not part of the identity.
    pub fn fingerprint(&self) -> Fingerprint {
        FingerprintBuilder::new(ArtifactKind::Image)
            .field("prompt", &normalize_prompt(&self.prompt))
            .field("width", &self.dimensions.width.to_string())
            .field("height", &self.dimensions.height.to_string())
            .field("context_type", self.context_type.as_str())
            .finish()
    }
}

// ============================================================================
// TEXT PARAMETERS
// ============================================================================

/// Narrative text categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextType {
    Narration,
    Description,
    Dialogue,
    QuestText,
    Flavor,
}

impl TextType {
    pub const ALL: [TextType; 5] = [
        TextType::Narration,
        TextType::Description,
        TextType::Dialogue,
        TextType::QuestText,
        TextType::Flavor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TextType::Narration => "narration",
            TextType::Description => "description",
            TextType::Dialogue => "dialogue",
            TextType::QuestText => "quest_text",
            TextType::Flavor => "flavor",
        }
    }

    /// Output length ceiling for this text type.
    pub fn max_tokens(&self) -> u32 {
        match self {
            TextType::Narration => 150,
            TextType::Description => 300,
            TextType::Dialogue => 200,
            TextType::QuestText => 400,
            TextType::Flavor => 50,
        }
    }

    /// Text types that read better from the remote tier.
    pub fn prefers_remote(&self) -> bool {
        matches!(self, TextType::QuestText | TextType::Dialogue)
    }
}

impl fmt::Display for TextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("text type", s))
    }
}

/// Parameters for a narrative text generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextParams {
    /// Caller-chosen identity of the text, e.g. `location:ashford:intro`.
    pub context_key: String,
    pub text_type: TextType,
    pub prompt: String,
    #[serde(default)]
    pub context: GenerationContext,
    /// Ask for the remote tier first regardless of text type.
    #[serde(default)]
    pub prefer_remote: bool,
}

impl TextParams {
    pub fn new(context_key: impl Into<String>, text_type: TextType, prompt: impl Into<String>) -> Self {
        Self {
            context_key: context_key.into(),
            text_type,
            prompt: prompt.into(),
            context: GenerationContext::new(),
            prefer_remote: false,
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn preferring_remote(mut self) -> Self {
        self.prefer_remote = true;
        self
    }

    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.context_key.trim().is_empty() {
            return Err(GenerationError::InvalidRequest {
                field: "context_key".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if normalize_prompt(&self.prompt).is_empty() {
            return Err(GenerationError::InvalidRequest {
                field: "prompt".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Fingerprint over kind, context key and text type.
    pub fn fingerprint(&self) -> Fingerprint {
        FingerprintBuilder::new(ArtifactKind::Text)
            .field("context_key", self.context_key.trim())
            .field("text_type", self.text_type.as_str())
            .finish()
    }
}

// ============================================================================
// CACHED ARTIFACT
// ============================================================================

/// The payload of a generated artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArtifactContent {
    /// Binary payload persisted in the blob store.
    Blob {
        reference: String,
        content_type: String,
        size_bytes: u64,
    },
    /// Narrative text stored inline.
    Text { content: String },
    /// Degraded payload returned inline and never cached.
    Inline { content_type: String, data: String },
}

impl ArtifactContent {
    /// Blob reference, when the payload lives in the blob store.
    pub fn reference(&self) -> Option<&str> {
        match self {
            ArtifactContent::Blob { reference, .. } => Some(reference),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArtifactContent::Text { content } => Some(content),
            _ => None,
        }
    }
}

/// How an artifact came to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Provider that produced the payload.
    pub provider: String,
    pub style_version_id: Option<Uuid>,
    pub generated_at: Timestamp,
    /// Providers that were tried and failed before `provider` succeeded.
    #[serde(default)]
    pub failed_providers: Vec<String>,
}

/// A previously generated artifact, immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedArtifact {
    pub id: Uuid,
    pub fingerprint: Fingerprint,
    pub kind: ArtifactKind,
    pub content: ArtifactContent,
    pub metadata: ArtifactMetadata,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl CachedArtifact {
    /// Reads at or past `expires_at` count as misses.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}
