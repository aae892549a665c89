//! Style versions and the bundles injected into prompts.

use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Image-side style hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageStyle {
    pub base_prompt: String,
    #[serde(default)]
    pub character_style: Option<String>,
    #[serde(default)]
    pub environment_style: Option<String>,
    #[serde(default)]
    pub item_style: Option<String>,
    /// Keyed by biome name, e.g. `forest`.
    #[serde(default)]
    pub biome_styles: BTreeMap<String, String>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
}

/// Text-side style hints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextStyle {
    /// Extra narrator voice guidance appended to the system preamble.
    #[serde(default)]
    pub voice: Option<String>,
}

/// Everything a style version contributes to prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleBundle {
    pub image: ImageStyle,
    #[serde(default)]
    pub text: TextStyle,
}

impl Default for StyleBundle {
    /// Built-in bundle served when no version is active.
    fn default() -> Self {
        let biome_styles = [
            ("forest", "Enchanted forest, mystical atmosphere"),
            ("mountain", "Mountain peaks, snow-capped, grand vista"),
            ("ocean", "Coastal scene, waves, maritime fantasy"),
            ("desert", "Sandy dunes, oasis, desert fantasy"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            image: ImageStyle {
                base_prompt: "High quality fantasy digital art, detailed, atmospheric lighting"
                    .to_string(),
                character_style: Some(
                    "Character portrait, fantasy art style, dramatic lighting".to_string(),
                ),
                environment_style: Some("Lush fantasy landscape, atmospheric".to_string()),
                item_style: Some("Fantasy item, detailed, icon style".to_string()),
                biome_styles,
                negative_prompt: Some("blurry, low quality, watermark, text".to_string()),
            },
            text: TextStyle::default(),
        }
    }
}

/// A stored, versioned style bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleVersion {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub bundle: StyleBundle,
    pub is_active: bool,
    pub created_at: Timestamp,
}

impl StyleVersion {
    /// A new, inactive version.
    pub fn new(name: impl Into<String>, description: Option<String>, bundle: StyleBundle) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description,
            bundle,
            is_active: false,
            created_at: chrono::Utc::now(),
        }
    }
}

/// The bundle currently in effect, with the version it came from.
///
/// `version_id` is `None` when the built-in default is in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveStyle {
    pub version_id: Option<Uuid>,
    pub bundle: StyleBundle,
}

impl ActiveStyle {
    pub fn builtin() -> Self {
        Self {
            version_id: None,
            bundle: StyleBundle::default(),
        }
    }

    pub fn from_version(version: &StyleVersion) -> Self {
        Self {
            version_id: Some(version.id),
            bundle: version.bundle.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bundle_has_biomes() {
        let bundle = StyleBundle::default();
        assert_eq!(bundle.image.biome_styles.len(), 4);
        assert!(bundle.image.biome_styles.contains_key("forest"));
        assert!(bundle.image.negative_prompt.is_some());
    }

    #[test]
    fn test_bundle_deserializes_with_missing_optionals() {
        let bundle: StyleBundle =
            serde_json::from_str(r#"{"image":{"base_prompt":"ink wash"}}"#).unwrap();
        assert_eq!(bundle.image.base_prompt, "ink wash");
        assert!(bundle.image.biome_styles.is_empty());
        assert_eq!(bundle.text, TextStyle::default());
    }

    #[test]
    fn test_new_version_is_inactive() {
        let v = StyleVersion::new("noir", None, StyleBundle::default());
        assert!(!v.is_active);
        assert_eq!(ActiveStyle::from_version(&v).version_id, Some(v.id));
        assert_eq!(ActiveStyle::builtin().version_id, None);
    }
}
