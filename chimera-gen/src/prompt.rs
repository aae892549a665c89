//! Prompt rendering from caller input and the active style bundle.
//!
//! Both builders are pure: the same params and bundle always render the
//! same prompt.

use chimera_core::{GenerationContext, ImageContextType, ImageStyle, StyleBundle, TextType};

const NARRATOR_PREAMBLE: &str =
    "You are a dungeon master narrating a dark fantasy RPG inspired by Baldur's Gate 3. ";
const NARRATOR_STYLE: &str =
    "Style: Rich, atmospheric, dramatic but not overwrought. Avoid cliches. ";

/// Render the full image prompt.
///
/// Portraits lead with the caller's prompt so character details dominate;
/// every other context type leads with the style.
pub fn build_image_prompt(
    user_prompt: &str,
    context_type: ImageContextType,
    context: &GenerationContext,
    style: &ImageStyle,
) -> String {
    if context_type == ImageContextType::CharacterPortrait {
        let hint = style
            .character_style
            .as_deref()
            .unwrap_or(&style.base_prompt);
        let negative = style
            .negative_prompt
            .as_deref()
            .map(|n| format!(". Negative: {}", n))
            .unwrap_or_default();
        return format!("{}. Style: {}{}", user_prompt, hint, negative);
    }

    let mut style_prompt = style.base_prompt.clone();
    let extra = match context_type {
        ImageContextType::LocationBanner => style.environment_style.as_deref(),
        ImageContextType::ItemIcon => style.item_style.as_deref(),
        ImageContextType::BiomeTile => context
            .get("biome")
            .and_then(|b| b.as_str())
            .and_then(|biome| style.biome_styles.get(biome))
            .map(String::as_str),
        _ => None,
    };
    if let Some(extra) = extra {
        style_prompt.push_str(", ");
        style_prompt.push_str(extra);
    }

    let negative = style
        .negative_prompt
        .as_deref()
        .map(|n| format!(" Negative prompt: {}", n))
        .unwrap_or_default();
    format!("{}. {}.{}", style_prompt, user_prompt, negative)
}

pub fn tone_for(text_type: TextType) -> &'static str {
    match text_type {
        TextType::Narration => "immersive, present-tense, engaging",
        TextType::Description => "detailed, atmospheric, mysterious",
        TextType::Dialogue => "natural, character-driven, purposeful",
        TextType::QuestText => "clear, motivating, hints at deeper story",
        TextType::Flavor => "punchy, memorable, slightly ominous",
    }
}

fn guidance_for(text_type: TextType) -> Option<&'static str> {
    match text_type {
        TextType::Narration => Some(
            "Focus on sensory details, mood, and player agency. Keep it concise (2-3 sentences). ",
        ),
        TextType::Description => Some(
            "Provide vivid, evocative descriptions. Include specific details. 1-2 paragraphs max. ",
        ),
        TextType::Dialogue => {
            Some("Write natural dialogue that reveals character. Include body language. ")
        }
        TextType::Flavor => Some("Brief, punchy flavor text. One sentence, make it memorable. "),
        TextType::QuestText => None,
    }
}

/// Render the full text prompt: narrator preamble, tone and length
/// guidance, optional style voice, serialized context, then the caller's prompt.
pub fn build_text_prompt(
    user_prompt: &str,
    text_type: TextType,
    context: &GenerationContext,
    style: &StyleBundle,
) -> String {
    let mut system = String::from(NARRATOR_PREAMBLE);
    system.push_str(&format!("Tone: {}. ", tone_for(text_type)));
    system.push_str(NARRATOR_STYLE);
    if let Some(guidance) = guidance_for(text_type) {
        system.push_str(guidance);
    }
    if let Some(voice) = style.text.voice.as_deref().filter(|v| !v.trim().is_empty()) {
        system.push_str(&format!("Voice: {}. ", voice.trim()));
    }
    if !context.is_empty() {
        // BTreeMap keeps key order stable.
        let rendered = serde_json::to_string(context).unwrap_or_default();
        system.push_str(&format!("\n\nContext: {}", rendered));
    }
    format!("{}\n\n{}", system, user_prompt)
}
