//! Degraded placeholder image served when every image provider fails.

use chimera_core::{ArtifactContent, ImageDimensions};

pub const PLACEHOLDER_CONTENT_TYPE: &str = "image/svg+xml";
pub const PLACEHOLDER_PROVIDER: &str = "placeholder";

/// A dark gradient SVG with a centred "Generating..." label.
pub fn placeholder_svg(dimensions: ImageDimensions) -> String {
    let ImageDimensions { width, height } = dimensions;
    format!(
        concat!(
            r#"<svg width="{w}" height="{h}" xmlns="http://www.w3.org/2000/svg">"#,
            r#"<defs><linearGradient id="grad" x1="0%" y1="0%" x2="100%" y2="100%">"#,
            r#"<stop offset="0%" style="stop-color:#0a0e1a;stop-opacity:1" />"#,
            r#"<stop offset="50%" style="stop-color:#1a1f2e;stop-opacity:1" />"#,
            r#"<stop offset="100%" style="stop-color:#252b3d;stop-opacity:1" />"#,
            r#"</linearGradient></defs>"#,
            r#"<rect width="100%" height="100%" fill="url(#grad)"/>"#,
            r##"<text x="50%" y="50%" font-family="Arial" font-size="16" fill="#d4af37" "##,
            r#"text-anchor="middle" dominant-baseline="middle" opacity="0.5">Generating...</text>"#,
            r#"</svg>"#
        ),
        w = width,
        h = height
    )
}

/// Inline content for the placeholder. Never cached.
pub fn placeholder_content(dimensions: ImageDimensions) -> ArtifactContent {
    ArtifactContent::Inline {
        content_type: PLACEHOLDER_CONTENT_TYPE.to_string(),
        data: placeholder_svg(dimensions),
    }
}
