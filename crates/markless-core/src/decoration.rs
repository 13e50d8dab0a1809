use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ratatui::style::Color;
use std::ops::Range;
use std::sync::Arc;

use crate::theme::Palette;
use crate::theme::ThemeKind;

/// Opaque handle to a decoration type created by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecorationHandle(pub u64);

/// Identity of a rendered decoration style.
///
/// Two ranges share a host decoration type if and only if they share a key. Keys carry every
/// parameter that influences the style (font size bucket, theme, bullet color slot, image source).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DecorationKey {
    /// Hides markup glyphs (heading markers, `![`).
    Hide,
    /// Keeps layout but makes text invisible (backticks around inline code).
    Transparent,
    /// Clickable link/url styling.
    Url,
    Heading { size: u32, theme: ThemeKind },
    Quote,
    InlineCode,
    /// Bullet color slot (`level mod palette.len()`).
    Bullet { slot: usize },
    /// Inline formula image, keyed by the formula source.
    Formula(Arc<str>),
    /// Diagram image, keyed by the diagram source, theme, and block height in pixels.
    Diagram {
        source: Arc<str>,
        dark: bool,
        height: u32,
    },
}

impl DecorationKey {
    /// Returns the style for keys whose look is fully determined by the palette.
    ///
    /// Image-carrying keys ([`DecorationKey::Formula`], [`DecorationKey::Diagram`]) return `None`:
    /// their style is built by the handler that owns the image.
    pub fn style(&self, palette: &Palette) -> Option<DecorationStyle> {
        let style = match self {
            DecorationKey::Hide => DecorationStyle {
                hidden: true,
                ..Default::default()
            },
            DecorationKey::Transparent => DecorationStyle {
                transparent: true,
                ..Default::default()
            },
            DecorationKey::Url => DecorationStyle {
                color: Some(palette.url),
                underline: true,
                clickable: true,
                ..Default::default()
            },
            DecorationKey::Heading { size, .. } => DecorationStyle {
                color: Some(palette.heading),
                font_size: Some(*size),
                ..Default::default()
            },
            DecorationKey::Quote => DecorationStyle {
                color: Some(palette.quote),
                ..Default::default()
            },
            DecorationKey::InlineCode => DecorationStyle {
                color: Some(palette.inline_code),
                border: Some(Border {
                    color: palette.inline_code_border,
                    width: 1,
                }),
                ..Default::default()
            },
            DecorationKey::Bullet { slot } => DecorationStyle {
                color: Some(palette.bullet(*slot)),
                ..Default::default()
            },
            DecorationKey::Formula(_) | DecorationKey::Diagram { .. } => return None,
        };
        Some(style)
    }

    /// Returns `true` for keys that hide source text from the user.
    pub fn hides_text(&self) -> bool {
        matches!(
            self,
            DecorationKey::Hide | DecorationKey::Formula(_) | DecorationKey::Diagram { .. }
        )
    }

    /// Returns `true` for keys tied to one piece of document content.
    ///
    /// Their host types are released as soon as a pass no longer uses them.
    pub fn is_content_keyed(&self) -> bool {
        matches!(self, DecorationKey::Formula(_) | DecorationKey::Diagram { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Border {
    pub color: Color,
    pub width: u16,
}

/// Concrete style handed to [`crate::host::EditorHost::create_decoration_type`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecorationStyle {
    pub color: Option<Color>,
    /// Font size in pixels.
    pub font_size: Option<u32>,
    pub hidden: bool,
    pub transparent: bool,
    pub underline: bool,
    pub clickable: bool,
    pub border: Option<Border>,
    pub image: Option<DecorationImage>,
}

/// An image shown in place of (or before) the decorated text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecorationImage {
    pub image: RenderedImage,
    /// Height hint in pixels. `None` lets the host pick the intrinsic size.
    pub height: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Svg,
    Png,
}

impl ImageFormat {
    pub fn mime(self) -> &'static str {
        match self {
            ImageFormat::Svg => "image/svg+xml",
            ImageFormat::Png => "image/png",
        }
    }
}

/// Output of a formula converter or diagram renderer.
///
/// Bytes are shared: cloning a rendered image never copies the payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RenderedImage {
    pub format: ImageFormat,
    pub bytes: Arc<[u8]>,
}

impl RenderedImage {
    pub fn svg(markup: impl Into<String>) -> Self {
        Self {
            format: ImageFormat::Svg,
            bytes: Arc::from(markup.into().into_bytes()),
        }
    }

    pub fn png(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            format: ImageFormat::Png,
            bytes: Arc::from(bytes.into()),
        }
    }

    /// Encodes the image as a `data:` URI (used by popups that render markdown).
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.format.mime(),
            STANDARD.encode(&self.bytes)
        )
    }
}

/// Returns `true` if `range` is non-empty and lies within a text of length `len`.
pub fn is_valid_range(range: &Range<usize>, len: usize) -> bool {
    range.start < range.end && range.end <= len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_keys_have_no_palette_style() {
        let palette = Palette::default();
        let diagram = DecorationKey::Diagram {
            source: Arc::from("graph TD"),
            dark: true,
            height: 38,
        };
        assert!(DecorationKey::Formula(Arc::from("x")).style(&palette).is_none());
        assert!(diagram.style(&palette).is_none());
        assert!(DecorationKey::Hide.style(&palette).is_some_and(|s| s.hidden));
    }

    #[test]
    fn formula_keys_compare_by_source() {
        let a = DecorationKey::Formula(Arc::from("x^2"));
        assert_eq!(a, DecorationKey::Formula(Arc::from(String::from("x^2"))));
        assert_ne!(a, DecorationKey::Formula(Arc::from("x^3")));
        assert!(a.is_content_keyed());
        assert!(!DecorationKey::Hide.is_content_keyed());
    }

    #[test]
    fn heading_style_carries_size() {
        let palette = Palette::default();
        let style = DecorationKey::Heading {
            size: 23,
            theme: ThemeKind::Dark,
        }
        .style(&palette)
        .unwrap();
        assert_eq!(style.font_size, Some(23));
        assert_eq!(style.color, Some(palette.heading));
    }

    #[test]
    fn svg_data_uri_is_base64_encoded() {
        let image = RenderedImage::svg("<svg/>");
        assert_eq!(image.to_data_uri(), "data:image/svg+xml;base64,PHN2Zy8+");
    }

    #[test]
    fn rejects_empty_and_out_of_bounds_ranges() {
        assert!(is_valid_range(&(0..2), 2));
        assert!(!is_valid_range(&(2..2), 4));
        assert!(!is_valid_range(&(1..5), 4));
    }
}
