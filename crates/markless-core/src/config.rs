//! Session configuration.
//!
//! Values come from the host's settings store (typically as JSON). Every field has a default,
//! and out-of-range values are clamped with a warning instead of failing the session.
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Smallest font size (px) a session will use.
pub const MIN_FONT_SIZE: f64 = 6.0;
/// Smallest line height (px) a session will use.
pub const MIN_LINE_HEIGHT: u32 = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InlineImageConfig {
    pub auto_preview: bool,
}

/// Feature toggles and engine limits.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MarklessConfig {
    pub heading: bool,
    pub quote: bool,
    /// Bordered inline code spans. Off by default.
    pub inline_code: bool,
    pub link: bool,
    pub list: bool,
    pub math: bool,
    pub mermaid: bool,
    pub hover_image: bool,
    pub inline_image: InlineImageConfig,
    /// Documents with more lines than this only decorate around the visible range.
    pub large_document_lines: usize,
    pub diagram_timeout_ms: u64,
    pub formula_cache_capacity: usize,
    pub diagram_cache_capacity: usize,
    /// Base used to resolve relative image destinations.
    pub base_url: Option<String>,
}

impl Default for MarklessConfig {
    fn default() -> Self {
        Self {
            heading: true,
            quote: true,
            inline_code: false,
            link: true,
            list: true,
            math: true,
            mermaid: true,
            hover_image: true,
            inline_image: InlineImageConfig::default(),
            large_document_lines: 500,
            diagram_timeout_ms: 5_000,
            formula_cache_capacity: 256,
            diagram_cache_capacity: 64,
            base_url: None,
        }
    }
}

impl MarklessConfig {
    /// Parses host settings and clamps invalid values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: MarklessConfig = serde_json::from_str(json)?;
        Ok(config.sanitized())
    }

    /// Clamps values that would break the engine (zero-sized caches, zero timeout).
    pub fn sanitized(mut self) -> Self {
        if self.formula_cache_capacity == 0 {
            tracing::warn!("formulaCacheCapacity must be at least 1, clamping");
            self.formula_cache_capacity = 1;
        }
        if self.diagram_cache_capacity == 0 {
            tracing::warn!("diagramCacheCapacity must be at least 1, clamping");
            self.diagram_cache_capacity = 1;
        }
        if self.diagram_timeout_ms == 0 {
            tracing::warn!("diagramTimeoutMs must be positive, using default");
            self.diagram_timeout_ms = Self::default().diagram_timeout_ms;
        }
        self
    }

    pub fn diagram_timeout(&self) -> Duration {
        Duration::from_millis(self.diagram_timeout_ms)
    }
}

/// Raw editor font settings (`editor.fontSize`, `editor.fontFamily`, `editor.lineHeight`).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorFontConfig {
    pub font_size: f64,
    pub font_family: String,
    /// `0` means "derive from the font size".
    pub line_height: f64,
}

impl Default for EditorFontConfig {
    fn default() -> Self {
        Self {
            font_size: 14.0,
            font_family: "Courier New".to_string(),
            line_height: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Other
        }
    }

    fn line_height_factor(self) -> f64 {
        match self {
            Platform::MacOs => 1.5,
            Platform::Other => 1.35,
        }
    }
}

/// Font metrics resolved for one session.
#[derive(Clone, Debug, PartialEq)]
pub struct FontMetrics {
    pub size: f64,
    pub family: String,
    pub line_height: u32,
}

impl FontMetrics {
    pub fn resolve(config: &EditorFontConfig, platform: Platform) -> Self {
        let size = if config.font_size.is_finite() && config.font_size >= MIN_FONT_SIZE {
            config.font_size
        } else {
            tracing::warn!(font_size = config.font_size, "font size out of range, clamping");
            MIN_FONT_SIZE
        };

        let line_height = if config.line_height == 0.0 || !config.line_height.is_finite() {
            (size * platform.line_height_factor()).round() as u32
        } else if config.line_height < MIN_LINE_HEIGHT as f64 {
            MIN_LINE_HEIGHT
        } else {
            config.line_height.round() as u32
        };

        Self {
            size,
            family: config.font_family.clone(),
            line_height: line_height.max(MIN_LINE_HEIGHT),
        }
    }

    /// Heading font size: `round(5 * size / (2 + depth))`.
    pub fn heading_size(&self, depth: u8) -> u32 {
        (5.0 * self.size / (2.0 + depth as f64)).round() as u32
    }
}

impl Default for FontMetrics {
    fn default() -> Self {
        Self::resolve(&EditorFontConfig::default(), Platform::current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = MarklessConfig::from_json(r#"{ "inlineCode": true }"#).unwrap();
        assert!(config.inline_code);
        assert!(config.heading);
        assert_eq!(config.large_document_lines, 500);
    }

    #[test]
    fn reads_nested_inline_image_settings() {
        let config =
            MarklessConfig::from_json(r#"{ "inlineImage": { "autoPreview": true } }"#).unwrap();
        assert!(config.inline_image.auto_preview);
    }

    #[test]
    fn zero_capacities_are_clamped() {
        let config = MarklessConfig::from_json(
            r#"{ "formulaCacheCapacity": 0, "diagramCacheCapacity": 0, "diagramTimeoutMs": 0 }"#,
        )
        .unwrap();
        assert_eq!(config.formula_cache_capacity, 1);
        assert_eq!(config.diagram_cache_capacity, 1);
        assert_eq!(config.diagram_timeout_ms, 5_000);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            MarklessConfig::from_json("{ heading: "),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn heading_size_shrinks_with_depth() {
        let metrics = FontMetrics::resolve(&EditorFontConfig::default(), Platform::Other);
        assert_eq!(metrics.heading_size(1), 23);
        let sizes: Vec<u32> = (1..=6).map(|d| metrics.heading_size(d)).collect();
        assert!(sizes.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(sizes, vec![23, 18, 14, 12, 10, 9]);
    }

    #[test]
    fn negative_font_size_is_clamped() {
        let config = EditorFontConfig {
            font_size: -3.0,
            ..Default::default()
        };
        let metrics = FontMetrics::resolve(&config, Platform::Other);
        assert_eq!(metrics.size, MIN_FONT_SIZE);
    }

    #[test]
    fn line_height_derives_from_font_size_per_platform() {
        let config = EditorFontConfig::default();
        assert_eq!(FontMetrics::resolve(&config, Platform::Other).line_height, 19);
        assert_eq!(FontMetrics::resolve(&config, Platform::MacOs).line_height, 21);
    }

    #[test]
    fn small_line_height_is_clamped_and_large_is_kept() {
        let small = EditorFontConfig {
            line_height: 3.0,
            ..Default::default()
        };
        assert_eq!(FontMetrics::resolve(&small, Platform::Other).line_height, 8);

        let large = EditorFontConfig {
            line_height: 24.0,
            ..Default::default()
        };
        assert_eq!(FontMetrics::resolve(&large, Platform::Other).line_height, 24);
    }
}
