use ratatui::style::Color;
use serde::Deserialize;

/// Color theme flavor reported by the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThemeKind {
    #[default]
    Dark,
    Light,
}

impl ThemeKind {
    pub fn is_dark(self) -> bool {
        matches!(self, ThemeKind::Dark)
    }
}

/// Bullet colors cycled by list nesting level.
pub const BULLET_PALETTE: [Color; 4] = [
    Color::Green,
    Color::Rgb(0xbd, 0x93, 0xf9),
    Color::Rgb(0xff, 0x55, 0x55),
    Color::Rgb(0x00, 0x6a, 0xb1),
];

#[derive(Clone, Debug, PartialEq)]
pub struct Palette {
    pub kind: ThemeKind,
    pub heading: Color,
    pub quote: Color,
    pub url: Color,
    pub bullets: [Color; 4],
    pub inline_code: Color,
    pub inline_code_border: Color,
}

impl Palette {
    pub fn for_theme(kind: ThemeKind) -> Self {
        let (heading, quote) = match kind {
            ThemeKind::Dark => (Color::Rgb(0xff, 0xff, 0xff), Color::Rgb(0x8b, 0x8b, 0x8b)),
            ThemeKind::Light => (Color::Rgb(0x00, 0x00, 0x00), Color::Rgb(0x5a, 0x5a, 0x5a)),
        };
        Self {
            kind,
            heading,
            quote,
            url: Color::Rgb(0x3e, 0x9c, 0xf5),
            bullets: BULLET_PALETTE,
            inline_code: Color::White,
            inline_code_border: Color::Rgb(189, 147, 249),
        }
    }

    /// Returns the bullet color for a list nesting `level` (`palette[level mod 4]`).
    pub fn bullet(&self, level: usize) -> Color {
        self.bullets[level % self.bullets.len()]
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::for_theme(ThemeKind::default())
    }
}
