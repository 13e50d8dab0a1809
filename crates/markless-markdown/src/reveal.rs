//! Caret popup that surfaces hidden markdown syntax.
//!
//! Decorations hide markers (`#`, `![`) and replace formulas with images, which makes the raw
//! text hard to edit. When the caret sits in or next to such a range, the popup shows the caret's
//! line as plain markdown with a `█` marker at the caret; when the caret is inside `$...$` it
//! shows the rendered formula instead.
use markless_core::decoration::RenderedImage;
use markless_core::viewport::LineIndex;
use std::ops::Range;
use unicode_width::UnicodeWidthStr;

pub const CARET_MARKER: char = '█';

/// Bytes on either side of a hidden range that still count as "touching" it.
pub const REVEAL_WINDOW: usize = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinePreview {
    /// Zero-based line of the caret.
    pub line: usize,
    /// Line text with [`CARET_MARKER`] inserted at the caret.
    pub text: String,
    /// Display column of the caret within the line.
    pub column: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormulaPreview {
    /// Byte range of the formula source (between the dollar signs).
    pub range: Range<usize>,
    pub source: String,
    pub image: RenderedImage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reveal {
    Line(LinePreview),
    Formula(FormulaPreview),
}

impl Reveal {
    /// Markdown for a popup: the formula image as a data URI, or the line in a code fence.
    pub fn to_markdown(&self) -> String {
        match self {
            Reveal::Formula(formula) => {
                format!("![latexPreview]({})", formula.image.to_data_uri())
            }
            Reveal::Line(line) => format!("```markdown\n{}\n```", line.text),
        }
    }
}

/// Finds the `$...$` span around `caret`.
///
/// Scans backward for a `$` not followed by a space, then forward for a `$` not preceded by a
/// space. Returns the source between the two.
pub fn formula_span(text: &str, caret: usize) -> Option<Range<usize>> {
    let bytes = text.as_bytes();
    let caret = caret.min(bytes.len());

    let start = (1..=caret + 1)
        .rev()
        .find(|&s| bytes.get(s - 1) == Some(&b'$') && bytes.get(s) != Some(&b' '))?;
    let end = (caret..bytes.len()).find(|&e| {
        bytes[e] == b'$' && (e == 0 || bytes[e - 1] != b' ')
    })?;
    (start < end).then_some(start..end)
}

/// The caret's line with a marker inserted at the caret.
pub fn line_preview(text: &str, caret: usize) -> LinePreview {
    let index = LineIndex::new(text);
    let line = index.line_of(caret);
    let range = index.line_range(line);
    let line_text = &text[range.clone()];

    let mut col = caret.clamp(range.start, range.end) - range.start;
    while !line_text.is_char_boundary(col) {
        col -= 1;
    }
    let (before, after) = line_text.split_at(col);
    let mut marked = String::with_capacity(line_text.len() + CARET_MARKER.len_utf8());
    marked.push_str(before);
    marked.push(CARET_MARKER);
    marked.push_str(after);

    LinePreview {
        line,
        text: marked,
        column: UnicodeWidthStr::width(before),
    }
}

/// Whether `caret` is inside or within [`REVEAL_WINDOW`] bytes of a hidden range.
pub fn touches_hidden<'a>(caret: usize, hidden: impl IntoIterator<Item = &'a Range<usize>>) -> bool {
    hidden.into_iter().any(|range| {
        range.start.saturating_sub(REVEAL_WINDOW) <= caret && caret <= range.end + REVEAL_WINDOW
    })
}

/// Computes the popup for `caret`.
///
/// `render_formula` returns the cached image for a formula source (or `None` if it cannot be
/// rendered, in which case the line preview is used).
pub fn compute<'a>(
    text: &str,
    caret: usize,
    hidden: impl IntoIterator<Item = &'a Range<usize>>,
    render_formula: impl FnOnce(&str) -> Option<RenderedImage>,
) -> Option<Reveal> {
    if let Some(range) = formula_span(text, caret)
        && let Some(source) = text.get(range.clone())
        && let Some(image) = render_formula(source)
    {
        return Some(Reveal::Formula(FormulaPreview {
            range,
            source: source.to_string(),
            image,
        }));
    }

    touches_hidden(caret, hidden).then(|| Reveal::Line(line_preview(text, caret)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_formula_around_caret() {
        let text = "area $\\pi r^2$ here";
        assert_eq!(formula_span(text, 8), Some(6..13));
        assert_eq!(&text[6..13], "\\pi r^2");
    }

    #[test]
    fn spaced_dollars_are_not_formulas() {
        assert_eq!(formula_span("costs $ 5 and $ 6", 9), None);
        assert_eq!(formula_span("no math here", 4), None);
    }

    #[test]
    fn line_preview_marks_caret() {
        let preview = line_preview("# Title\nsecond", 3);
        assert_eq!(preview.line, 0);
        assert_eq!(preview.text, "# T█itle");
        assert_eq!(preview.column, 3);
    }

    #[test]
    fn line_preview_uses_display_width() {
        let text = "日本 x";
        let preview = line_preview(text, "日本".len());
        assert_eq!(preview.text, "日本█ x");
        assert_eq!(preview.column, 4);
    }

    #[test]
    fn reveal_window_is_one_byte() {
        let hidden = [0..2];
        assert!(touches_hidden(3, &hidden));
        assert!(!touches_hidden(4, &hidden));
    }

    #[test]
    fn compute_prefers_formula_preview() {
        let text = "x $a$ y";
        let image = RenderedImage::svg("<svg/>");
        let none: [Range<usize>; 0] = [];
        let reveal = compute(text, 3, &none, |src| {
            assert_eq!(src, "a");
            Some(image.clone())
        });
        match &reveal {
            Some(Reveal::Formula(formula)) => assert_eq!(formula.range, 3..4),
            other => panic!("expected a formula preview, got {other:?}"),
        }
        assert!(
            reveal
                .unwrap()
                .to_markdown()
                .starts_with("![latexPreview](data:image/svg+xml;base64,")
        );
    }

    #[test]
    fn compute_falls_back_to_line_when_formula_fails() {
        let hidden = [2..5];
        let reveal = compute("x $a$ y", 3, &hidden, |_| None);
        assert!(matches!(reveal, Some(Reveal::Line(_))));
        assert_eq!(
            reveal.unwrap().to_markdown(),
            "```markdown\nx $█a$ y\n```"
        );
    }

    #[test]
    fn no_popup_away_from_hidden_text() {
        let none: [Range<usize>; 0] = [];
        assert_eq!(compute("plain text", 5, &none, |_| None), None);
    }
}
