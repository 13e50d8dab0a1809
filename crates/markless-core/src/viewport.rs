use std::ops::Range;

/// Line start offsets for a document, used to map between lines and byte offsets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self {
            starts,
            len: text.len(),
        }
    }

    /// Number of lines (a trailing newline starts a final empty line).
    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// Zero-based line containing `offset` (clamped to the document).
    pub fn line_of(&self, offset: usize) -> usize {
        let offset = offset.min(self.len);
        match self.starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        }
    }

    /// Byte range of `line`, excluding its line terminator.
    pub fn line_range(&self, line: usize) -> Range<usize> {
        let Some(&start) = self.starts.get(line) else {
            return self.len..self.len;
        };
        let end = self
            .starts
            .get(line + 1)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        start..end.max(start)
    }

    /// Byte range covering `lines` (end exclusive), clamped to the document.
    pub fn byte_range(&self, lines: Range<usize>) -> Range<usize> {
        let start = self.starts.get(lines.start).copied().unwrap_or(self.len);
        let end = self.starts.get(lines.end).copied().unwrap_or(self.len);
        start..end.max(start)
    }
}

/// Grows a visible line window by its own height on each side (clamped to `line_count`).
///
/// Scrolling a little should not immediately expose undecorated text, so the walk covers one
/// extra screen above and below.
pub fn expand_window(visible: Range<usize>, line_count: usize) -> Range<usize> {
    let height = visible.end.saturating_sub(visible.start).max(1);
    let start = visible.start.saturating_sub(height);
    let end = visible.end.saturating_add(height).min(line_count);
    start.min(end)..end
}
