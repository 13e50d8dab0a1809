use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use crate::decoration::DecorationHandle;
use crate::decoration::DecorationStyle;
use crate::decoration::RenderedImage;

/// The editor surface decorations are painted on.
///
/// Implementations wrap the host editor's decoration API. Creating a decoration type is assumed
/// to be expensive; the engine memoizes handles and reuses them across passes.
pub trait EditorHost {
    fn create_decoration_type(&mut self, style: &DecorationStyle) -> DecorationHandle;

    /// Replaces the full range set painted for `handle`.
    fn set_decorations(&mut self, handle: DecorationHandle, ranges: &[Range<usize>]);

    /// Releases a decoration type the engine no longer uses.
    fn dispose_decoration_type(&mut self, _handle: DecorationHandle) {}

    /// The document in the active editor, if any.
    fn active_document(&self) -> Option<ActiveDocument>;
}

/// Snapshot of the active editor's state as reported by the host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveDocument {
    pub text: Arc<str>,
    pub language_id: String,
    /// Caret position as a byte offset.
    pub caret: usize,
    /// Visible lines (zero-based, end exclusive).
    pub visible_lines: Range<usize>,
}

impl ActiveDocument {
    pub fn markdown(text: impl Into<Arc<str>>) -> Self {
        Self {
            text: text.into(),
            language_id: "markdown".to_string(),
            caret: 0,
            visible_lines: 0..usize::MAX,
        }
    }

    pub fn is_markdown(&self) -> bool {
        self.language_id == "markdown"
    }
}

/// Converts formula source (LaTeX) to an image.
///
/// Converters must be pure: the same source always yields the same image. The engine caches
/// results per source string.
pub trait FormulaConverter {
    fn render(&self, source: &str) -> Result<RenderedImage, String>;
}

/// A converter that never renders; formulas stay plain text.
pub struct NoFormulas;

impl FormulaConverter for NoFormulas {
    fn render(&self, _source: &str) -> Result<RenderedImage, String> {
        Err("formula rendering is not available".to_string())
    }
}

/// An in-memory [`EditorHost`] that records every decoration it is asked to paint.
///
/// Useful for headless rendering (dumping decorations of a file) and for tests.
#[derive(Debug, Default)]
pub struct MemoryHost {
    pub document: Option<ActiveDocument>,
    next_handle: u64,
    styles: BTreeMap<DecorationHandle, DecorationStyle>,
    painted: BTreeMap<DecorationHandle, Vec<Range<usize>>>,
    set_calls: usize,
    disposed: Vec<DecorationHandle>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: ActiveDocument) -> Self {
        Self {
            document: Some(document),
            ..Default::default()
        }
    }

    /// Replaces the document text (an edit).
    pub fn set_text(&mut self, text: impl Into<Arc<str>>) {
        if let Some(doc) = self.document.as_mut() {
            doc.text = text.into();
        }
    }

    pub fn set_caret(&mut self, caret: usize) {
        if let Some(doc) = self.document.as_mut() {
            doc.caret = caret;
        }
    }

    pub fn set_visible_lines(&mut self, lines: Range<usize>) {
        if let Some(doc) = self.document.as_mut() {
            doc.visible_lines = lines;
        }
    }

    pub fn style(&self, handle: DecorationHandle) -> Option<&DecorationStyle> {
        self.styles.get(&handle)
    }

    /// Ranges currently painted for `handle`.
    pub fn ranges(&self, handle: DecorationHandle) -> &[Range<usize>] {
        self.painted.get(&handle).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every painted decoration type with a non-empty range set, in handle order.
    pub fn painted(&self) -> impl Iterator<Item = (&DecorationStyle, &[Range<usize>])> {
        self.painted
            .iter()
            .filter(|(_, ranges)| !ranges.is_empty())
            .filter_map(|(handle, ranges)| Some((self.styles.get(handle)?, ranges.as_slice())))
    }

    /// Ranges painted with a style matching `pred`, merged and sorted.
    pub fn ranges_where(&self, pred: impl Fn(&DecorationStyle) -> bool) -> Vec<Range<usize>> {
        let mut out: Vec<Range<usize>> = self
            .painted()
            .filter(|(style, _)| pred(style))
            .flat_map(|(_, ranges)| ranges.iter().cloned())
            .collect();
        out.sort_by_key(|r| (r.start, r.end));
        out
    }

    /// Decoration types created so far, disposed ones included.
    pub fn created_types(&self) -> usize {
        self.next_handle as usize
    }

    /// Decoration types created and not yet disposed.
    pub fn live_types(&self) -> usize {
        self.styles.len()
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls
    }

    pub fn disposed(&self) -> &[DecorationHandle] {
        &self.disposed
    }
}

impl EditorHost for MemoryHost {
    fn create_decoration_type(&mut self, style: &DecorationStyle) -> DecorationHandle {
        self.next_handle += 1;
        let handle = DecorationHandle(self.next_handle);
        self.styles.insert(handle, style.clone());
        handle
    }

    fn set_decorations(&mut self, handle: DecorationHandle, ranges: &[Range<usize>]) {
        self.set_calls += 1;
        self.painted.insert(handle, ranges.to_vec());
    }

    fn dispose_decoration_type(&mut self, handle: DecorationHandle) {
        self.styles.remove(&handle);
        self.painted.remove(&handle);
        self.disposed.push(handle);
    }

    fn active_document(&self) -> Option<ActiveDocument> {
        self.document.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_host_tracks_painted_ranges() {
        let mut host = MemoryHost::with_document(ActiveDocument::markdown("# hi"));
        let hide = host.create_decoration_type(&DecorationStyle {
            hidden: true,
            ..Default::default()
        });
        host.set_decorations(hide, &[0..2]);
        assert_eq!(host.ranges(hide), &[0..2]);
        assert_eq!(host.ranges_where(|s| s.hidden), vec![0..2]);

        host.set_decorations(hide, &[]);
        assert_eq!(host.painted().count(), 0);
        assert_eq!(host.set_calls(), 2);
    }

    #[test]
    fn disposing_forgets_style() {
        let mut host = MemoryHost::new();
        let h = host.create_decoration_type(&DecorationStyle::default());
        host.dispose_decoration_type(h);
        assert!(host.style(h).is_none());
        assert_eq!(host.disposed(), &[h]);
        assert_eq!(host.created_types(), 1);
        assert_eq!(host.live_types(), 0);
    }

    #[test]
    fn no_formulas_always_fails() {
        assert!(NoFormulas.render("x^2").is_err());
    }
}
