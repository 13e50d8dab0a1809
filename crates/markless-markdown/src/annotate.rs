use markless_core::cache::RenderCache;
use markless_core::config::FontMetrics;
use markless_core::config::MarklessConfig;
use markless_core::decoration::DecorationKey;
use markless_core::decoration::DecorationStyle;
use markless_core::host::FormulaConverter;
use markless_core::theme::Palette;
use std::ops::Range;

use crate::accumulate::DecorationLanes;
use crate::accumulate::ImageEntry;
use crate::diagram::DiagramJob;
use crate::diagram::DiagramKey;
use crate::diagram::RenderOutcome;
use crate::handlers::HandlerError;
use crate::handlers::HandlerTable;
use crate::parse::MdNode;
use crate::parse::NodeKind;

/// Content-keyed render results that survive across passes.
#[derive(Debug)]
pub struct ContentCaches {
    pub formulas: RenderCache<String, RenderOutcome>,
    pub diagrams: RenderCache<DiagramKey, RenderOutcome>,
}

impl ContentCaches {
    pub fn new(config: &MarklessConfig) -> Self {
        Self {
            formulas: RenderCache::bounded(config.formula_cache_capacity),
            diagrams: RenderCache::bounded(config.diagram_cache_capacity),
        }
    }

    pub fn clear(&mut self) {
        self.formulas.clear();
        self.diagrams.clear();
    }
}

/// Traversal state threaded through the walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NodeScope {
    /// Number of enclosing list nodes.
    pub list_depth: usize,
}

impl NodeScope {
    /// Zero-based nesting level of the innermost list (`0` for a top-level list).
    pub fn list_level(self) -> usize {
        self.list_depth.saturating_sub(1)
    }

    fn enter_list(self) -> Self {
        Self {
            list_depth: self.list_depth + 1,
        }
    }
}

/// Everything a handler may read or produce during one pass.
pub struct DecorationSink<'a> {
    text: &'a str,
    palette: &'a Palette,
    metrics: &'a FontMetrics,
    base_url: Option<&'a str>,
    converter: &'a dyn FormulaConverter,
    caches: &'a mut ContentCaches,
    lanes: DecorationLanes,
    images: Vec<ImageEntry>,
    diagram_jobs: Vec<DiagramJob>,
}

/// Result of annotating one document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Annotations {
    pub lanes: DecorationLanes,
    pub images: Vec<ImageEntry>,
    pub diagram_jobs: Vec<DiagramJob>,
}

impl<'a> DecorationSink<'a> {
    pub fn new(
        text: &'a str,
        palette: &'a Palette,
        metrics: &'a FontMetrics,
        base_url: Option<&'a str>,
        converter: &'a dyn FormulaConverter,
        caches: &'a mut ContentCaches,
    ) -> Self {
        Self {
            text,
            palette,
            metrics,
            base_url,
            converter,
            caches,
            lanes: DecorationLanes::new(),
            images: Vec::new(),
            diagram_jobs: Vec::new(),
        }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    /// The source text covered by `range`.
    pub fn slice(&self, range: &Range<usize>) -> Result<&'a str, HandlerError> {
        self.text
            .get(range.clone())
            .ok_or_else(|| HandlerError::InvalidSpan(range.clone()))
    }

    pub fn palette(&self) -> &'a Palette {
        self.palette
    }

    pub fn metrics(&self) -> &'a FontMetrics {
        self.metrics
    }

    pub fn base_url(&self) -> Option<&'a str> {
        self.base_url
    }

    pub fn converter(&self) -> &'a dyn FormulaConverter {
        self.converter
    }

    pub fn caches(&mut self) -> &mut ContentCaches {
        &mut *self.caches
    }

    /// Adds a range for a key whose style comes from the palette.
    pub fn add(&mut self, key: DecorationKey, range: Range<usize>) {
        let palette = self.palette;
        let style_key = key.clone();
        let len = self.text.len();
        self.lanes.add(
            key,
            move || style_key.style(palette).unwrap_or_default(),
            range,
            len,
        );
    }

    /// Adds a range for a key whose style is built by the caller (image-carrying keys).
    pub fn add_styled(&mut self, key: DecorationKey, style: DecorationStyle, range: Range<usize>) {
        let len = self.text.len();
        self.lanes.add(key, move || style, range, len);
    }

    pub fn push_image(&mut self, entry: ImageEntry) {
        self.images.push(entry);
    }

    pub fn queue_diagram(&mut self, job: DiagramJob) {
        if !self.diagram_jobs.iter().any(|queued| queued.key == job.key) {
            self.diagram_jobs.push(job);
        }
    }

    pub fn finish(mut self) -> Annotations {
        self.lanes.finish();
        Annotations {
            lanes: self.lanes,
            images: self.images,
            diagram_jobs: self.diagram_jobs,
        }
    }
}

/// Which top-level blocks a pass visits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum WalkScope {
    #[default]
    Full,
    /// Only blocks intersecting `window` (or containing `change_offset`).
    Window {
        window: Range<usize>,
        change_offset: Option<usize>,
    },
}

impl WalkScope {
    fn includes(&self, block: &Range<usize>) -> bool {
        match self {
            WalkScope::Full => true,
            WalkScope::Window {
                window,
                change_offset,
            } => {
                (block.start < window.end && window.start < block.end.max(block.start + 1))
                    || change_offset.is_some_and(|offset| block.start <= offset && offset <= block.end)
            }
        }
    }
}

/// Walks `root` depth-first and runs the registered handler for every node.
///
/// Handler failures are logged and skipped; the remaining nodes are still decorated.
pub fn walk(root: &MdNode, table: &HandlerTable, scope: &WalkScope, sink: &mut DecorationSink<'_>) {
    for block in root.children.iter().filter(|b| scope.includes(&b.range)) {
        visit(block, NodeScope::default(), table, sink);
    }
}

fn visit(node: &MdNode, scope: NodeScope, table: &HandlerTable, sink: &mut DecorationSink<'_>) {
    if let Some(handler) = table.get(node.node_type())
        && let Err(err) = (handler.run)(node, scope, sink)
    {
        tracing::warn!(
            feature = handler.feature.name(),
            range = ?node.range,
            %err,
            "decoration handler failed"
        );
    }

    let scope = match node.kind {
        NodeKind::List { .. } => scope.enter_list(),
        _ => scope,
    };
    for child in &node.children {
        visit(child, scope, table, sink);
    }
}
