//! Incremental update controller.
//!
//! The controller owns the per-configuration [`Session`] and decides when the active document
//! needs a new decoration pass. Events only *schedule* work; [`Controller::flush`] runs at most
//! one pass no matter how many events were coalesced.
//!
//! A pass is split in three steps so callers can interleave other work:
//!
//! - [`Controller::begin_pass`] snapshots the document and tags it with the current [`Epoch`].
//! - [`Controller::annotate`] parses and walks the snapshot.
//! - [`Controller::commit`] applies the result, unless a newer pass was scheduled meanwhile.
//!
//! [`Controller::recompute`] runs all three steps synchronously.
use markless_bridge::RendererBridge;
use markless_core::cache::RenderCache;
use markless_core::config::EditorFontConfig;
use markless_core::config::FontMetrics;
use markless_core::config::MarklessConfig;
use markless_core::config::Platform;
use markless_core::decoration::DecorationHandle;
use markless_core::decoration::DecorationKey;
use markless_core::host::ActiveDocument;
use markless_core::host::EditorHost;
use markless_core::host::FormulaConverter;
use markless_core::host::NoFormulas;
use markless_core::theme::Palette;
use markless_core::theme::ThemeKind;
use markless_core::viewport::LineIndex;
use markless_core::viewport::expand_window;
use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use crate::accumulate::DecorationLanes;
use crate::accumulate::ImageEntry;
use crate::annotate::ContentCaches;
use crate::annotate::DecorationSink;
use crate::annotate::WalkScope;
use crate::annotate::walk;
use crate::diagram::DiagramBatch;
use crate::diagram::DiagramJob;
use crate::diagram::render_jobs;
use crate::handlers::HandlerTable;
use crate::handlers::render_formula;
use crate::parse::parse;
use crate::reveal;
use crate::reveal::LinePreview;
use crate::reveal::Reveal;

/// Monotonic pass tag used to discard stale results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

impl Epoch {
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum EditorEvent {
    /// The active document's text changed. One offset per change record.
    DocumentChanged { change_offsets: Vec<usize> },
    SelectionChanged,
    VisibleRangeChanged,
    ActiveEditorChanged,
    ConfigurationChanged {
        config: MarklessConfig,
        font: EditorFontConfig,
    },
    ThemeChanged(ThemeKind),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The pass was applied; `changed` decoration types had their ranges replaced.
    Applied { changed: usize },
    /// A newer pass was scheduled after this one began.
    Stale,
    Disabled,
    /// No markdown document is active.
    Inactive,
}

/// Everything derived from one configuration + theme. Replaced wholesale on reconfiguration.
pub struct Session {
    config: MarklessConfig,
    font: EditorFontConfig,
    metrics: FontMetrics,
    palette: Palette,
    table: HandlerTable,
    handles: RenderCache<DecorationKey, DecorationHandle>,
    caches: ContentCaches,
}

impl Session {
    pub fn new(
        config: MarklessConfig,
        font: EditorFontConfig,
        theme: ThemeKind,
        platform: Platform,
    ) -> Self {
        let config = config.sanitized();
        let metrics = FontMetrics::resolve(&font, platform);
        let table = HandlerTable::from_config(&config);
        let caches = ContentCaches::new(&config);
        Self {
            config,
            font,
            metrics,
            palette: Palette::for_theme(theme),
            table,
            handles: RenderCache::unbounded(),
            caches,
        }
    }

    pub fn config(&self) -> &MarklessConfig {
        &self.config
    }

    pub fn metrics(&self) -> &FontMetrics {
        &self.metrics
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn table(&self) -> &HandlerTable {
        &self.table
    }

    pub fn theme(&self) -> ThemeKind {
        self.palette.kind
    }
}

/// Document state captured at the start of a pass.
#[derive(Clone, Debug)]
pub struct PassSnapshot {
    pub epoch: Epoch,
    pub document: ActiveDocument,
    pub change_offset: Option<usize>,
}

/// Output of [`Controller::annotate`], waiting to be committed.
#[derive(Clone, Debug)]
pub struct PassResult {
    pub epoch: Epoch,
    pub text: Arc<str>,
    pub caret: usize,
    pub lanes: DecorationLanes,
    pub images: Vec<ImageEntry>,
    pub diagram_jobs: Vec<DiagramJob>,
}

#[derive(Clone, Debug)]
struct Committed {
    text: Arc<str>,
    caret: usize,
    hidden: Vec<Range<usize>>,
}

pub struct Controller {
    session: Session,
    platform: Platform,
    converter: Arc<dyn FormulaConverter>,
    enabled: bool,
    active: bool,
    epoch: Epoch,
    pending: bool,
    change_offset: Option<usize>,
    applied: BTreeMap<DecorationKey, Vec<Range<usize>>>,
    images: Vec<ImageEntry>,
    diagram_jobs: Vec<DiagramJob>,
    committed: Option<Committed>,
}

impl Controller {
    pub fn new(config: MarklessConfig, font: EditorFontConfig, theme: ThemeKind) -> Self {
        let platform = Platform::current();
        Self {
            session: Session::new(config, font, theme, platform),
            platform,
            converter: Arc::new(NoFormulas),
            enabled: true,
            active: true,
            epoch: Epoch::default(),
            pending: false,
            change_offset: None,
            applied: BTreeMap::new(),
            images: Vec::new(),
            diagram_jobs: Vec::new(),
            committed: None,
        }
    }

    pub fn with_formula_converter(mut self, converter: Arc<dyn FormulaConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Overrides the platform used for line height defaults (and re-resolves font metrics).
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self.session = Session::new(
            self.session.config.clone(),
            self.session.font.clone(),
            self.session.theme(),
            platform,
        );
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &MarklessConfig {
        &self.session.config
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Images found by the last committed pass.
    pub fn images(&self) -> &[ImageEntry] {
        &self.images
    }

    /// The image under `offset`, if hover previews are enabled.
    pub fn image_at(&self, offset: usize) -> Option<&ImageEntry> {
        if !self.session.config.hover_image {
            return None;
        }
        self.images
            .iter()
            .find(|image| image.range.start <= offset && offset < image.range.end)
    }

    /// Images to show inline without hovering (`inlineImage.autoPreview`).
    pub fn auto_preview_images(&self) -> &[ImageEntry] {
        if self.session.config.inline_image.auto_preview {
            &self.images
        } else {
            &[]
        }
    }

    /// Diagrams the last pass could not show because they are not rendered yet.
    pub fn pending_diagrams(&self) -> &[DiagramJob] {
        &self.diagram_jobs
    }

    /// Ranges currently applied for `key`.
    pub fn applied(&self, key: &DecorationKey) -> &[Range<usize>] {
        self.applied.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Marks a pass as needed and invalidates every pass already in flight.
    pub fn schedule(&mut self) {
        self.epoch = self.epoch.next();
        self.pending = true;
    }

    /// Applies the event policy. Returns `true` if a pass was scheduled.
    pub fn handle_event<H: EditorHost>(&mut self, host: &mut H, event: EditorEvent) -> bool {
        match event {
            EditorEvent::DocumentChanged { change_offsets } => {
                if !self.active {
                    return false;
                }
                self.change_offset = match change_offsets.as_slice() {
                    [offset] => Some(*offset),
                    _ => None,
                };
                self.schedule();
                true
            }
            EditorEvent::SelectionChanged => {
                if self.active {
                    self.schedule();
                }
                self.active
            }
            EditorEvent::VisibleRangeChanged => {
                let large = host.active_document().is_some_and(|doc| {
                    LineIndex::new(&doc.text).line_count() > self.session.config.large_document_lines
                });
                if self.active && large {
                    self.schedule();
                    return true;
                }
                false
            }
            EditorEvent::ActiveEditorChanged => {
                let markdown = host
                    .active_document()
                    .is_some_and(|doc| doc.is_markdown());
                if markdown {
                    self.active = true;
                    self.schedule();
                } else {
                    self.deactivate(host);
                }
                markdown
            }
            EditorEvent::ConfigurationChanged { config, font } => {
                self.reconfigure(host, config, font);
                true
            }
            EditorEvent::ThemeChanged(theme) => {
                self.set_theme(host, theme);
                true
            }
        }
    }

    /// Runs one pass if any was scheduled since the last flush.
    pub fn flush<H: EditorHost>(&mut self, host: &mut H) -> Option<CommitOutcome> {
        if !self.pending {
            return None;
        }
        self.pending = false;
        Some(self.run_pass(host))
    }

    /// Recomputes decorations for the active document now.
    ///
    /// Calling this repeatedly on an unchanged document does not touch the host.
    pub fn recompute<H: EditorHost>(&mut self, host: &mut H) -> CommitOutcome {
        self.schedule();
        self.pending = false;
        self.run_pass(host)
    }

    fn run_pass<H: EditorHost>(&mut self, host: &mut H) -> CommitOutcome {
        match self.begin_pass(host) {
            Ok(snapshot) => {
                let result = self.annotate(&snapshot);
                self.commit(host, result)
            }
            Err(outcome) => outcome,
        }
    }

    /// Captures the active document for a pass tagged with the current epoch.
    pub fn begin_pass<H: EditorHost>(&mut self, host: &mut H) -> Result<PassSnapshot, CommitOutcome> {
        if !self.enabled {
            return Err(CommitOutcome::Disabled);
        }
        match host.active_document() {
            Some(document) if document.is_markdown() => {
                self.active = true;
                Ok(PassSnapshot {
                    epoch: self.epoch,
                    document,
                    change_offset: self.change_offset.take(),
                })
            }
            _ => {
                self.deactivate(host);
                Err(CommitOutcome::Inactive)
            }
        }
    }

    /// Parses and walks a snapshot. Does not touch the host.
    pub fn annotate(&mut self, snapshot: &PassSnapshot) -> PassResult {
        let started = Instant::now();
        let text = snapshot.document.text.clone();
        let root = parse(&text);

        let lines = LineIndex::new(&text);
        let scope = if lines.line_count() > self.session.config.large_document_lines {
            let visible = expand_window(snapshot.document.visible_lines.clone(), lines.line_count());
            WalkScope::Window {
                window: lines.byte_range(visible),
                change_offset: snapshot.change_offset,
            }
        } else {
            WalkScope::Full
        };

        let session = &mut self.session;
        let mut sink = DecorationSink::new(
            &text,
            &session.palette,
            &session.metrics,
            session.config.base_url.as_deref(),
            self.converter.as_ref(),
            &mut session.caches,
        );
        walk(&root, &session.table, &scope, &mut sink);
        let annotations = sink.finish();

        tracing::debug!(
            epoch = snapshot.epoch.get(),
            bytes = text.len(),
            lanes = annotations.lanes.len(),
            windowed = matches!(scope, WalkScope::Window { .. }),
            elapsed = ?started.elapsed(),
            "annotated document"
        );

        PassResult {
            epoch: snapshot.epoch,
            caret: snapshot.document.caret.min(text.len()),
            text,
            lanes: annotations.lanes,
            images: annotations.images,
            diagram_jobs: annotations.diagram_jobs,
        }
    }

    /// Applies a pass result unless it is stale or the controller was disabled meanwhile.
    pub fn commit<H: EditorHost>(&mut self, host: &mut H, result: PassResult) -> CommitOutcome {
        if result.epoch != self.epoch {
            tracing::debug!(
                pass = result.epoch.get(),
                current = self.epoch.get(),
                "discarding stale pass"
            );
            return CommitOutcome::Stale;
        }
        if !self.enabled {
            return CommitOutcome::Disabled;
        }

        let mut changed = 0;
        for (key, lane) in result.lanes.iter() {
            let handle = self
                .session
                .handles
                .get_or_insert_with(key.clone(), |_| host.create_decoration_type(&lane.style));
            if self.applied.get(key) == Some(&lane.ranges) {
                continue;
            }
            host.set_decorations(handle, &lane.ranges);
            self.applied.insert(key.clone(), lane.ranges.clone());
            changed += 1;
        }

        let stale: Vec<DecorationKey> = self
            .applied
            .keys()
            .filter(|key| result.lanes.get(key).is_none())
            .cloned()
            .collect();
        for key in stale {
            let ranges = self.applied.remove(&key).unwrap_or_default();
            if !ranges.is_empty()
                && let Some(handle) = self.session.handles.get(&key)
            {
                host.set_decorations(handle, &[]);
                changed += 1;
            }
            if key.is_content_keyed()
                && let Some(handle) = self.session.handles.remove(&key)
            {
                tracing::trace!(?key, "releasing content decoration type");
                host.dispose_decoration_type(handle);
            }
        }

        self.committed = Some(Committed {
            hidden: result.lanes.hidden_ranges().cloned().collect(),
            text: result.text,
            caret: result.caret,
        });
        self.images = result.images;
        self.diagram_jobs = result.diagram_jobs;
        CommitOutcome::Applied { changed }
    }

    /// Takes the diagrams the last pass queued, tagged with the current epoch.
    ///
    /// Render them with [`render_jobs`] without holding the controller, then hand the batch to
    /// [`Self::store_diagrams`]. Events may be handled in between.
    pub fn take_diagram_jobs(&mut self) -> (Epoch, Vec<DiagramJob>) {
        (self.epoch, std::mem::take(&mut self.diagram_jobs))
    }

    /// Caches a rendered batch and re-runs the pass to show it.
    ///
    /// A batch whose epoch is no longer current is dropped; the next pass queues its diagrams
    /// again.
    pub fn store_diagrams<H: EditorHost>(
        &mut self,
        host: &mut H,
        epoch: Epoch,
        batch: DiagramBatch,
    ) -> CommitOutcome {
        tracing::debug!(
            epoch = epoch.get(),
            rendered = batch.rendered(),
            failed = batch.failed(),
            deferred = batch.deferred.len(),
            "diagram batch finished"
        );
        if epoch != self.epoch {
            tracing::debug!(
                batch = epoch.get(),
                current = self.epoch.get(),
                "discarding stale diagram batch"
            );
            return CommitOutcome::Stale;
        }
        if !batch.changed() {
            self.diagram_jobs = batch.deferred;
            return CommitOutcome::Applied { changed: 0 };
        }
        batch.store(&mut self.session.caches.diagrams);
        self.recompute(host)
    }

    /// Recomputes, renders any diagrams the pass discovered, then recomputes again to show them.
    ///
    /// Holds the controller until every render finished. Hosts that keep handling events while
    /// diagrams render use [`Self::take_diagram_jobs`] and [`Self::store_diagrams`] instead.
    pub async fn recompute_with_diagrams<H: EditorHost>(
        &mut self,
        host: &mut H,
        bridge: &RendererBridge,
    ) -> CommitOutcome {
        let outcome = self.recompute(host);
        if !matches!(outcome, CommitOutcome::Applied { .. }) {
            return outcome;
        }
        let (epoch, jobs) = self.take_diagram_jobs();
        if jobs.is_empty() {
            return outcome;
        }
        let batch = render_jobs(bridge, jobs).await;
        self.store_diagrams(host, epoch, batch)
    }

    pub fn enable<H: EditorHost>(&mut self, host: &mut H) -> CommitOutcome {
        self.enabled = true;
        self.recompute(host)
    }

    /// Clears every applied range. Decoration types are kept for a later [`Self::enable`].
    pub fn disable<H: EditorHost>(&mut self, host: &mut H) {
        self.enabled = false;
        self.pending = false;
        self.epoch = self.epoch.next();
        self.clear_applied(host);
    }

    /// Flips between enabled and disabled. Returns the new state.
    pub fn toggle<H: EditorHost>(&mut self, host: &mut H) -> bool {
        if self.enabled {
            self.disable(host);
        } else {
            self.enable(host);
        }
        self.enabled
    }

    /// Replaces the session: clears applied ranges, disposes decoration types, drops caches.
    pub fn reconfigure<H: EditorHost>(
        &mut self,
        host: &mut H,
        config: MarklessConfig,
        font: EditorFontConfig,
    ) {
        let theme = self.session.theme();
        self.reset(host, Session::new(config, font, theme, self.platform));
    }

    pub fn set_theme<H: EditorHost>(&mut self, host: &mut H, theme: ThemeKind) {
        let config = self.session.config.clone();
        let font = self.session.font.clone();
        self.reset(host, Session::new(config, font, theme, self.platform));
    }

    fn reset<H: EditorHost>(&mut self, host: &mut H, session: Session) {
        self.clear_applied(host);
        self.applied.clear();
        for (_, handle) in self.session.handles.drain() {
            host.dispose_decoration_type(handle);
        }
        self.session.caches.clear();
        self.session = session;
        self.images.clear();
        self.diagram_jobs.clear();
        self.committed = None;
        tracing::debug!(features = self.session.table.len(), "session rebuilt");
        self.schedule();
    }

    fn deactivate<H: EditorHost>(&mut self, host: &mut H) {
        if self.active {
            tracing::debug!("active editor is not markdown, deactivating");
        }
        self.active = false;
        self.clear_applied(host);
        self.images.clear();
        self.diagram_jobs.clear();
        self.committed = None;
    }

    /// Paints every applied key empty. Keys stay known so the next commit can release the
    /// content-keyed ones it no longer needs.
    fn clear_applied<H: EditorHost>(&mut self, host: &mut H) {
        for (key, ranges) in self.applied.iter_mut() {
            if ranges.is_empty() {
                continue;
            }
            if let Some(handle) = self.session.handles.get(key) {
                host.set_decorations(handle, &[]);
            }
            ranges.clear();
        }
    }

    /// Popup for the caret of the last committed pass, if the caret touches hidden syntax.
    pub fn reveal(&mut self) -> Option<Reveal> {
        let committed = self.committed.as_ref()?;
        let converter = self.converter.as_ref();
        let formulas = &mut self.session.caches.formulas;
        let math = self.session.config.math;
        reveal::compute(
            &committed.text,
            committed.caret,
            &committed.hidden,
            |source| {
                if !math {
                    return None;
                }
                formulas
                    .get_or_insert_with(source.to_string(), |src| {
                        render_formula(converter, src).unwrap_or_else(|err| Err(err.to_string()))
                    })
                    .ok()
            },
        )
    }

    /// The caret's line as a preview, regardless of hidden ranges.
    pub fn line_preview<H: EditorHost>(&self, host: &H) -> Option<LinePreview> {
        let document = host.active_document().filter(|doc| doc.is_markdown())?;
        let caret = document.caret.min(document.text.len());
        Some(reveal::line_preview(&document.text, caret))
    }
}
