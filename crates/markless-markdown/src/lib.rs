//! Markdown decoration engine for `markless`.
//!
//! Renders markdown source as a richer presentation inside a text editor without touching the
//! text: headings are enlarged, list bullets colored, quotes tinted, images and formulas shown
//! inline, and `mermaid` fences replaced by rendered diagrams.
//!
//! ## Layers
//!
//! - [`parse`]: turns `pulldown-cmark`'s offset event stream into an [`parse::MdNode`] tree.
//! - [`handlers`]: per-node-type handlers, registered per enabled feature.
//! - [`annotate`]: one depth-first walk per pass, collecting ranges into [`accumulate`] lanes.
//! - [`controller`]: decides when to recompute, tags passes with epochs, and diffs results
//!   against what the host already shows.
//! - [`reveal`]: caret popup surfacing hidden syntax.
//!
//! ```rust
//! use markless_core::config::EditorFontConfig;
//! use markless_core::config::MarklessConfig;
//! use markless_core::host::ActiveDocument;
//! use markless_core::host::MemoryHost;
//! use markless_core::theme::ThemeKind;
//! use markless_markdown::controller::Controller;
//!
//! let mut host = MemoryHost::with_document(ActiveDocument::markdown("# Title"));
//! let mut controller = Controller::new(
//!     MarklessConfig::default(),
//!     EditorFontConfig::default(),
//!     ThemeKind::Dark,
//! );
//! controller.recompute(&mut host);
//! assert_eq!(host.ranges_where(|style| style.hidden), vec![0..2]);
//! ```
pub mod accumulate;
pub mod annotate;
pub mod controller;
pub mod diagram;
pub mod handlers;
pub mod parse;
pub mod reveal;

pub use controller::Controller;
pub use controller::EditorEvent;
