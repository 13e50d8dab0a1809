//! `markless-core` provides the building blocks shared by the markless decoration engine.
//!
//! This crate is host-agnostic: it knows nothing about markdown parsing or any particular editor.
//! Markdown-specific logic (handler table, tree walk, incremental controller) lives in
//! `markless-markdown`, and the async renderer bridge lives in `markless-bridge`.
//!
//! ## Design goals
//!
//! - Never mutate document text: everything here describes *overlays* (decorations).
//! - Host objects are expensive: decoration types are memoized per [`decoration::DecorationKey`]
//!   through a [`cache::RenderCache`] and only recreated after a reconfiguration.
//! - Configuration problems clamp instead of failing (see [`config`]).
//!
//! Useful entry points:
//! - [`host::EditorHost`]: the painting surface the engine drives.
//! - [`host::MemoryHost`]: an in-memory host for headless use and tests.
//! - [`config::MarklessConfig`] + [`config::FontMetrics`]: resolved settings for a session.
//! - [`theme::Palette`]: theme-dependent colors.
pub mod cache;
pub mod config;
pub mod decoration;
pub mod host;
pub mod theme;
pub mod viewport;
