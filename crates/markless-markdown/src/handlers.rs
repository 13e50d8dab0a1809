//! Per-node-type decoration handlers.
//!
//! Each enabled feature contributes one handler, keyed by the node type it decorates. The table
//! is rebuilt whenever the configuration changes; a disabled feature simply has no entry.
use markless_core::config::MarklessConfig;
use markless_core::decoration::DecorationImage;
use markless_core::decoration::DecorationKey;
use markless_core::decoration::DecorationStyle;
use markless_core::host::FormulaConverter;
use regex::Regex;
use std::collections::BTreeMap;
use std::ops::Range;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

use crate::accumulate::ImageEntry;
use crate::annotate::DecorationSink;
use crate::annotate::NodeScope;
use crate::diagram::DiagramJob;
use crate::diagram::DiagramKey;
use crate::diagram::RenderOutcome;
use crate::parse::MdNode;
use crate::parse::NodeKind;
use crate::parse::NodeType;

static IMAGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[(.*)\]\(.+?\)").expect("image pattern is valid"));

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("node span {0:?} is not a valid slice of the document")]
    InvalidSpan(Range<usize>),
    #[error("formula converter panicked: {0}")]
    ConverterPanicked(String),
}

/// A configurable decoration feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    Heading,
    Quote,
    InlineCode,
    Link,
    List,
    Math,
    Mermaid,
}

impl Feature {
    pub const ALL: [Feature; 7] = [
        Feature::Heading,
        Feature::Quote,
        Feature::InlineCode,
        Feature::Link,
        Feature::List,
        Feature::Math,
        Feature::Mermaid,
    ];

    /// Configuration key of the feature toggle.
    pub fn name(self) -> &'static str {
        match self {
            Feature::Heading => "heading",
            Feature::Quote => "quote",
            Feature::InlineCode => "inlineCode",
            Feature::Link => "link",
            Feature::List => "list",
            Feature::Math => "math",
            Feature::Mermaid => "mermaid",
        }
    }

    pub fn is_enabled(self, config: &MarklessConfig) -> bool {
        match self {
            Feature::Heading => config.heading,
            Feature::Quote => config.quote,
            Feature::InlineCode => config.inline_code,
            Feature::Link => config.link,
            Feature::List => config.list,
            Feature::Math => config.math,
            Feature::Mermaid => config.mermaid,
        }
    }

    pub fn node_type(self) -> NodeType {
        match self {
            Feature::Heading => NodeType::Heading,
            Feature::Quote => NodeType::BlockQuote,
            Feature::InlineCode => NodeType::InlineCode,
            Feature::Link => NodeType::Image,
            Feature::List => NodeType::ListItem,
            Feature::Math => NodeType::InlineMath,
            Feature::Mermaid => NodeType::CodeBlock,
        }
    }

    fn handler(self) -> HandlerFn {
        match self {
            Feature::Heading => heading,
            Feature::Quote => blockquote,
            Feature::InlineCode => inline_code,
            Feature::Link => image,
            Feature::List => list_item,
            Feature::Math => inline_math,
            Feature::Mermaid => diagram,
        }
    }
}

pub type HandlerFn = fn(&MdNode, NodeScope, &mut DecorationSink<'_>) -> Result<(), HandlerError>;

#[derive(Clone, Copy, Debug)]
pub struct Handler {
    pub feature: Feature,
    pub run: HandlerFn,
}

/// Node type to handler registry for one configuration.
#[derive(Clone, Debug, Default)]
pub struct HandlerTable {
    entries: BTreeMap<NodeType, Handler>,
}

impl HandlerTable {
    pub fn from_config(config: &MarklessConfig) -> Self {
        let entries = Feature::ALL
            .into_iter()
            .filter(|feature| feature.is_enabled(config))
            .map(|feature| {
                (
                    feature.node_type(),
                    Handler {
                        feature,
                        run: feature.handler(),
                    },
                )
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, node_type: NodeType) -> Option<&Handler> {
        self.entries.get(&node_type)
    }

    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        self.entries.values().map(|handler| handler.feature)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hides the `#` run (plus one space) and enlarges the heading text.
pub fn heading(
    node: &MdNode,
    _scope: NodeScope,
    sink: &mut DecorationSink<'_>,
) -> Result<(), HandlerError> {
    let NodeKind::Heading { depth, setext } = node.kind else {
        return Ok(());
    };
    let slice = sink.slice(&node.range)?;
    let key = DecorationKey::Heading {
        size: sink.metrics().heading_size(depth),
        theme: sink.palette().kind,
    };
    let start = node.range.start;

    if setext {
        let text_end = slice.rfind('\n').unwrap_or(slice.len());
        let text_end = slice[..text_end].trim_end_matches('\r').len();
        sink.add(key, start..start + text_end);
        return Ok(());
    }

    let indent = slice.len() - slice.trim_start_matches(' ').len();
    let hashes = slice[indent..].bytes().take_while(|b| *b == b'#').count();
    let mut marker_end = indent + hashes;
    if slice[marker_end..].starts_with([' ', '\t']) {
        marker_end += 1;
    }
    sink.add(DecorationKey::Hide, start..start + marker_end);
    sink.add(key, start + marker_end..node.range.end);
    Ok(())
}

pub fn blockquote(
    node: &MdNode,
    _scope: NodeScope,
    sink: &mut DecorationSink<'_>,
) -> Result<(), HandlerError> {
    sink.add(DecorationKey::Quote, node.range.clone());
    Ok(())
}

/// Borders the code content and makes the backtick runs transparent.
pub fn inline_code(
    node: &MdNode,
    _scope: NodeScope,
    sink: &mut DecorationSink<'_>,
) -> Result<(), HandlerError> {
    let slice = sink.slice(&node.range)?;
    let open = slice.bytes().take_while(|b| *b == b'`').count();
    let close = slice.bytes().rev().take_while(|b| *b == b'`').count();
    let fence = open.min(close);
    if fence == 0 || slice.len() <= 2 * fence {
        return Ok(());
    }
    let Range { start, end } = node.range;
    sink.add(DecorationKey::Transparent, start..start + fence);
    sink.add(DecorationKey::Transparent, end - fence..end);
    sink.add(DecorationKey::InlineCode, start + fence..end - fence);
    Ok(())
}

/// Hides `![`, styles the alt text as a link, and records the image.
pub fn image(
    node: &MdNode,
    _scope: NodeScope,
    sink: &mut DecorationSink<'_>,
) -> Result<(), HandlerError> {
    let NodeKind::Image { url, alt, .. } = &node.kind else {
        return Ok(());
    };
    let slice = sink.slice(&node.range)?;
    let Some(caps) = IMAGE_PATTERN.captures(slice) else {
        return Ok(());
    };
    let (Some(whole), Some(alt_match)) = (caps.get(0), caps.get(1)) else {
        return Ok(());
    };

    let start = node.range.start + whole.start();
    let alt_len = alt_match.as_str().len();
    sink.add(DecorationKey::Hide, start..start + 2);
    sink.add(DecorationKey::Url, start + 2..start + 2 + alt_len);

    let url = resolve_url(sink.base_url(), url);
    let alt = if alt.is_empty() {
        " ".to_string()
    } else {
        alt.clone()
    };
    sink.push_image(ImageEntry {
        range: node.range.clone(),
        url,
        alt,
    });
    Ok(())
}

/// Colors the list marker by nesting level.
pub fn list_item(
    node: &MdNode,
    scope: NodeScope,
    sink: &mut DecorationSink<'_>,
) -> Result<(), HandlerError> {
    let end = node
        .children
        .first()
        .map(|child| child.range.start)
        .unwrap_or(node.range.end);
    let level = scope.list_level();
    sink.add(
        DecorationKey::Bullet {
            slot: level % sink.palette().bullets.len(),
        },
        node.range.start..end,
    );
    Ok(())
}

/// Replaces `$...$` with the converter's image. Failures leave the source as plain text.
pub fn inline_math(
    node: &MdNode,
    _scope: NodeScope,
    sink: &mut DecorationSink<'_>,
) -> Result<(), HandlerError> {
    let NodeKind::InlineMath { source } = &node.kind else {
        return Ok(());
    };
    if source.trim().is_empty() {
        return Ok(());
    }

    let converter = sink.converter();
    let mut panicked = None;
    let outcome = sink
        .caches()
        .formulas
        .get_or_insert_with(source.clone(), |src| match render_formula(converter, src) {
            Ok(outcome) => outcome,
            Err(err) => {
                let reason = err.to_string();
                panicked = Some(err);
                Err(reason)
            }
        });
    if let Some(err) = panicked {
        return Err(err);
    }

    match outcome {
        Ok(image) => {
            let height = sink.metrics().line_height;
            sink.add_styled(
                DecorationKey::Formula(Arc::from(source.as_str())),
                DecorationStyle {
                    hidden: true,
                    image: Some(DecorationImage {
                        image,
                        height: Some(height),
                    }),
                    ..Default::default()
                },
                node.range.clone(),
            );
        }
        Err(reason) => {
            tracing::trace!(range = ?node.range, %reason, "formula left as text");
        }
    }
    Ok(())
}

/// Shows a rendered diagram over a `mermaid` fence, or queues a render job.
pub fn diagram(
    node: &MdNode,
    _scope: NodeScope,
    sink: &mut DecorationSink<'_>,
) -> Result<(), HandlerError> {
    let NodeKind::CodeBlock {
        language: Some(language),
        content,
    } = &node.kind
    else {
        return Ok(());
    };
    if language != "mermaid" || content.trim().is_empty() {
        return Ok(());
    }

    let slice = sink.slice(&node.range)?;
    let lines = slice.lines().count().max(1) as u32;
    let key = DiagramKey {
        source: content.clone(),
        dark: sink.palette().kind.is_dark(),
    };

    let cached: Option<RenderOutcome> = sink.caches().diagrams.get(&key);
    match cached {
        Some(Ok(image)) => {
            let height = lines * sink.metrics().line_height;
            sink.add_styled(
                DecorationKey::Diagram {
                    source: Arc::from(key.source.as_str()),
                    dark: key.dark,
                    height,
                },
                DecorationStyle {
                    transparent: true,
                    image: Some(DecorationImage {
                        image,
                        height: Some(height),
                    }),
                    ..Default::default()
                },
                node.range.clone(),
            );
        }
        Some(Err(_)) => {}
        None => {
            let font_family = sink.metrics().family.clone();
            sink.queue_diagram(DiagramJob { key, font_family });
        }
    }
    Ok(())
}

pub(crate) fn render_formula(
    converter: &dyn FormulaConverter,
    source: &str,
) -> Result<RenderOutcome, HandlerError> {
    panic::catch_unwind(AssertUnwindSafe(|| converter.render(source)))
        .map_err(|payload| HandlerError::ConverterPanicked(panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Resolves an image destination against the configured base URL.
pub fn resolve_url(base_url: Option<&str>, dest: &str) -> String {
    let dest = dest.trim();
    if dest.is_empty() || is_absolute_url(dest) {
        return dest.to_string();
    }
    let Some(base) = base_url.map(str::trim).filter(|s| !s.is_empty()) else {
        return dest.to_string();
    };

    if let Ok(base) = Url::parse(base) {
        return base
            .join(dest)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| dest.to_string());
    }

    let mut joined = base
        .trim_end_matches('/')
        .trim_end_matches('\\')
        .to_string();
    let dest = dest.trim_start_matches("./").trim_start_matches('/');
    joined.push('/');
    joined.push_str(dest);
    joined
}

fn is_absolute_url(dest: &str) -> bool {
    dest.starts_with('#')
        || dest.starts_with('/')
        || dest.starts_with("data:")
        || dest.starts_with("mailto:")
        || dest.starts_with("http://")
        || dest.starts_with("https://")
        || dest.starts_with("file://")
}
