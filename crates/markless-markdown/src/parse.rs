use pulldown_cmark::CodeBlockKind;
use pulldown_cmark::CowStr;
use pulldown_cmark::Event;
use pulldown_cmark::HeadingLevel;
use pulldown_cmark::Options;
use pulldown_cmark::Parser;
use pulldown_cmark::Tag;
use std::ops::Range;

/// Node category used to look up handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeType {
    Document,
    Paragraph,
    Heading,
    BlockQuote,
    List,
    ListItem,
    CodeBlock,
    InlineCode,
    Image,
    Link,
    Emphasis,
    Strong,
    Strikethrough,
    InlineMath,
    DisplayMath,
    Table,
    FootnoteDefinition,
    Html,
    Rule,
    Text,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Paragraph,
    /// `setext` headings are underlined with `===`/`---` and have no `#` marker run.
    Heading { depth: u8, setext: bool },
    BlockQuote,
    List { ordered: bool },
    ListItem,
    CodeBlock { language: Option<String>, content: String },
    InlineCode { content: String },
    Image { url: String, alt: String, title: String },
    Link { url: String },
    Emphasis,
    Strong,
    Strikethrough,
    InlineMath { source: String },
    DisplayMath { source: String },
    Table,
    FootnoteDefinition,
    Html,
    Rule,
    Text,
    Other,
}

impl NodeKind {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeKind::Document => NodeType::Document,
            NodeKind::Paragraph => NodeType::Paragraph,
            NodeKind::Heading { .. } => NodeType::Heading,
            NodeKind::BlockQuote => NodeType::BlockQuote,
            NodeKind::List { .. } => NodeType::List,
            NodeKind::ListItem => NodeType::ListItem,
            NodeKind::CodeBlock { .. } => NodeType::CodeBlock,
            NodeKind::InlineCode { .. } => NodeType::InlineCode,
            NodeKind::Image { .. } => NodeType::Image,
            NodeKind::Link { .. } => NodeType::Link,
            NodeKind::Emphasis => NodeType::Emphasis,
            NodeKind::Strong => NodeType::Strong,
            NodeKind::Strikethrough => NodeType::Strikethrough,
            NodeKind::InlineMath { .. } => NodeType::InlineMath,
            NodeKind::DisplayMath { .. } => NodeType::DisplayMath,
            NodeKind::Table => NodeType::Table,
            NodeKind::FootnoteDefinition => NodeType::FootnoteDefinition,
            NodeKind::Html => NodeType::Html,
            NodeKind::Rule => NodeType::Rule,
            NodeKind::Text => NodeType::Text,
            NodeKind::Other => NodeType::Other,
        }
    }
}

/// A parsed markdown node with its byte span in the source.
///
/// Spans never include a trailing line terminator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MdNode {
    pub kind: NodeKind,
    pub range: Range<usize>,
    pub children: Vec<MdNode>,
}

impl MdNode {
    fn new(kind: NodeKind, range: Range<usize>) -> Self {
        Self {
            kind,
            range,
            children: Vec::new(),
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.kind.node_type()
    }

    /// Depth-first iterator over this node and all of its descendants.
    pub fn descendants(&self) -> impl Iterator<Item = &MdNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

pub fn parser_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_MATH);
    options
}

/// Parses `text` into a node tree rooted at a [`NodeKind::Document`] spanning the whole input.
pub fn parse(text: &str) -> MdNode {
    let parser = Parser::new_ext(text, parser_options()).into_offset_iter();

    let mut stack = vec![MdNode::new(NodeKind::Document, 0..text.len())];
    for (event, range) in parser {
        let range = trim_line_end(text, range);
        match event {
            Event::Start(tag) => {
                let kind = node_kind(text, &tag, &range);
                stack.push(MdNode::new(kind, range));
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    continue;
                }
                let Some(node) = stack.pop() else {
                    continue;
                };
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Event::Text(t) => {
                if let Some(NodeKind::CodeBlock { content, .. }) =
                    stack.last_mut().map(|n| &mut n.kind)
                {
                    content.push_str(&t);
                }
                if let Some(alt) = image_alt(&mut stack) {
                    alt.push_str(&t);
                }
                push_leaf(&mut stack, NodeKind::Text, range);
            }
            Event::Code(code) => {
                if let Some(alt) = image_alt(&mut stack) {
                    alt.push_str(&code);
                }
                push_leaf(
                    &mut stack,
                    NodeKind::InlineCode {
                        content: code.to_string(),
                    },
                    range,
                );
            }
            Event::InlineMath(math) => push_leaf(
                &mut stack,
                NodeKind::InlineMath {
                    source: math.to_string(),
                },
                range,
            ),
            Event::DisplayMath(math) => push_leaf(
                &mut stack,
                NodeKind::DisplayMath {
                    source: math.to_string(),
                },
                range,
            ),
            Event::Html(_) | Event::InlineHtml(_) => push_leaf(&mut stack, NodeKind::Html, range),
            Event::Rule => push_leaf(&mut stack, NodeKind::Rule, range),
            _ => {}
        }
    }

    // Unbalanced input cannot happen with pulldown-cmark, but fold any leftovers anyway.
    while stack.len() > 1 {
        let Some(node) = stack.pop() else {
            break;
        };
        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
        }
    }
    stack
        .pop()
        .unwrap_or_else(|| MdNode::new(NodeKind::Document, 0..text.len()))
}

/// Alt text of the innermost open image. Emphasis and links inside the alt still count.
fn image_alt(stack: &mut [MdNode]) -> Option<&mut String> {
    stack.iter_mut().rev().find_map(|node| match &mut node.kind {
        NodeKind::Image { alt, .. } => Some(alt),
        _ => None,
    })
}

fn push_leaf(stack: &mut [MdNode], kind: NodeKind, range: Range<usize>) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(MdNode::new(kind, range));
    }
}

fn node_kind(text: &str, tag: &Tag<'_>, range: &Range<usize>) -> NodeKind {
    match tag {
        Tag::Paragraph => NodeKind::Paragraph,
        Tag::Heading { level, .. } => NodeKind::Heading {
            depth: heading_level(*level),
            setext: !text
                .get(range.clone())
                .is_some_and(|s| s.trim_start().starts_with('#')),
        },
        Tag::BlockQuote(_) => NodeKind::BlockQuote,
        Tag::List(start) => NodeKind::List {
            ordered: start.is_some(),
        },
        Tag::Item => NodeKind::ListItem,
        Tag::CodeBlock(kind) => NodeKind::CodeBlock {
            language: match kind {
                CodeBlockKind::Fenced(lang) => normalize_fenced_lang(lang),
                CodeBlockKind::Indented => None,
            },
            content: String::new(),
        },
        Tag::Image {
            dest_url, title, ..
        } => NodeKind::Image {
            url: dest_url.to_string(),
            alt: String::new(),
            title: title.to_string(),
        },
        Tag::Link { dest_url, .. } => NodeKind::Link {
            url: dest_url.to_string(),
        },
        Tag::Emphasis => NodeKind::Emphasis,
        Tag::Strong => NodeKind::Strong,
        Tag::Strikethrough => NodeKind::Strikethrough,
        Tag::Table(_) => NodeKind::Table,
        Tag::FootnoteDefinition(_) => NodeKind::FootnoteDefinition,
        Tag::HtmlBlock => NodeKind::Html,
        _ => NodeKind::Other,
    }
}

fn trim_line_end(text: &str, range: Range<usize>) -> Range<usize> {
    let Some(slice) = text.get(range.clone()) else {
        return range;
    };
    let trimmed = slice.trim_end_matches(['\n', '\r']);
    range.start..range.start + trimmed.len()
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn normalize_fenced_lang(lang: &CowStr<'_>) -> Option<String> {
    let first = lang.split_whitespace().next().unwrap_or("");
    let first = first.split(',').next().unwrap_or("").trim();
    let first = first.strip_prefix("language-").unwrap_or(first);
    let first = first.strip_prefix('{').unwrap_or(first);
    let first = first.strip_suffix('}').unwrap_or(first).trim();
    if first.is_empty() {
        None
    } else {
        Some(first.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(root: &MdNode, ty: NodeType) -> Vec<&MdNode> {
        root.descendants().filter(|n| n.node_type() == ty).collect()
    }

    #[test]
    fn heading_span_excludes_newline() {
        let root = parse("# Title\n\nbody\n");
        let headings = find(&root, NodeType::Heading);
        assert_eq!(headings.len(), 1);
        assert_eq!(headings[0].range, 0..7);
        assert_eq!(
            headings[0].kind,
            NodeKind::Heading {
                depth: 1,
                setext: false
            }
        );
    }

    #[test]
    fn setext_headings_are_flagged() {
        let root = parse("Title\n=====\n");
        let heading = find(&root, NodeType::Heading)[0];
        assert!(matches!(
            heading.kind,
            NodeKind::Heading {
                depth: 1,
                setext: true
            }
        ));
    }

    #[test]
    fn image_collects_alt_text() {
        let root = parse("![alt](http://x)");
        let image = find(&root, NodeType::Image)[0];
        assert_eq!(image.range, 0..16);
        assert_eq!(
            image.kind,
            NodeKind::Image {
                url: "http://x".to_string(),
                alt: "alt".to_string(),
                title: String::new(),
            }
        );
    }

    #[test]
    fn nested_alt_text_is_collected() {
        let root = parse("![a *b* `c`](x.png)");
        let image = find(&root, NodeType::Image)[0];
        let NodeKind::Image { alt, .. } = &image.kind else {
            panic!("expected an image, got {:?}", image.kind);
        };
        assert_eq!(alt, "a b c");
    }

    #[test]
    fn list_items_nest_inside_lists() {
        let root = parse("- a\n  - b\n");
        let lists = find(&root, NodeType::List);
        assert_eq!(lists.len(), 2);
        let items = find(&root, NodeType::ListItem);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].range.start, 0);
        assert_eq!(items[0].children[0].range.start, 2);
    }

    #[test]
    fn fenced_code_keeps_language_and_content() {
        let root = parse("```Mermaid {theme}\ngraph TD\n```\n");
        let code = find(&root, NodeType::CodeBlock)[0];
        assert_eq!(
            code.kind,
            NodeKind::CodeBlock {
                language: Some("mermaid".to_string()),
                content: "graph TD\n".to_string(),
            }
        );
    }

    #[test]
    fn inline_math_is_a_leaf() {
        let root = parse("area $\\pi r^2$ here");
        let math = find(&root, NodeType::InlineMath)[0];
        assert_eq!(
            math.kind,
            NodeKind::InlineMath {
                source: "\\pi r^2".to_string()
            }
        );
        assert_eq!(math.range, 5..14);
    }

    #[test]
    fn inline_code_span_includes_backticks() {
        let root = parse("use `foo` here");
        let code = find(&root, NodeType::InlineCode)[0];
        assert_eq!(code.range, 4..9);
    }

    #[test]
    fn normalizes_fence_info_strings() {
        assert_eq!(normalize_fenced_lang(&"rust,ignore".into()), Some("rust".into()));
        assert_eq!(normalize_fenced_lang(&"language-js".into()), Some("js".into()));
        assert_eq!(normalize_fenced_lang(&"  ".into()), None);
    }
}
