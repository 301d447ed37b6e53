//! HTML to well-formed XHTML conversion for chapter bodies, plus whitespace-only pretty printing.
//!
//! Source pages are parsed leniently by `scraper` (html5ever), then serialized back as XML:
//! void elements are self-closed, text and attribute values are escaped, and script-like elements
//! are dropped.

use super::ScraperError;
use scraper::{ElementRef, Html, Node, Selector};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const DROPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "iframe", "template"];

/// Elements that start on their own line when pretty printing. `pre` is absent on purpose: its
/// whitespace is content.
const BLOCK_ELEMENTS: &[&str] = &[
    "html", "head", "body", "title", "link", "meta", "div", "p", "h1", "h2", "h3", "h4", "h5", "h6",
    "ul", "ol", "li", "nav", "section", "article", "header", "footer", "aside", "blockquote", "hr",
    "table", "thead", "tbody", "tfoot", "tr", "td", "th", "figure", "figcaption", "dl", "dt", "dd",
];

/// Parse a CSS selector or return an extraction error (avoids panics from Selector::parse).
pub(crate) fn parse_selector(sel: &str) -> Result<Selector, ScraperError> {
    Selector::parse(sel).map_err(|e| ScraperError::Extraction {
        page: "page",
        what: "selector",
        reason: format!("invalid selector {:?}: {}", sel, e),
    })
}

/// Trimmed text content of an element.
pub(crate) fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Serialize the children of `el` as XHTML.
pub fn inner_xhtml(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    write_children(el, &mut out);
    out
}

/// Parse an HTML fragment (e.g. a chapter body delivered as a JSON string) and serialize it as
/// XHTML.
pub fn fragment_to_xhtml(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    inner_xhtml(fragment.root_element())
}

fn write_children(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&escape_text(&text.text)),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    write_element(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn write_element(el: ElementRef<'_>, out: &mut String) {
    let element = el.value();
    let name = element.name();
    if DROPPED_ELEMENTS.contains(&name) {
        return;
    }
    out.push('<');
    out.push_str(name);
    // attribute storage order is not guaranteed across scraper versions
    let mut attrs: Vec<(&str, &str)> = element.attrs().collect();
    attrs.sort_by(|a, b| a.0.cmp(b.0));
    for (attr, value) in attrs {
        out.push(' ');
        out.push_str(attr);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
    if VOID_ELEMENTS.contains(&name) {
        out.push_str("/>");
        return;
    }
    out.push('>');
    write_children(el, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

pub(crate) fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub(crate) fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

/// Re-indent markup so block elements sit on their own lines. Only whitespace between tags
/// changes; text inside inline content and `pre` is left as is. A block element's end tag gets its
/// own line only when the element contains other blocks.
pub fn pretty(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len() + markup.len() / 4);
    // one entry per open block element: whether it has block children
    let mut open: Vec<bool> = Vec::new();
    let mut after_block = true;
    let mut rest = markup;

    while let Some(start) = rest.find('<') {
        let text = &rest[..start];
        push_text(&mut out, text, after_block);
        if !text.trim().is_empty() {
            after_block = false;
        }
        let tail = &rest[start..];
        let Some(close) = tail.find('>') else {
            out.push_str(tail);
            rest = "";
            break;
        };
        let tag = &tail[..=close];
        rest = &tail[close + 1..];

        let kind = TagKind::of(tag);
        if !kind.is_block() {
            out.push_str(tag);
            after_block = false;
            continue;
        }
        match kind {
            TagKind::End(_) => {
                let had_blocks = open.pop().unwrap_or(false);
                if had_blocks {
                    new_line(&mut out, open.len());
                }
                out.push_str(tag);
            }
            TagKind::Start(_) => {
                if let Some(parent) = open.last_mut() {
                    *parent = true;
                }
                new_line(&mut out, open.len());
                out.push_str(tag);
                open.push(false);
            }
            TagKind::SelfClosing(_) | TagKind::Declaration => {
                if let Some(parent) = open.last_mut() {
                    *parent = true;
                }
                new_line(&mut out, open.len());
                out.push_str(tag);
            }
        }
        after_block = true;
    }
    push_text(&mut out, rest, after_block);
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out.push('\n');
    out
}

fn new_line(out: &mut String, depth: usize) {
    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    if !out.is_empty() {
        out.push('\n');
    }
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn push_text(out: &mut String, text: &str, after_block: bool) {
    if after_block {
        out.push_str(text.trim_start());
    } else {
        out.push_str(text);
    }
}

enum TagKind<'a> {
    Start(&'a str),
    End(&'a str),
    SelfClosing(&'a str),
    /// `<?xml ...?>`, `<!DOCTYPE ...>`, comments.
    Declaration,
}

impl<'a> TagKind<'a> {
    fn of(tag: &'a str) -> Self {
        let inner = &tag[1..tag.len() - 1];
        if inner.starts_with('?') || inner.starts_with('!') {
            return TagKind::Declaration;
        }
        if let Some(name) = inner.strip_prefix('/') {
            return TagKind::End(tag_name(name));
        }
        if inner.ends_with('/') {
            return TagKind::SelfClosing(tag_name(inner));
        }
        TagKind::Start(tag_name(inner))
    }

    fn is_block(&self) -> bool {
        match self {
            TagKind::Declaration => true,
            TagKind::Start(n) | TagKind::End(n) | TagKind::SelfClosing(n) => {
                BLOCK_ELEMENTS.contains(&n.to_ascii_lowercase().as_str())
            }
        }
    }
}

fn tag_name(s: &str) -> &str {
    let end = s
        .find(|c: char| c.is_whitespace() || c == '/')
        .unwrap_or(s.len());
    &s[..end]
}
