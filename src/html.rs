//! Chapter markup to a structural tree.
//!
//! A forgiving recursive-descent parser for the HTML/XHTML found in real
//! books. It is not an HTML5 tree builder: there is no implied-end-tag
//! logic, only same-name nesting is tracked when locating a close tag, and
//! anything it cannot make sense of is skipped with a diagnostic.
//!
//! Byte offsets reported in diagnostics refer to the preprocessed markup
//! (prolog, comments, scripts and styles already removed).

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use smallvec::SmallVec;

use crate::css::{StyleContext, StyleMap};
use crate::error::{Diagnostic, Diagnostics};

/// Elements that never have content.
pub const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose open tag implicitly closes an unclosed predecessor of the
/// same name.
const IMPLIED_END_ELEMENTS: [&str; 4] = ["p", "dt", "dd", "option"];

/// Tag name given to the synthetic wrapper around several top-level nodes.
pub const ROOT_TAG: &str = "root";

/// Attribute list in document order. Most elements carry at most a few.
pub type Attributes = SmallVec<[(String, String); 4]>;

/// Style resolved for one element.
pub type ResolvedStyle = StyleMap;

/// A node of the parsed chapter tree.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedNode {
    /// Entity-decoded, trimmed, non-empty text.
    Text {
        /// Text content.
        content: String,
    },
    /// An element and its children.
    Element {
        /// Lower-cased tag name (namespace prefix kept).
        tag: String,
        /// Attributes in document order, keys lower-cased.
        attributes: Attributes,
        /// Resolved style (tag default, stylesheet and inline layers).
        style: ResolvedStyle,
        /// Child nodes in document order.
        children: Vec<ParsedNode>,
    },
}

impl ParsedNode {
    /// Text node.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Unstyled element.
    pub fn element(tag: impl Into<String>, children: Vec<ParsedNode>) -> Self {
        Self::Element {
            tag: tag.into(),
            attributes: Attributes::new(),
            style: StyleMap::new(),
            children,
        }
    }

    /// True for text nodes.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text { .. })
    }

    /// Tag name for elements.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Element { tag, .. } => Some(tag),
            Self::Text { .. } => None,
        }
    }

    /// Children of an element (empty for text).
    pub fn children(&self) -> &[ParsedNode] {
        match self {
            Self::Element { children, .. } => children,
            Self::Text { .. } => &[],
        }
    }

    /// Resolved style of an element.
    pub fn style(&self) -> Option<&StyleMap> {
        match self {
            Self::Element { style, .. } => Some(style),
            Self::Text { .. } => None,
        }
    }

    /// Attribute value by (lower-case) name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            Self::Element { attributes, .. } => attributes
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            Self::Text { .. } => None,
        }
    }

    /// All descendant text joined by single spaces.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Self::Text { content } => {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(content);
            }
            Self::Element { children, .. } => {
                for child in children {
                    child.collect_text(out);
                }
            }
        }
    }

    /// First element named `tag` in document (pre-)order, self included.
    pub fn find_first(&self, tag: &str) -> Option<&ParsedNode> {
        match self {
            Self::Element {
                tag: own, children, ..
            } => {
                if own == tag {
                    return Some(self);
                }
                children.iter().find_map(|child| child.find_first(tag))
            }
            Self::Text { .. } => None,
        }
    }

    /// Node reached by following child indices from this node.
    pub fn at_path(&self, path: &[usize]) -> Option<&ParsedNode> {
        path.iter()
            .try_fold(self, |node, &idx| node.children().get(idx))
    }

    /// Number of nodes in this subtree, self included.
    pub fn node_count(&self) -> usize {
        1 + self
            .children()
            .iter()
            .map(ParsedNode::node_count)
            .sum::<usize>()
    }
}

/// Result of [`parse_html`].
#[derive(Clone, Debug, PartialEq)]
pub struct ParseOutput {
    /// Tree root: the single top-level node or a synthetic `root` wrapper.
    pub root: ParsedNode,
    /// Problems found while parsing.
    pub diagnostics: Diagnostics,
    /// Bodies of `<style>` blocks, in document order.
    pub style_blocks: Vec<String>,
}

/// Bounds applied while building the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HtmlLimits {
    /// Deepest element nesting kept as structure. Deeper content is
    /// flattened into a single text node.
    pub max_depth: usize,
}

impl Default for HtmlLimits {
    fn default() -> Self {
        Self { max_depth: 256 }
    }
}

/// Parse chapter markup, resolving element styles from `ctx`.
pub fn parse_html(markup: &str, ctx: &StyleContext) -> ParseOutput {
    parse_html_with_limits(markup, ctx, HtmlLimits::default())
}

/// Parse with built-in tag defaults and no stylesheet.
pub fn parse_html_plain(markup: &str) -> ParseOutput {
    parse_html(markup, &StyleContext::default())
}

/// [`parse_html`] with explicit limits.
pub fn parse_html_with_limits(markup: &str, ctx: &StyleContext, limits: HtmlLimits) -> ParseOutput {
    parse_preprocessed(preprocess(markup), ctx, limits)
}

/// Build the tree from markup already passed through [`preprocess`], so a
/// caller can route `style_blocks` into `ctx` first.
pub(crate) fn parse_preprocessed(
    pre: Preprocessed,
    ctx: &StyleContext,
    limits: HtmlLimits,
) -> ParseOutput {
    let mut parser = Parser {
        src: &pre.markup,
        ctx,
        limits,
        diagnostics: Diagnostics::new(),
    };
    let mut nodes = parser.parse_nodes(0, pre.markup.len(), 0);
    let root = if nodes.len() == 1 {
        nodes.remove(0)
    } else {
        ParsedNode::element(ROOT_TAG, nodes)
    };
    ParseOutput {
        root,
        diagnostics: parser.diagnostics,
        style_blocks: pre.style_blocks,
    }
}

pub(crate) struct Preprocessed {
    pub(crate) markup: String,
    pub(crate) style_blocks: Vec<String>,
}

/// Remove everything that is not element structure or text: prolog and
/// processing instructions, doctype, comments, scripts and styles. CDATA
/// contents are kept as escaped text.
pub(crate) fn preprocess(markup: &str) -> Preprocessed {
    let mut out = String::with_capacity(markup.len());
    let mut style_blocks = Vec::new();
    let mut last = 0usize;
    let mut i = 0usize;

    while let Some(rel) = markup[i..].find('<') {
        let start = i + rel;
        let rest = &markup[start..];
        let skip_to = if rest.starts_with("<!--") {
            Some(find_from(markup, "-->", start + 4).map_or(markup.len(), |end| end + 3))
        } else if rest.starts_with("<![CDATA[") {
            out.push_str(&markup[last..start]);
            let inner_start = start + 9;
            let inner_end = find_from(markup, "]]>", inner_start).unwrap_or(markup.len());
            escape_into(&markup[inner_start..inner_end], &mut out);
            last = (inner_end + 3).min(markup.len());
            i = last;
            continue;
        } else if rest.starts_with("<?") || rest.starts_with("<!") {
            Some(find_from(markup, ">", start).map_or(markup.len(), |end| end + 1))
        } else if let Some(name) = raw_text_element(rest) {
            let open_end = find_from(markup, ">", start).map_or(markup.len(), |end| end + 1);
            let self_closed = markup[start..open_end].trim_end_matches('>').ends_with('/');
            if self_closed {
                Some(open_end)
            } else {
                let (body_end, after) = find_close_ci(markup, name, open_end)
                    .unwrap_or((markup.len(), markup.len()));
                if name == "style" {
                    style_blocks.push(markup[open_end..body_end].to_string());
                }
                Some(after)
            }
        } else {
            None
        };

        match skip_to {
            Some(next) => {
                out.push_str(&markup[last..start]);
                last = next;
                i = next;
            }
            None => i = start + 1,
        }
        if i >= markup.len() {
            break;
        }
    }
    if last < markup.len() {
        out.push_str(&markup[last..]);
    }
    Preprocessed {
        markup: out,
        style_blocks,
    }
}

fn raw_text_element(rest: &str) -> Option<&'static str> {
    ["script", "style"]
        .into_iter()
        .find(|name| tag_name_matches(rest.as_bytes(), 1, name))
}

/// `bytes[at..]` starts with `name` (ASCII case-insensitive) followed by a
/// tag-name boundary.
fn tag_name_matches(bytes: &[u8], at: usize, name: &str) -> bool {
    let end = at + name.len();
    bytes.len() >= end
        && bytes[at..end].eq_ignore_ascii_case(name.as_bytes())
        && bytes
            .get(end)
            .map_or(true, |&b| b.is_ascii_whitespace() || b == b'>' || b == b'/')
}

fn find_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    haystack
        .get(from..)
        .and_then(|rest| rest.find(needle))
        .map(|rel| from + rel)
}

/// Locate `</name ...>` at or after `from`: (start of close tag, end of it).
fn find_close_ci(markup: &str, name: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = markup.as_bytes();
    let mut pos = from;
    while let Some(lt) = find_from(markup, "</", pos) {
        if tag_name_matches(bytes, lt + 2, name) {
            let end = find_from(markup, ">", lt).map_or(markup.len(), |gt| gt + 1);
            return Some((lt, end));
        }
        pos = lt + 2;
    }
    None
}

fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            other => out.push(other),
        }
    }
}

/// Decode the five XML entities, `&nbsp;` and numeric references. Unknown
/// or malformed references are kept verbatim.
pub(crate) fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .get(1..)
            .and_then(|t| t.find(';').filter(|&semi| semi > 0 && semi <= 10))
            .and_then(|semi| decode_entity(&tail[1..=semi]).map(|ch| (ch, semi + 2)));
        match decoded {
            Some((ch, len)) => {
                out.push(ch);
                rest = &tail[len..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    ctx: &'a StyleContext,
    limits: HtmlLimits,
    diagnostics: Diagnostics,
}

impl<'a> Parser<'a> {
    fn parse_nodes(&mut self, start: usize, end: usize, depth: usize) -> Vec<ParsedNode> {
        let mut nodes = Vec::new();
        let mut pos = start;
        while pos < end {
            match self.src[pos..end].find('<') {
                None => {
                    push_text(&mut nodes, &self.src[pos..end]);
                    break;
                }
                Some(rel) => {
                    let lt = pos + rel;
                    push_text(&mut nodes, &self.src[pos..lt]);
                    pos = self.parse_tag(lt, end, depth, &mut nodes);
                }
            }
        }
        nodes
    }

    /// Parse the tag starting at `lt`; returns the position to resume at.
    fn parse_tag(
        &mut self,
        lt: usize,
        end: usize,
        depth: usize,
        nodes: &mut Vec<ParsedNode>,
    ) -> usize {
        let bytes = self.src.as_bytes();
        let Some(gt) = find_tag_end(bytes, lt + 1, end) else {
            self.malformed(lt, "tag is missing its closing '>'");
            return end;
        };
        if bytes.get(lt + 1) == Some(&b'/') {
            // stray close tag: its open was already consumed or never existed
            return gt + 1;
        }

        let inner = &self.src[lt + 1..gt];
        let name_len = inner
            .bytes()
            .take_while(|&b| b.is_ascii_alphanumeric() || matches!(b, b':' | b'_' | b'-'))
            .count();
        if name_len == 0 {
            self.malformed(lt, "tag has no name");
            return gt + 1;
        }
        let tag = inner[..name_len].to_ascii_lowercase();
        let self_closing = inner.trim_end().ends_with('/');
        let attr_text = inner[name_len..].trim_end().trim_end_matches('/');
        let attributes = parse_attributes(attr_text);

        let (style, style_diags) = self.ctx.resolve(
            &tag,
            attr_lookup(&attributes, "class"),
            attr_lookup(&attributes, "style"),
        );
        self.diagnostics.extend(style_diags);

        if self_closing || VOID_ELEMENTS.contains(&tag.as_str()) {
            nodes.push(ParsedNode::Element {
                tag,
                attributes,
                style,
                children: Vec::new(),
            });
            return gt + 1;
        }

        let content_start = gt + 1;
        let (content_end, resume) = match find_matching_close(self.src, &tag, content_start, end) {
            Some(found) => found,
            None => {
                self.malformed(lt, &alloc::format!("<{}> is never closed", tag));
                (end, end)
            }
        };

        let children = if depth + 1 >= self.limits.max_depth {
            self.malformed(
                lt,
                &alloc::format!("nesting deeper than {} flattened", self.limits.max_depth),
            );
            let text = crate::text::plain_text(&self.src[content_start..content_end]);
            if text.is_empty() {
                Vec::new()
            } else {
                alloc::vec![ParsedNode::text(text)]
            }
        } else {
            self.parse_nodes(content_start, content_end, depth + 1)
        };

        nodes.push(ParsedNode::Element {
            tag,
            attributes,
            style,
            children,
        });
        resume
    }

    fn malformed(&mut self, offset: usize, message: &str) {
        self.diagnostics
            .push(Diagnostic::malformed_markup(String::new(), Some(offset), message));
    }
}

fn push_text(nodes: &mut Vec<ParsedNode>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        nodes.push(ParsedNode::text(decode_entities(trimmed)));
    }
}

fn attr_lookup<'a>(attributes: &'a Attributes, name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Index of the `>` ending the tag that starts before `from`, skipping `>`
/// inside quoted attribute values. Falls back to the first `>` when quotes
/// are unbalanced.
fn find_tag_end(bytes: &[u8], from: usize, end: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (idx, &b) in bytes.get(from..end)?.iter().enumerate() {
        match (quote, b) {
            (Some(q), b) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'>') => return Some(from + idx),
            _ => {}
        }
    }
    bytes
        .get(from..end)?
        .iter()
        .position(|&b| b == b'>')
        .map(|idx| from + idx)
}

/// Find the close tag matching an open `tag` whose content starts at
/// `from`, counting nested same-name opens. Returns (content end, resume).
///
/// Elements that cannot contain themselves end at the next same-name open,
/// so `<p>a<p>b` yields siblings.
fn find_matching_close(src: &str, tag: &str, from: usize, end: usize) -> Option<(usize, usize)> {
    let bytes = src.as_bytes();
    let implied_end = IMPLIED_END_ELEMENTS.contains(&tag);
    let mut depth = 1usize;
    let mut pos = from;
    while pos < end {
        let lt = pos + src[pos..end].find('<')?;
        if bytes.get(lt + 1) == Some(&b'/') {
            if tag_name_matches(bytes, lt + 2, tag) {
                depth -= 1;
                if depth == 0 {
                    let resume = find_tag_end(bytes, lt + 2, end).map_or(end, |gt| gt + 1);
                    return Some((lt, resume));
                }
            }
        } else if tag_name_matches(bytes, lt + 1, tag) {
            if implied_end {
                return Some((lt, lt));
            }
            let self_closed = find_tag_end(bytes, lt + 1, end)
                .is_some_and(|gt| src[lt + 1..gt].trim_end().ends_with('/'));
            if !self_closed {
                depth += 1;
            }
        }
        pos = lt + 1;
    }
    None
}

/// Parse `key="v" key='v' key=v key` pairs. Keys are lower-cased, values
/// entity-decoded.
fn parse_attributes(text: &str) -> Attributes {
    let mut attrs = Attributes::new();
    let bytes = text.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let key_start = i;
        while i < bytes.len() && !bytes[i].is_ascii_whitespace() && !matches!(bytes[i], b'=' | b'/')
        {
            i += 1;
        }
        if i == key_start {
            i += 1;
            continue;
        }
        let key = text[key_start..i].to_ascii_lowercase();
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            attrs.push((key, String::new()));
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let value = match bytes.get(i) {
            Some(&q @ (b'"' | b'\'')) => {
                let value_start = i + 1;
                let value_end = bytes[value_start..]
                    .iter()
                    .position(|&b| b == q)
                    .map_or(bytes.len(), |rel| value_start + rel);
                i = (value_end + 1).min(bytes.len());
                &text[value_start..value_end]
            }
            _ => {
                let value_start = i;
                while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                &text[value_start..i]
            }
        };
        attrs.push((key, decode_entities(value)));
    }
    attrs
}
