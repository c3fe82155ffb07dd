//! Approximate, deterministic pagination of a chapter tree.
//!
//! Heights come from a per-tag line-height table plus a characters-per-line
//! estimate; there is no text shaping. The paginator is a pure function of
//! `(tree, viewport, config)` and is re-run wholesale when any of them change.

use epub_folio::ParsedNode;
use serde::{Deserialize, Serialize};

use crate::engine::{CancelToken, NeverCancel, RenderEngineError};

/// Tags whose subtree never reaches the page.
const HIDDEN_TAGS: [&str; 7] = ["head", "title", "meta", "link", "style", "script", "template"];

/// Elements placed as one opaque block instead of being walked into.
const ATOMIC_TAGS: [&str; 6] = ["img", "image", "svg", "hr", "video", "audio"];

/// Physical viewport size in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in physical pixels.
    pub width_px: u32,
    /// Height in physical pixels.
    pub height_px: u32,
}

impl Viewport {
    /// Viewport from physical pixel dimensions.
    pub fn new(width_px: u32, height_px: u32) -> Self {
        Self {
            width_px,
            height_px,
        }
    }

    /// Viewport from logical dimensions and a device pixel ratio.
    ///
    /// Values are rounded to the nearest pixel; negative or NaN inputs clamp
    /// to zero.
    pub fn from_logical(width: f32, height: f32, scale: f32) -> Self {
        Self {
            width_px: to_pixels(width * scale),
            height_px: to_pixels(height * scale),
        }
    }
}

fn to_pixels(value: f32) -> u32 {
    // `as` saturates: NaN and negatives become 0.
    value.round() as u32
}

/// Height table and line-wrap estimate used by [`Paginator`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Line height of `h1` text.
    pub h1: u32,
    /// Line height of `h2` text.
    pub h2: u32,
    /// Line height of `h3` text.
    pub h3: u32,
    /// Line height of `h4` text.
    pub h4: u32,
    /// Line height of paragraph text.
    pub paragraph: u32,
    /// Line height of list-item text.
    pub list_item: u32,
    /// Line height of link text outside any other placeable block.
    pub anchor: u32,
    /// Line height of text with no placeable ancestor, and the fallback
    /// height of atomic elements without a numeric `height` style.
    pub text: u32,
    /// Characters that fit on one line.
    pub chars_per_line: u32,
    /// When set, characters per line are derived from the viewport width
    /// divided by this average glyph width.
    pub avg_glyph_width_px: Option<f32>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            h1: 40,
            h2: 34,
            h3: 30,
            h4: 26,
            paragraph: 24,
            list_item: 24,
            anchor: 24,
            text: 24,
            chars_per_line: 40,
            avg_glyph_width_px: None,
        }
    }
}

impl LayoutConfig {
    /// Set the fixed characters-per-line estimate (minimum 1).
    pub fn with_chars_per_line(mut self, chars_per_line: u32) -> Self {
        self.chars_per_line = chars_per_line.max(1);
        self
    }

    /// Derive characters per line from viewport width.
    pub fn with_avg_glyph_width(mut self, glyph_width_px: f32) -> Self {
        self.avg_glyph_width_px = Some(glyph_width_px);
        self
    }

    /// Use the same line height for every paragraph-level tag.
    pub fn with_body_line_height(mut self, line_height: u32) -> Self {
        self.paragraph = line_height;
        self.list_item = line_height;
        self.anchor = line_height;
        self.text = line_height;
        self
    }

    /// Line height for a placeable tag, `None` for containers.
    pub fn line_height_for(&self, tag: &str) -> Option<u32> {
        match tag {
            "h1" => Some(self.h1),
            "h2" => Some(self.h2),
            "h3" => Some(self.h3),
            "h4" => Some(self.h4),
            "p" => Some(self.paragraph),
            "li" => Some(self.list_item),
            "a" => Some(self.anchor),
            _ => None,
        }
    }

    /// Effective characters per line for `viewport`.
    pub fn chars_per_line_for(&self, viewport: Viewport) -> u32 {
        match self.avg_glyph_width_px {
            Some(glyph) if glyph > 0.0 && viewport.width_px > 0 => {
                ((viewport.width_px as f32 / glyph).floor() as u32).max(1)
            }
            _ => self.chars_per_line.max(1),
        }
    }

    /// Estimated height of `text` rendered at `line_height`.
    pub fn text_height(&self, text: &str, line_height: u32, chars_per_line: u32) -> u32 {
        let chars = text.chars().count() as u32;
        if chars == 0 {
            return 0;
        }
        chars
            .div_ceil(chars_per_line.max(1))
            .saturating_mul(line_height)
    }
}

/// What a [`PageNode`] refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageNodeKind {
    /// A text run.
    Text,
    /// An element placed whole (image, rule, empty block).
    Block,
}

/// Reference to one placed node of the chapter tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageNode {
    /// Child-index path from the tree root, usable with
    /// [`ParsedNode::at_path`].
    pub path: Vec<usize>,
    /// Tag that set the line height (the element itself for blocks).
    pub tag: String,
    /// Text run or block.
    pub kind: PageNodeKind,
    /// Estimated height in pixels.
    pub height: u32,
}

/// One viewport-bounded slice of a chapter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Placed nodes in document order.
    pub nodes: Vec<PageNode>,
    /// Sum of node heights.
    pub height_used: u32,
}

impl Page {
    /// Number of placed nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True for a page holding no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Resolve the placed nodes against the tree they were paginated from.
    pub fn resolve<'a>(&'a self, tree: &'a ParsedNode) -> impl Iterator<Item = &'a ParsedNode> {
        self.nodes.iter().filter_map(move |node| tree.at_path(&node.path))
    }
}

/// Splits chapter trees into pages.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Paginator {
    config: LayoutConfig,
}

impl Paginator {
    /// Paginator with an injected height table.
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    /// Height table in use.
    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Paginate `tree` for `viewport`.
    pub fn paginate(&self, tree: &ParsedNode, viewport: Viewport) -> Vec<Page> {
        match self.paginate_with_cancel(tree, viewport, &NeverCancel) {
            Ok(pages) => pages,
            Err(_) => Vec::new(),
        }
    }

    /// Paginate, polling `cancel` before each placed node.
    pub fn paginate_with_cancel(
        &self,
        tree: &ParsedNode,
        viewport: Viewport,
        cancel: &dyn CancelToken,
    ) -> Result<Vec<Page>, RenderEngineError> {
        let mut state = PageBuilder {
            config: &self.config,
            max_height: viewport.height_px,
            chars_per_line: self.config.chars_per_line_for(viewport),
            cancel,
            pages: Vec::new(),
            current: Page::default(),
            path: Vec::with_capacity(16),
        };
        state.walk(tree, None)?;
        state.flush();
        log::debug!(
            "paginated {} nodes into {} pages at {}x{}",
            tree.node_count(),
            state.pages.len(),
            viewport.width_px,
            viewport.height_px
        );
        Ok(state.pages)
    }
}

struct PageBuilder<'a> {
    config: &'a LayoutConfig,
    max_height: u32,
    chars_per_line: u32,
    cancel: &'a dyn CancelToken,
    pages: Vec<Page>,
    current: Page,
    path: Vec<usize>,
}

impl PageBuilder<'_> {
    fn walk(
        &mut self,
        node: &ParsedNode,
        line_tag: Option<(&str, u32)>,
    ) -> Result<(), RenderEngineError> {
        match node {
            ParsedNode::Text { content } => {
                let (tag, line_height) = line_tag.unwrap_or(("", self.config.text));
                let height = self
                    .config
                    .text_height(content, line_height, self.chars_per_line);
                self.place(tag, PageNodeKind::Text, height)
            }
            ParsedNode::Element {
                tag,
                style,
                children,
                ..
            } => {
                if HIDDEN_TAGS.contains(&tag.as_str()) {
                    return Ok(());
                }
                if ATOMIC_TAGS.contains(&tag.as_str()) {
                    let height = style
                        .get("height")
                        .and_then(|value| value.as_number())
                        .filter(|h| h.is_finite() && *h >= 0.0)
                        .map_or(self.config.text, |h| h.round() as u32);
                    return self.place(tag, PageNodeKind::Block, height);
                }
                let own = self
                    .config
                    .line_height_for(tag)
                    .map(|height| (tag.as_str(), height));
                if let Some((_, height)) = own {
                    if !has_text(node) {
                        return self.place(tag, PageNodeKind::Block, height);
                    }
                }
                let inherited = own.or(line_tag);
                for (index, child) in children.iter().enumerate() {
                    self.path.push(index);
                    let result = self.walk(child, inherited);
                    self.path.pop();
                    result?;
                }
                Ok(())
            }
        }
    }

    fn place(
        &mut self,
        tag: &str,
        kind: PageNodeKind,
        height: u32,
    ) -> Result<(), RenderEngineError> {
        if self.cancel.is_cancelled() {
            return Err(RenderEngineError::Cancelled);
        }
        if !self.current.is_empty()
            && self.current.height_used.saturating_add(height) > self.max_height
        {
            let full = core::mem::take(&mut self.current);
            self.pages.push(full);
        }
        self.current.nodes.push(PageNode {
            path: self.path.clone(),
            tag: tag.to_string(),
            kind,
            height,
        });
        self.current.height_used = self.current.height_used.saturating_add(height);
        Ok(())
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            let last = core::mem::take(&mut self.current);
            self.pages.push(last);
        }
    }
}

fn has_text(node: &ParsedNode) -> bool {
    match node {
        ParsedNode::Text { content } => !content.is_empty(),
        ParsedNode::Element { children, .. } => children.iter().any(has_text),
    }
}
