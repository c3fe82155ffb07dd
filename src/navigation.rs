//! Navigation documents: EPUB 3 nav XHTML and EPUB 2 NCX.
//!
//! Both formats reduce to the same [`Navigation`] tree. Element names are
//! matched without their namespace prefix, so `<nav epub:type="toc">` and
//! `<ncx:navPoint>` are recognized however the book declares namespaces.
//!
//! ```rust
//! use epub_folio::navigation::parse_nav_xhtml;
//!
//! let nav = parse_nav_xhtml(
//!     r#"<nav epub:type="toc"><ol><li><a href="c1.xhtml">One</a></li></ol></nav>"#,
//! )?;
//! assert_eq!(nav.toc[0].label, "One");
//! # Ok::<(), epub_folio::navigation::NavigationError>(())
//! ```

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::Diagnostic;
use crate::xml::{collapse_whitespace, find_attr, lenient_reader, resolve_entity};

/// Bounds on navigation structure growth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NavigationLimits {
    /// Total entries across all lists.
    pub max_points: usize,
    /// Deepest nesting.
    pub max_depth: usize,
    /// Longest label in bytes.
    pub max_label_bytes: usize,
}

impl Default for NavigationLimits {
    fn default() -> Self {
        Self {
            max_points: 4096,
            max_depth: 64,
            max_label_bytes: 4096,
        }
    }
}

/// A navigation entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NavPoint {
    /// Display label, whitespace collapsed.
    pub label: String,
    /// Target as written in the document (relative, may carry a fragment).
    pub href: String,
    /// Nested entries.
    pub children: Vec<NavPoint>,
}

/// Navigation lists of a book.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Navigation {
    /// Table of contents.
    pub toc: Vec<NavPoint>,
    /// Print page mapping.
    pub page_list: Vec<NavPoint>,
    /// Structural landmarks (cover, bodymatter, ...).
    pub landmarks: Vec<NavPoint>,
}

impl Navigation {
    /// True when the table of contents has entries.
    pub fn has_toc(&self) -> bool {
        !self.toc.is_empty()
    }

    /// TOC entries including nested ones.
    pub fn toc_count(&self) -> usize {
        fn count(points: &[NavPoint]) -> usize {
            points.iter().map(|p| 1 + count(&p.children)).sum()
        }
        count(&self.toc)
    }

    /// TOC in reading order as `(depth, entry)` pairs.
    pub fn toc_flat(&self) -> Vec<(usize, &NavPoint)> {
        fn walk<'a>(points: &'a [NavPoint], depth: usize, out: &mut Vec<(usize, &'a NavPoint)>) {
            for point in points {
                out.push((depth, point));
                walk(&point.children, depth + 1, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.toc, 0, &mut out);
        out
    }
}

/// Why a navigation document was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NavigationError {
    /// The XML could not be read.
    Xml {
        /// Byte offset of the failure.
        offset: usize,
        /// Parser message.
        message: String,
    },
    /// A [`NavigationLimits`] bound was exceeded.
    LimitExceeded {
        /// Name of the limit field.
        limit: &'static str,
        /// Observed value.
        actual: usize,
        /// Configured maximum.
        max: usize,
    },
}

impl fmt::Display for NavigationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xml { offset, message } => {
                write!(f, "navigation XML error at {}: {}", offset, message)
            }
            Self::LimitExceeded { limit, actual, max } => {
                write!(f, "navigation exceeds {} ({} > {})", limit, actual, max)
            }
        }
    }
}

impl std::error::Error for NavigationError {}

impl From<NavigationError> for Diagnostic {
    fn from(err: NavigationError) -> Self {
        let offset = match &err {
            NavigationError::Xml { offset, .. } => Some(*offset),
            NavigationError::LimitExceeded { .. } => None,
        };
        Diagnostic::malformed_markup(String::new(), offset, alloc::format!("{}", err))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NavKind {
    Toc,
    PageList,
    Landmarks,
}

impl NavKind {
    /// `epub:type` may list several tokens.
    fn from_type_attr(value: &str) -> Option<Self> {
        value.split_whitespace().find_map(|token| match token {
            "toc" => Some(Self::Toc),
            "page-list" => Some(Self::PageList),
            "landmarks" => Some(Self::Landmarks),
            _ => None,
        })
    }
}

/// Entry under construction.
#[derive(Default)]
struct Pending {
    label: String,
    href: Option<String>,
    children: Vec<NavPoint>,
}

impl Pending {
    fn finish(self) -> Option<NavPoint> {
        let label = collapse_whitespace(&self.label);
        match self.href {
            Some(href) if !label.is_empty() => Some(NavPoint {
                label,
                href,
                children: self.children,
            }),
            _ => None,
        }
    }
}

/// Tree builder shared by both formats.
struct Builder {
    limits: NavigationLimits,
    stack: Vec<Pending>,
    points: usize,
}

impl Builder {
    fn new(limits: NavigationLimits) -> Self {
        Self {
            limits,
            stack: Vec::new(),
            points: 0,
        }
    }

    fn open(&mut self) -> Result<(), NavigationError> {
        check("max_depth", self.stack.len() + 1, self.limits.max_depth)?;
        self.stack.push(Pending::default());
        Ok(())
    }

    fn set_href(&mut self, href: String) {
        if let Some(top) = self.stack.last_mut() {
            top.href = Some(href);
        }
    }

    fn push_label(&mut self, text: &str) -> Result<(), NavigationError> {
        if let Some(top) = self.stack.last_mut() {
            top.label.push_str(text);
            check("max_label_bytes", top.label.len(), self.limits.max_label_bytes)?;
        }
        Ok(())
    }

    /// Close the innermost entry, attaching it to its parent or `out`.
    fn close(&mut self, out: &mut Vec<NavPoint>) -> Result<(), NavigationError> {
        let Some(point) = self.stack.pop().and_then(Pending::finish) else {
            return Ok(());
        };
        self.points += 1;
        check("max_points", self.points, self.limits.max_points)?;
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(point),
            None => out.push(point),
        }
        Ok(())
    }
}

fn check(limit: &'static str, actual: usize, max: usize) -> Result<(), NavigationError> {
    if actual > max {
        return Err(NavigationError::LimitExceeded { limit, actual, max });
    }
    Ok(())
}

fn xml_error(reader: &Reader<&[u8]>, err: quick_xml::Error) -> NavigationError {
    NavigationError::Xml {
        offset: reader.buffer_position() as usize,
        message: alloc::format!("{}", err),
    }
}

fn text_of(reader: &Reader<&[u8]>, bytes: &[u8]) -> String {
    reader
        .decoder()
        .decode(bytes)
        .map(|text| text.into_owned())
        .unwrap_or_default()
}

/// Parse an EPUB 3 navigation document.
pub fn parse_nav_xhtml(content: &str) -> Result<Navigation, NavigationError> {
    parse_nav_xhtml_with_limits(content, NavigationLimits::default())
}

/// [`parse_nav_xhtml`] with explicit limits.
pub fn parse_nav_xhtml_with_limits(
    content: &str,
    limits: NavigationLimits,
) -> Result<Navigation, NavigationError> {
    let mut reader = lenient_reader(content);
    let mut buf = Vec::with_capacity(128);
    let mut nav = Navigation::default();
    let mut builder = Builder::new(limits);
    let mut section: Option<NavKind> = None;
    let mut collected: Vec<NavPoint> = Vec::new();
    let mut anchor_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"nav" => {
                    section = find_attr(&reader, &e, b"type")
                        .as_deref()
                        .and_then(NavKind::from_type_attr);
                    collected.clear();
                }
                b"li" if section.is_some() => builder.open()?,
                b"a" | b"span" if section.is_some() && !builder.stack.is_empty() => {
                    if e.local_name().as_ref() == b"a" {
                        anchor_start(&reader, &e, &mut builder);
                    }
                    anchor_depth += 1;
                }
                _ if anchor_depth > 0 => anchor_depth += 1,
                _ => {}
            },
            Ok(Event::Empty(e)) if section.is_some() && e.local_name().as_ref() == b"a" => {
                anchor_start(&reader, &e, &mut builder);
            }
            Ok(Event::Text(e)) if anchor_depth > 0 => {
                builder.push_label(&text_of(&reader, &e))?;
            }
            Ok(Event::GeneralRef(e)) if anchor_depth > 0 => {
                builder.push_label(&resolve_entity(&e))?;
            }
            Ok(Event::End(e)) => {
                if anchor_depth > 0 {
                    anchor_depth -= 1;
                    buf.clear();
                    continue;
                }
                match e.local_name().as_ref() {
                    b"li" if section.is_some() => builder.close(&mut collected)?,
                    b"nav" => {
                        let done = core::mem::take(&mut collected);
                        match section.take() {
                            Some(NavKind::Toc) => nav.toc = done,
                            Some(NavKind::PageList) => nav.page_list = done,
                            Some(NavKind::Landmarks) => nav.landmarks = done,
                            None => {}
                        }
                        builder.stack.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(xml_error(&reader, err)),
            _ => {}
        }
        buf.clear();
    }
    Ok(nav)
}

/// An `<a>` inside an entry supplies its href (the first one wins). A
/// `<span>` heading without a link keeps the entry label-only.
fn anchor_start(reader: &Reader<&[u8]>, e: &BytesStart<'_>, builder: &mut Builder) {
    let has_href = builder
        .stack
        .last()
        .is_some_and(|top| top.href.is_some());
    if has_href {
        return;
    }
    if let Some(href) = find_attr(reader, e, b"href") {
        builder.set_href(href);
    }
}

/// Parse an EPUB 2 NCX document.
pub fn parse_ncx(content: &str) -> Result<Navigation, NavigationError> {
    parse_ncx_with_limits(content, NavigationLimits::default())
}

/// [`parse_ncx`] with explicit limits.
pub fn parse_ncx_with_limits(
    content: &str,
    limits: NavigationLimits,
) -> Result<Navigation, NavigationError> {
    let mut reader = lenient_reader(content);
    let mut buf = Vec::with_capacity(128);
    let mut nav = Navigation::default();
    let mut toc = Builder::new(limits);
    let mut pages = Builder::new(limits);
    let mut in_page_list = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            // an entry with no label or target
            Ok(Event::Empty(e))
                if matches!(e.local_name().as_ref(), b"navPoint" | b"pageTarget") => {}
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let active = if in_page_list { &mut pages } else { &mut toc };
                match e.local_name().as_ref() {
                    b"pageList" => in_page_list = true,
                    b"navPoint" | b"pageTarget" => active.open()?,
                    b"text" => in_text = true,
                    b"content" => {
                        if let Some(src) = find_attr(&reader, &e, b"src") {
                            active.set_href(src);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) if in_text => {
                let text = text_of(&reader, &e);
                (if in_page_list { &mut pages } else { &mut toc }).push_label(&text)?;
            }
            Ok(Event::GeneralRef(e)) if in_text => {
                let text = resolve_entity(&e);
                (if in_page_list { &mut pages } else { &mut toc }).push_label(&text)?;
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"text" => in_text = false,
                b"navPoint" => toc.close(&mut nav.toc)?,
                b"pageTarget" => pages.close(&mut nav.page_list)?,
                b"pageList" => in_page_list = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => return Err(xml_error(&reader, err)),
            _ => {}
        }
        buf.clear();
    }
    Ok(nav)
}
