//! Package descriptor (OPF) parsing: metadata, manifest and spine.
//!
//! A single pull-parse pass over the descriptor text. Namespace prefixes are
//! ignored, so `<dc:title>` and `<title>` inside `<metadata>` are the same
//! field. XML errors stop the scan; whatever was collected so far is kept and
//! a [`Diagnostic::MalformedMarkup`] is recorded.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{Diagnostic, Diagnostics};
use crate::metadata::{BookMetadata, MetadataField};
use crate::spine::{Spine, SpineItem};
use crate::xml::{attr_value, collapse_whitespace, find_attr, lenient_reader, resolve_entity};

/// A resource declared in the manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestItem {
    /// Unique id within the book.
    pub id: String,
    /// Path relative to the descriptor.
    pub href: String,
    /// Declared media type.
    pub media_type: String,
    /// Space-separated properties (`nav`, `cover-image`, ...).
    pub properties: Option<String>,
}

impl ManifestItem {
    /// HTML/XHTML documents are the only spine-eligible resources.
    pub fn is_html(&self) -> bool {
        self.media_type.to_ascii_lowercase().contains("html")
    }

    /// CSS stylesheet resource.
    pub fn is_stylesheet(&self) -> bool {
        self.media_type.eq_ignore_ascii_case("text/css")
    }

    /// EPUB 2 NCX navigation resource.
    pub fn is_ncx(&self) -> bool {
        self.media_type
            .eq_ignore_ascii_case("application/x-dtbncx+xml")
    }

    /// True when `properties` lists `property`.
    pub fn has_property(&self, property: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|props| props.split_whitespace().any(|p| p == property))
    }
}

/// Manifest items in document order with id lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    items: Vec<ManifestItem>,
    by_id: HashMap<String, usize>,
}

impl Manifest {
    /// Create an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item. A repeated id keeps the first declaration.
    pub fn insert(&mut self, item: ManifestItem) -> bool {
        if self.by_id.contains_key(&item.id) {
            return false;
        }
        self.by_id.insert(item.id.clone(), self.items.len());
        self.items.push(item);
        true
    }

    /// Look up an item by id.
    pub fn get(&self, id: &str) -> Option<&ManifestItem> {
        self.by_id.get(id).and_then(|&idx| self.items.get(idx))
    }

    /// Items in declaration order.
    pub fn items(&self) -> &[ManifestItem] {
        &self.items
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no items were declared.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Stylesheet items in declaration order.
    pub fn stylesheets(&self) -> impl Iterator<Item = &ManifestItem> {
        self.items.iter().filter(|item| item.is_stylesheet())
    }

    /// EPUB 3 navigation document (`properties="nav"`).
    pub fn nav_item(&self) -> Option<&ManifestItem> {
        self.items.iter().find(|item| item.has_property("nav"))
    }
}

/// Parsed package descriptor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageDocument {
    /// Book metadata.
    pub metadata: BookMetadata,
    /// Declared resources.
    pub manifest: Manifest,
    /// Reading order exactly as declared (unresolved idrefs included).
    pub spine: Spine,
    /// Problems encountered while parsing.
    pub diagnostics: Diagnostics,
}

impl PackageDocument {
    /// Spine entries whose idref names an HTML manifest item, in order.
    ///
    /// Entries with unknown ids or non-HTML targets are dropped silently.
    pub fn resolved_spine(&self) -> Vec<(&SpineItem, &ManifestItem)> {
        self.spine
            .items()
            .iter()
            .filter_map(|entry| match self.manifest.get(&entry.idref) {
                Some(item) if item.is_html() => Some((entry, item)),
                Some(item) => {
                    log::debug!(
                        "spine idref {} targets non-HTML media type {}; dropped",
                        entry.idref,
                        item.media_type
                    );
                    None
                }
                None => {
                    log::debug!("spine idref {} not in manifest; dropped", entry.idref);
                    None
                }
            })
            .collect()
    }

    /// NCX manifest item named by `<spine toc="...">`, or the first NCX item.
    pub fn ncx_item(&self) -> Option<&ManifestItem> {
        self.spine
            .toc_id()
            .and_then(|id| self.manifest.get(id))
            .or_else(|| self.manifest.items().iter().find(|item| item.is_ncx()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Section {
    Other,
    Metadata,
    Manifest,
    Spine,
}

struct OpenField {
    field: MetadataField,
    scheme: Option<String>,
    depth: usize,
    text: String,
}

/// Parse package descriptor text. Pure: no I/O.
pub fn parse_package(opf: &str) -> PackageDocument {
    let mut doc = PackageDocument::default();
    let mut reader = lenient_reader(opf);
    let mut buf = Vec::with_capacity(256);
    let mut section = Section::Other;
    let mut depth = 0usize;
    let mut open: Option<OpenField> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                handle_start(&reader, &e, section, depth, &mut doc, &mut open);
                section = enter_section(section, e.local_name().as_ref());
            }
            Ok(Event::Empty(e)) => {
                handle_start(&reader, &e, section, depth + 1, &mut doc, &mut open);
                // `<dc:title/>` carries no text
                if open.as_ref().is_some_and(|field| field.depth == depth + 1) {
                    if let Some(field) = open.take() {
                        doc.metadata.record(field.field, String::new(), field.scheme);
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(field) = open.as_mut() {
                    let text = reader.decoder().decode(&e).unwrap_or_default();
                    field.text.push_str(text.as_ref());
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(field) = open.as_mut() {
                    let text = reader.decoder().decode(&e).unwrap_or_default();
                    field.text.push_str(text.as_ref());
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some(field) = open.as_mut() {
                    field.text.push_str(&resolve_entity(&e));
                }
            }
            Ok(Event::End(e)) => {
                if open.as_ref().is_some_and(|field| field.depth == depth) {
                    if let Some(field) = open.take() {
                        doc.metadata.record(
                            field.field,
                            collapse_whitespace(&field.text),
                            field.scheme,
                        );
                    }
                }
                section = leave_section(section, e.local_name().as_ref());
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                doc.diagnostics.push(Diagnostic::malformed_markup(
                    "package",
                    Some(reader.buffer_position() as usize),
                    alloc::format!("XML error: {}", e),
                ));
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    if let Some(field) = open.take() {
        doc.metadata
            .record(field.field, collapse_whitespace(&field.text), field.scheme);
    }
    log::debug!(
        "package parsed: manifest={} spine={} title={:?}",
        doc.manifest.len(),
        doc.spine.len(),
        doc.metadata.title
    );
    doc
}

fn enter_section(current: Section, name: &[u8]) -> Section {
    match name {
        b"metadata" => Section::Metadata,
        b"manifest" => Section::Manifest,
        b"spine" => Section::Spine,
        _ => current,
    }
}

fn leave_section(current: Section, name: &[u8]) -> Section {
    match (current, name) {
        (Section::Metadata, b"metadata")
        | (Section::Manifest, b"manifest")
        | (Section::Spine, b"spine") => Section::Other,
        _ => current,
    }
}

fn handle_start(
    reader: &Reader<&[u8]>,
    e: &BytesStart<'_>,
    section: Section,
    depth: usize,
    doc: &mut PackageDocument,
    open: &mut Option<OpenField>,
) {
    let local = e.local_name();
    match (section, local.as_ref()) {
        (Section::Metadata, name) if open.is_none() => {
            if let Some(field) = MetadataField::from_local_name(name) {
                let scheme = match field {
                    MetadataField::Identifier => find_attr(reader, e, b"scheme")
                        .or_else(|| find_attr(reader, e, b"id"))
                        .filter(|s| !s.is_empty()),
                    _ => None,
                };
                *open = Some(OpenField {
                    field,
                    scheme,
                    depth,
                    text: String::new(),
                });
            }
        }
        (_, b"item") if section == Section::Manifest || section == Section::Other => {
            if let Some(item) = manifest_item(reader, e) {
                if !doc.manifest.insert(item) {
                    log::debug!("duplicate manifest id ignored");
                }
            }
        }
        (Section::Spine, b"itemref") => {
            if let Some(item) = spine_item(reader, e) {
                doc.spine.push(item);
            }
        }
        (_, b"spine") => {
            if let Some(toc) = find_attr(reader, e, b"toc") {
                doc.spine.set_toc_id(toc);
            }
        }
        _ => {}
    }
}

fn manifest_item(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Option<ManifestItem> {
    let mut id = None;
    let mut href = None;
    let mut media_type = String::new();
    let mut properties = None;
    for attr in e.attributes().with_checks(false).flatten() {
        let value = attr_value(reader, &attr);
        match attr.key.local_name().as_ref() {
            b"id" => id = Some(value),
            b"href" => href = Some(value),
            b"media-type" => media_type = value,
            b"properties" => properties = Some(value).filter(|p| !p.trim().is_empty()),
            _ => {}
        }
    }
    match (id, href) {
        (Some(id), Some(href)) if !id.is_empty() && !href.is_empty() => Some(ManifestItem {
            id,
            href,
            media_type,
            properties,
        }),
        _ => None,
    }
}

fn spine_item(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Option<SpineItem> {
    let idref = find_attr(reader, e, b"idref").filter(|id| !id.is_empty())?;
    let linear = find_attr(reader, e, b"linear")
        .map(|value| !value.trim().eq_ignore_ascii_case("no"))
        .unwrap_or(true);
    Some(SpineItem { idref, linear })
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
    <dc:title>Pride &amp; Prejudice</dc:title>
    <dc:creator opf:role="aut">Jane Austen</dc:creator>
    <dc:creator>Second Creator</dc:creator>
    <dc:language>en</dc:language>
    <dc:publisher>Penguin</dc:publisher>
    <dc:description>A  novel
      of manners.</dc:description>
    <dc:subject>Fiction</dc:subject>
    <dc:subject>Romance</dc:subject>
    <dc:identifier id="uid" opf:scheme="ISBN">978-0141439518</dc:identifier>
    <dc:identifier id="uuid">urn:uuid:1234</dc:identifier>
    <dc:date>1813-01-28</dc:date>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
    <item id="css" href="styles/main.css" media-type="text/css"/>
    <item id="ch1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="text/ch2.xhtml" media-type="application/xhtml+xml"/>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="cover-img" href="images/cover.jpg" media-type="image/jpeg" properties="cover-image"/>
  </manifest>
  <spine toc="ncx">
    <itemref idref="ch1"/>
    <itemref idref="ch2" linear="no"/>
    <itemref idref="ghost"/>
    <itemref idref="cover-img"/>
    <itemref idref="ch1"/>
  </spine>
</package>"#;

    #[test]
    fn metadata_first_values_and_lists() {
        let doc = parse_package(OPF);
        let meta = &doc.metadata;
        assert_eq!(meta.title, "Pride & Prejudice");
        assert_eq!(meta.creator, "Jane Austen");
        assert_eq!(meta.language, "en");
        assert_eq!(meta.publisher, "Penguin");
        assert_eq!(meta.description, "A novel of manners.");
        assert_eq!(meta.subjects, vec!["Fiction", "Romance"]);
        assert_eq!(meta.identifiers.len(), 2);
        assert_eq!(meta.identifiers[0].scheme, "ISBN");
        assert_eq!(meta.identifiers[0].value, "978-0141439518");
        assert_eq!(meta.identifiers[1].scheme, "uuid");
        assert_eq!(meta.date, "1813-01-28");
        assert!(doc.diagnostics.is_empty());
    }

    #[test]
    fn manifest_is_keyed_by_id() {
        let doc = parse_package(OPF);
        assert_eq!(doc.manifest.len(), 6);
        let ch1 = doc.manifest.get("ch1").expect("ch1");
        assert_eq!(ch1.href, "text/ch1.xhtml");
        assert!(ch1.is_html());
        assert!(!doc.manifest.get("css").expect("css").is_html());
        assert_eq!(doc.manifest.stylesheets().count(), 1);
        assert_eq!(doc.manifest.nav_item().map(|i| i.id.as_str()), Some("nav"));
        assert!(doc
            .manifest
            .get("cover-img")
            .expect("cover")
            .has_property("cover-image"));
    }

    #[test]
    fn spine_keeps_document_order_and_linear_flag() {
        let doc = parse_package(OPF);
        let ids: Vec<&str> = doc.spine.items().iter().map(|i| i.idref.as_str()).collect();
        assert_eq!(ids, vec!["ch1", "ch2", "ghost", "cover-img", "ch1"]);
        assert!(doc.spine.items()[0].linear);
        assert!(!doc.spine.items()[1].linear);
        assert_eq!(doc.spine.toc_id(), Some("ncx"));
        assert_eq!(doc.ncx_item().map(|i| i.href.as_str()), Some("toc.ncx"));
    }

    #[test]
    fn resolved_spine_drops_unknown_and_non_html() {
        let doc = parse_package(OPF);
        let resolved: Vec<&str> = doc
            .resolved_spine()
            .iter()
            .map(|(entry, _)| entry.idref.as_str())
            .collect();
        assert_eq!(resolved, vec!["ch1", "ch2", "ch1"]);
    }

    #[test]
    fn spine_length_matches_valid_itemrefs() {
        let mut opf = String::from("<package><manifest>");
        for i in 0..5 {
            opf.push_str(&alloc::format!(
                r#"<item id="c{i}" href="c{i}.xhtml" media-type="application/xhtml+xml"/>"#
            ));
        }
        opf.push_str("</manifest><spine>");
        for i in [4, 0, 2] {
            opf.push_str(&alloc::format!(r#"<itemref idref="c{i}"/>"#));
        }
        opf.push_str("</spine></package>");
        let doc = parse_package(&opf);
        assert_eq!(doc.resolved_spine().len(), 3);
    }

    #[test]
    fn missing_title_is_empty_string() {
        let doc = parse_package(
            r#"<package><metadata><dc:creator>Anon</dc:creator></metadata></package>"#,
        );
        assert_eq!(doc.metadata.title, "");
        assert_eq!(doc.metadata.creator, "Anon");
        assert!(doc.metadata.subjects.is_empty());
    }

    #[test]
    fn truncated_descriptor_keeps_partial_result() {
        let truncated = r#"<package><metadata><dc:title>Half</dc:title></metadata>
<manifest><item id="a" href="a.xhtml" media-type="application/xhtml+xml"/>
<spine><itemref idref="a"/></spine><item id="b" href="b.x"#;
        let doc = parse_package(truncated);
        assert_eq!(doc.metadata.title, "Half");
        assert!(doc.manifest.get("a").is_some());
    }

    #[test]
    fn items_without_id_or_href_are_ignored() {
        let doc = parse_package(
            r#"<package><manifest>
              <item href="x.xhtml" media-type="application/xhtml+xml"/>
              <item id="y" media-type="application/xhtml+xml"/>
              <item id="z" href="z.xhtml" media-type="application/xhtml+xml"/>
            </manifest></package>"#,
        );
        assert_eq!(doc.manifest.len(), 1);
    }
}
