//! Book model and the load pipeline.
//!
//! Loading runs: locate descriptor -> parse package -> gather book
//! stylesheets -> load each spine chapter (resolve, style, parse) -> read the
//! navigation document. Only a missing descriptor or an empty chapter list
//! fail the load; every other problem is a [`Diagnostic`] on the result.

extern crate alloc;

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use std::path::Path;

use crate::container::{locate_package, package_dir, parse_container, CONTAINER_PATH};
use crate::css::{StyleConfig, StyleContext, StyleSheet};
use crate::error::{Diagnostic, Diagnostics, LoadError};
use crate::html::{self, HtmlLimits, ParsedNode};
use crate::loader::{self, ContentSource, DirSource};
use crate::metadata::BookMetadata;
use crate::navigation::{self, Navigation, NavigationLimits};
use crate::package::{parse_package, Manifest, ManifestItem, PackageDocument};
use crate::spine::Spine;

/// Size and shape bounds for one load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadLimits {
    /// Chapters larger than this are dropped with a diagnostic.
    pub max_chapter_bytes: usize,
    /// Stylesheets larger than this are ignored.
    pub max_stylesheet_bytes: usize,
    /// Element nesting kept as structure in chapter trees.
    pub max_nesting_depth: usize,
}

impl Default for LoadLimits {
    fn default() -> Self {
        Self {
            max_chapter_bytes: 8 * 1024 * 1024,
            max_stylesheet_bytes: 512 * 1024,
            max_nesting_depth: 256,
        }
    }
}

impl LoadLimits {
    /// Tighter preset for memory-constrained readers.
    pub fn embedded() -> Self {
        Self {
            max_chapter_bytes: 1024 * 1024,
            max_stylesheet_bytes: 64 * 1024,
            max_nesting_depth: 64,
        }
    }
}

/// Options for [`load_book`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadOptions {
    /// Parse chapters on scoped worker threads. Output is identical to the
    /// sequential path.
    pub parallel: bool,
    /// Size bounds.
    pub limits: LoadLimits,
    /// Tag defaults and base font size.
    pub style: StyleConfig,
    /// Navigation document bounds.
    pub navigation: NavigationLimits,
}

impl LoadOptions {
    /// Enable or disable parallel chapter parsing.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Replace the size bounds.
    pub fn with_limits(mut self, limits: LoadLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the style configuration.
    pub fn with_style(mut self, style: StyleConfig) -> Self {
        self.style = style;
        self
    }

    /// Replace the navigation bounds.
    pub fn with_navigation_limits(mut self, limits: NavigationLimits) -> Self {
        self.navigation = limits;
        self
    }
}

/// One loaded spine document. Immutable after load.
#[derive(Clone, Debug, PartialEq)]
pub struct Chapter {
    /// Manifest id.
    pub id: String,
    /// `<title>`, else first `<h1>`, else `Chapter N`.
    pub title: String,
    /// Manifest href.
    pub href: String,
    /// Path the content was actually read from.
    pub path: String,
    /// Raw markup.
    pub markup: String,
    /// Parsed, styled tree.
    pub tree: ParsedNode,
    /// Book styles with this chapter's `<style>` blocks merged over them.
    pub stylesheet: StyleSheet,
    /// Spine `linear` flag.
    pub linear: bool,
    /// Position in the declared spine.
    pub spine_index: usize,
}

/// One entry of [`Book::table_of_contents`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TocEntry {
    /// Display label.
    pub label: String,
    /// Target path relative to the book root, fragment kept.
    pub href: String,
    /// Nesting depth (0 = top level).
    pub depth: usize,
    /// Loaded chapter the entry points into.
    pub chapter_index: Option<usize>,
}

/// A loaded book.
#[derive(Clone, Debug, PartialEq)]
pub struct Book {
    metadata: BookMetadata,
    manifest: Manifest,
    spine: Spine,
    package_path: String,
    stylesheet: StyleSheet,
    chapters: Vec<Chapter>,
    navigation: Option<Navigation>,
    navigation_path: String,
}

/// A book plus everything that went wrong while loading it.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadResult {
    /// Loaded book.
    pub book: Book,
    /// Recoverable problems, in discovery order.
    pub diagnostics: Diagnostics,
}

impl Book {
    /// Descriptive metadata.
    pub fn metadata(&self) -> &BookMetadata {
        &self.metadata
    }

    /// Title from metadata.
    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    /// Declared resources.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Declared reading order.
    pub fn spine(&self) -> &Spine {
        &self.spine
    }

    /// Path of the package descriptor.
    pub fn package_path(&self) -> &str {
        &self.package_path
    }

    /// Book-level styles from manifest stylesheets.
    pub fn stylesheet(&self) -> &StyleSheet {
        &self.stylesheet
    }

    /// Loaded chapters in spine order.
    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    /// Chapter at `index`.
    pub fn chapter(&self, index: usize) -> Option<&Chapter> {
        self.chapters.get(index)
    }

    /// Number of loaded chapters.
    pub fn chapter_count(&self) -> usize {
        self.chapters.len()
    }

    /// Chapter loaded from manifest item `id`.
    pub fn chapter_by_id(&self, id: &str) -> Option<&Chapter> {
        self.chapters.iter().find(|chapter| chapter.id == id)
    }

    /// Index of the chapter an href points into. Fragments are ignored; the
    /// href may be the manifest form or the resolved path.
    pub fn chapter_index_by_href(&self, href: &str) -> Option<usize> {
        let target = normalize_href(href);
        if target.is_empty() {
            return None;
        }
        self.chapters
            .iter()
            .position(|chapter| normalize_href(&chapter.href) == target || chapter.path == target)
    }

    /// Chapters in the linear reading order (`linear="no"` excluded).
    pub fn linear_chapters(&self) -> impl Iterator<Item = (usize, &Chapter)> {
        self.chapters
            .iter()
            .enumerate()
            .filter(|(_, chapter)| chapter.linear)
    }

    /// Parsed navigation document, when the book has one.
    pub fn navigation(&self) -> Option<&Navigation> {
        self.navigation.as_ref()
    }

    /// Flattened table of contents.
    ///
    /// Falls back to one entry per chapter (by title) when the book has no
    /// usable navigation document.
    pub fn table_of_contents(&self) -> Vec<TocEntry> {
        match self.navigation.as_ref().filter(|nav| nav.has_toc()) {
            Some(nav) => nav
                .toc_flat()
                .into_iter()
                .map(|(depth, point)| {
                    let href = loader::resolve_relative(&self.navigation_path, &point.href);
                    let href = match point.href.split_once('#') {
                        Some((_, fragment)) => alloc::format!("{}#{}", href, fragment),
                        None => href,
                    };
                    TocEntry {
                        label: point.label.clone(),
                        chapter_index: self.chapter_index_by_href(&href),
                        href,
                        depth,
                    }
                })
                .collect(),
            None => self
                .chapters
                .iter()
                .enumerate()
                .map(|(index, chapter)| TocEntry {
                    label: chapter.title.clone(),
                    href: chapter.path.clone(),
                    depth: 0,
                    chapter_index: Some(index),
                })
                .collect(),
        }
    }

    /// All chapter markup joined in spine order, each preceded by a
    /// `<!-- Chapter: title -->` marker.
    pub fn concatenated_markup(&self) -> String {
        let capacity = self
            .chapters
            .iter()
            .map(|chapter| chapter.markup.len() + chapter.title.len() + 24)
            .sum();
        let mut out = String::with_capacity(capacity);
        for chapter in &self.chapters {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str("<!-- Chapter: ");
            out.push_str(&chapter.title);
            out.push_str(" -->\n");
            out.push_str(chapter.markup.trim());
        }
        out
    }
}

fn normalize_href(href: &str) -> String {
    let path = href.split('#').next().unwrap_or("");
    loader::normalize_path(&loader::percent_decode(path))
}

/// Load a book extracted to a directory.
pub fn load_book_from_dir(root: impl AsRef<Path>) -> Result<LoadResult, LoadError> {
    load_book(&DirSource::new(root.as_ref()), &LoadOptions::default())
}

/// Load a book from any content source.
pub fn load_book<S: ContentSource + ?Sized>(
    source: &S,
    options: &LoadOptions,
) -> Result<LoadResult, LoadError> {
    let package_path = find_package(source)?;
    let opf = source
        .read_text(&package_path)
        .map_err(|err| LoadError::PackageUnreadable {
            path: package_path.clone(),
            message: err.to_string(),
        })?;
    load_package(source, package_path, &opf, options)
}

fn find_package<S: ContentSource + ?Sized>(source: &S) -> Result<String, LoadError> {
    let container = if source.exists(CONTAINER_PATH) {
        source.read_text(CONTAINER_PATH).ok()
    } else {
        None
    };
    let pointer_ok = container.as_deref().and_then(parse_container).is_some();
    let listing = if pointer_ok { Vec::new() } else { source.list() };
    locate_package(container.as_deref(), &listing)
}

/// Everything after the descriptor text is in hand.
fn load_package<S: ContentSource + ?Sized>(
    source: &S,
    package_path: String,
    opf: &str,
    options: &LoadOptions,
) -> Result<LoadResult, LoadError> {
    let PackageDocument {
        metadata,
        manifest,
        spine,
        diagnostics: package_diags,
    } = parse_package(opf);
    let mut diagnostics = Diagnostics::new();
    diagnostics.extend(
        package_diags
            .into_iter()
            .map(|d| d.in_context(&package_path)),
    );
    let pkg_dir = package_dir(&package_path).to_string();

    let stylesheet = load_stylesheets(source, &manifest, &pkg_dir, options, &mut diagnostics);
    let ctx = StyleContext::new(options.style.clone(), stylesheet);

    let jobs: Vec<ChapterJob<'_>> = spine
        .items()
        .iter()
        .enumerate()
        .filter_map(|(spine_index, entry)| match manifest.get(&entry.idref) {
            Some(item) if item.is_html() => Some(ChapterJob {
                spine_index,
                item,
                linear: entry.linear,
            }),
            Some(item) => {
                log::debug!(
                    "spine idref {} has media type {}; skipped",
                    entry.idref,
                    item.media_type
                );
                None
            }
            None => {
                log::debug!("spine idref {} not in manifest; skipped", entry.idref);
                None
            }
        })
        .collect();
    let attempted = jobs.len();

    let env = ChapterEnv {
        pkg_dir: &pkg_dir,
        ctx: &ctx,
        limits: options.limits,
    };
    let outcomes = if options.parallel && jobs.len() > 1 {
        load_parallel(source, &jobs, &env)
    } else {
        jobs.iter().map(|job| load_chapter(source, job, &env)).collect()
    };

    let mut chapters = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            Ok((chapter, chapter_diags)) => {
                diagnostics.extend(chapter_diags);
                chapters.push(chapter);
            }
            Err(diag) => diagnostics.push(diag),
        }
    }

    if let Some(summary) = diagnostics.summary(attempted) {
        log::warn!("{}", summary);
    }
    if chapters.is_empty() {
        return Err(LoadError::EmptyResult {
            attempted,
            diagnostics,
        });
    }

    let (navigation, navigation_path) =
        load_navigation(source, &manifest, &spine, &pkg_dir, options, &mut diagnostics);
    log::info!(
        "loaded {:?}: {} of {} chapters, {} diagnostics",
        metadata.title,
        chapters.len(),
        attempted,
        diagnostics.len()
    );

    let stylesheet = ctx.sheet;
    Ok(LoadResult {
        book: Book {
            metadata,
            manifest,
            spine,
            package_path,
            stylesheet,
            chapters,
            navigation,
            navigation_path,
        },
        diagnostics,
    })
}

fn load_stylesheets<S: ContentSource + ?Sized>(
    source: &S,
    manifest: &Manifest,
    pkg_dir: &str,
    options: &LoadOptions,
    diagnostics: &mut Diagnostics,
) -> StyleSheet {
    let mut sheet = StyleSheet::new();
    for item in manifest.stylesheets() {
        let (path, css) = match loader::resolve(source, &item.href, pkg_dir) {
            Ok(found) => found,
            Err(diag) => {
                log::warn!("stylesheet skipped: {}", diag);
                continue;
            }
        };
        if css.len() > options.limits.max_stylesheet_bytes {
            log::warn!(
                "stylesheet {} exceeds max_stylesheet_bytes ({} > {})",
                path,
                css.len(),
                options.limits.max_stylesheet_bytes
            );
            continue;
        }
        let (parsed, diags) = StyleSheet::parse(&css, &path, options.style.base_font_size);
        diagnostics.extend(diags);
        sheet.merge(&parsed);
    }
    sheet
}

struct ChapterJob<'a> {
    spine_index: usize,
    item: &'a ManifestItem,
    linear: bool,
}

struct ChapterEnv<'a> {
    pkg_dir: &'a str,
    ctx: &'a StyleContext,
    limits: LoadLimits,
}

type ChapterOutcome = Result<(Chapter, Diagnostics), Diagnostic>;

fn load_parallel<S: ContentSource + ?Sized>(
    source: &S,
    jobs: &[ChapterJob<'_>],
    env: &ChapterEnv<'_>,
) -> Vec<ChapterOutcome> {
    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, jobs.len());
    let chunk = jobs.len().div_ceil(workers);
    log::debug!("loading {} chapters on {} workers", jobs.len(), workers);

    std::thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .chunks(chunk)
            .map(|batch| {
                scope.spawn(move || {
                    batch
                        .iter()
                        .map(|job| load_chapter(source, job, env))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        // chunks are contiguous, so joining in spawn order keeps spine order
        let mut outcomes = Vec::with_capacity(jobs.len());
        for (handle, batch) in handles.into_iter().zip(jobs.chunks(chunk)) {
            match handle.join() {
                Ok(batch_outcomes) => outcomes.extend(batch_outcomes),
                Err(_) => {
                    log::error!("chapter worker panicked");
                    outcomes.extend(batch.iter().map(|job| {
                        Err(Diagnostic::chapter_dropped(
                            job.item.href.clone(),
                            "chapter worker panicked",
                        ))
                    }));
                }
            }
        }
        outcomes
    })
}

fn load_chapter<S: ContentSource + ?Sized>(
    source: &S,
    job: &ChapterJob<'_>,
    env: &ChapterEnv<'_>,
) -> ChapterOutcome {
    let href = &job.item.href;
    let (path, markup) = loader::resolve(source, href, env.pkg_dir)?;
    if markup.len() > env.limits.max_chapter_bytes {
        return Err(Diagnostic::chapter_dropped(
            href.clone(),
            alloc::format!(
                "chapter exceeds max_chapter_bytes ({} > {})",
                markup.len(),
                env.limits.max_chapter_bytes
            ),
        ));
    }

    let pre = html::preprocess(&markup);
    let mut diagnostics = Diagnostics::new();
    let chapter_ctx;
    let ctx = if pre.style_blocks.is_empty() {
        env.ctx
    } else {
        let mut sheet = env.ctx.sheet.clone();
        for block in &pre.style_blocks {
            let (parsed, diags) = StyleSheet::parse(block, &path, env.ctx.config.base_font_size);
            diagnostics.extend(diags);
            sheet.merge(&parsed);
        }
        chapter_ctx = StyleContext::new(env.ctx.config.clone(), sheet);
        &chapter_ctx
    };

    let limits = HtmlLimits {
        max_depth: env.limits.max_nesting_depth,
    };
    let output = html::parse_preprocessed(pre, ctx, limits);
    diagnostics.extend(output.diagnostics.into_iter().map(|d| d.in_context(href)));

    let title = chapter_title(&output.root, job.spine_index);
    Ok((
        Chapter {
            id: job.item.id.clone(),
            title,
            href: href.clone(),
            path,
            markup,
            tree: output.root,
            stylesheet: ctx.sheet.clone(),
            linear: job.linear,
            spine_index: job.spine_index,
        },
        diagnostics,
    ))
}

fn chapter_title(tree: &ParsedNode, spine_index: usize) -> String {
    ["title", "h1"]
        .into_iter()
        .filter_map(|tag| tree.find_first(tag))
        .map(ParsedNode::text_content)
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| alloc::format!("Chapter {}", spine_index + 1))
}

fn load_navigation<S: ContentSource + ?Sized>(
    source: &S,
    manifest: &Manifest,
    spine: &Spine,
    pkg_dir: &str,
    options: &LoadOptions,
    diagnostics: &mut Diagnostics,
) -> (Option<Navigation>, String) {
    let nav_item = manifest.nav_item();
    let ncx_item = spine
        .toc_id()
        .and_then(|id| manifest.get(id))
        .or_else(|| manifest.items().iter().find(|item| item.is_ncx()));

    for (item, is_ncx) in [(nav_item, false), (ncx_item, true)] {
        let Some(item) = item else { continue };
        let (path, text) = match loader::resolve(source, &item.href, pkg_dir) {
            Ok(found) => found,
            Err(diag) => {
                log::warn!("navigation document unavailable: {}", diag);
                continue;
            }
        };
        let parsed = if is_ncx {
            navigation::parse_ncx_with_limits(&text, options.navigation)
        } else {
            navigation::parse_nav_xhtml_with_limits(&text, options.navigation)
        };
        match parsed {
            Ok(nav) if nav.has_toc() => return (Some(nav), path),
            Ok(_) => log::debug!("navigation document {} has no toc", path),
            Err(err) => diagnostics.push(Diagnostic::from(err).in_context(&path)),
        }
    }
    (None, String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemorySource;

    const CONTAINER: &str = r#"<container><rootfiles>
        <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
    </rootfiles></container>"#;

    fn opf(items: &str, spine: &str) -> String {
        alloc::format!(
            r#"<package><metadata><dc:title>Test Book</dc:title></metadata>
<manifest>{}</manifest><spine>{}</spine></package>"#,
            items, spine
        )
    }

    fn xhtml(id: &str) -> String {
        alloc::format!(
            r#"<item id="{id}" href="{id}.xhtml" media-type="application/xhtml+xml"/>"#
        )
    }

    #[test]
    fn titles_fall_back_to_h1_then_position() {
        let source = MemorySource::new()
            .with_file(CONTAINER_PATH, CONTAINER)
            .with_file(
                "OEBPS/content.opf",
                opf(
                    &[xhtml("a"), xhtml("b"), xhtml("c")].concat(),
                    r#"<itemref idref="a"/><itemref idref="b"/><itemref idref="c"/>"#,
                ),
            )
            .with_file("OEBPS/a.xhtml", "<html><head><title>Alpha</title></head><body><h1>x</h1></body></html>")
            .with_file("OEBPS/b.xhtml", "<html><head><title> </title></head><body><h1>Beta</h1></body></html>")
            .with_file("OEBPS/c.xhtml", "<html><body><p>no heading</p></body></html>");
        let result = load_book(&source, &LoadOptions::default()).expect("loads");
        let titles: Vec<&str> = result
            .book
            .chapters()
            .iter()
            .map(|c| c.title.as_str())
            .collect();
        assert_eq!(titles, vec!["Alpha", "Beta", "Chapter 3"]);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn missing_chapter_is_reported_not_fatal() {
        let source = MemorySource::new()
            .with_file(CONTAINER_PATH, CONTAINER)
            .with_file(
                "OEBPS/content.opf",
                opf(
                    &[xhtml("a"), xhtml("gone")].concat(),
                    r#"<itemref idref="a"/><itemref idref="gone"/><itemref idref="nope"/>"#,
                ),
            )
            .with_file("OEBPS/a.xhtml", "<p>a</p>");
        let result = load_book(&source, &LoadOptions::default()).expect("loads");
        assert_eq!(result.book.chapter_count(), 1);
        assert_eq!(result.diagnostics.chapter_failures(), 1);
        assert_eq!(
            result.diagnostics.summary(2).as_deref(),
            Some("1 of 2 chapters failed to load")
        );
    }

    #[test]
    fn no_chapters_is_empty_result() {
        let source = MemorySource::new()
            .with_file(CONTAINER_PATH, CONTAINER)
            .with_file("OEBPS/content.opf", opf(&xhtml("a"), r#"<itemref idref="a"/>"#));
        match load_book(&source, &LoadOptions::default()) {
            Err(LoadError::EmptyResult {
                attempted,
                diagnostics,
            }) => {
                assert_eq!(attempted, 1);
                assert_eq!(diagnostics.chapter_failures(), 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn missing_descriptor_is_package_not_found() {
        let source = MemorySource::new().with_file("OEBPS/a.xhtml", "<p>a</p>");
        assert_eq!(
            load_book(&source, &LoadOptions::default()).map(|_| ()),
            Err(LoadError::PackageNotFound)
        );
    }

    #[test]
    fn book_and_chapter_styles_reach_the_tree() {
        let items = alloc::format!(
            r#"{}<item id="css" href="css/book.css" media-type="text/css"/>"#,
            xhtml("a")
        );
        let source = MemorySource::new()
            .with_file(CONTAINER_PATH, CONTAINER)
            .with_file("OEBPS/content.opf", opf(&items, r#"<itemref idref="a"/>"#))
            .with_file("OEBPS/css/book.css", ".lead { font-size: 20px } .x { color: blue }")
            .with_file(
                "OEBPS/a.xhtml",
                r#"<html><head><style>.x { color: red }</style></head>
<body><p class="lead x">t</p></body></html>"#,
            );
        let result = load_book(&source, &LoadOptions::default()).expect("loads");
        let book = &result.book;
        let p = book.chapters()[0].tree.find_first("p").expect("p");
        let style = p.style().expect("style");
        assert_eq!(style.get("fontSize").and_then(|v| v.as_number()), Some(20.0));
        assert_eq!(style.get("color").map(ToString::to_string).as_deref(), Some("red"));
        assert_eq!(
            book.stylesheet()
                .class("x")
                .and_then(|s| s.get("color"))
                .map(ToString::to_string)
                .as_deref(),
            Some("blue")
        );
    }

    #[test]
    fn toc_from_nav_document_maps_to_chapters() {
        let items = alloc::format!(
            r#"{}{}<item id="nav" href="nav/nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>"#,
            xhtml("a"),
            xhtml("b")
        );
        let nav = r#"<html><body><nav epub:type="toc"><ol>
<li><a href="../a.xhtml">First</a></li>
<li><a href="../b.xhtml#part">Second</a></li></ol></nav></body></html>"#;
        let source = MemorySource::new()
            .with_file(CONTAINER_PATH, CONTAINER)
            .with_file(
                "OEBPS/content.opf",
                opf(&items, r#"<itemref idref="a"/><itemref idref="b" linear="no"/>"#),
            )
            .with_file("OEBPS/a.xhtml", "<p>a</p>")
            .with_file("OEBPS/b.xhtml", "<p>b</p>")
            .with_file("OEBPS/nav/nav.xhtml", nav);
        let book = load_book(&source, &LoadOptions::default()).expect("loads").book;
        let toc = book.table_of_contents();
        assert_eq!(toc.len(), 2);
        assert_eq!(toc[1].label, "Second");
        assert_eq!(toc[1].href, "OEBPS/b.xhtml#part");
        assert_eq!(toc[1].chapter_index, Some(1));
        assert_eq!(book.chapter_index_by_href("b.xhtml#x"), Some(1));
        assert_eq!(book.linear_chapters().count(), 1);
        assert_eq!(book.chapter_by_id("a").map(|c| c.spine_index), Some(0));
    }

    #[test]
    fn toc_falls_back_to_chapter_titles() {
        let source = MemorySource::new()
            .with_file(CONTAINER_PATH, CONTAINER)
            .with_file("OEBPS/content.opf", opf(&xhtml("a"), r#"<itemref idref="a"/>"#))
            .with_file("OEBPS/a.xhtml", "<h1>Only</h1>");
        let book = load_book(&source, &LoadOptions::default()).expect("loads").book;
        let toc = book.table_of_contents();
        assert_eq!(toc.len(), 1);
        assert_eq!(toc[0].label, "Only");
        assert_eq!(toc[0].chapter_index, Some(0));
    }

    #[test]
    fn concatenated_markup_marks_chapters() {
        let source = MemorySource::new()
            .with_file(CONTAINER_PATH, CONTAINER)
            .with_file(
                "OEBPS/content.opf",
                opf(&[xhtml("a"), xhtml("b")].concat(), r#"<itemref idref="a"/><itemref idref="b"/>"#),
            )
            .with_file("OEBPS/a.xhtml", "<h1>One</h1>")
            .with_file("OEBPS/b.xhtml", "<h1>Two</h1>");
        let book = load_book(&source, &LoadOptions::default()).expect("loads").book;
        assert_eq!(
            book.concatenated_markup(),
            "<!-- Chapter: One -->\n<h1>One</h1>\n\n<!-- Chapter: Two -->\n<h1>Two</h1>"
        );
    }

    #[test]
    fn oversized_chapter_is_dropped() {
        let source = MemorySource::new()
            .with_file(CONTAINER_PATH, CONTAINER)
            .with_file(
                "OEBPS/content.opf",
                opf(&[xhtml("a"), xhtml("b")].concat(), r#"<itemref idref="a"/><itemref idref="b"/>"#),
            )
            .with_file("OEBPS/a.xhtml", "<p>small</p>")
            .with_file("OEBPS/b.xhtml", "<p>this one is much too large</p>");
        let options = LoadOptions::default().with_limits(LoadLimits {
            max_chapter_bytes: 16,
            ..LoadLimits::default()
        });
        let result = load_book(&source, &options).expect("loads");
        assert_eq!(result.book.chapter_count(), 1);
        assert_eq!(result.diagnostics.len(), 1);
        let dropped = result.diagnostics.iter().next().expect("diagnostic");
        assert_eq!(dropped.code(), "CHAPTER_DROPPED");
        assert_eq!(
            result.diagnostics.summary(2).as_deref(),
            Some("1 of 2 chapters failed to load")
        );
    }
}
