//! Chapter content lookup.
//!
//! Manifest hrefs are relative to the package descriptor, but real-world
//! books disagree about what that means. Each href is therefore probed under
//! a short, fixed list of candidate paths against an injected
//! [`ContentSource`].

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Diagnostic;

/// Maximum number of candidate paths probed per href.
pub const MAX_CANDIDATES: usize = 4;

/// Directories conventionally holding content when the descriptor lies.
const CONVENTIONAL_DIRS: [&str; 2] = ["OPS", "OEBPS"];

/// Ordered candidate paths for one href.
pub type Candidates = heapless::Vec<String, MAX_CANDIDATES>;

/// Read access to the files of an (already extracted) book.
///
/// Paths are relative, `/`-separated and case-sensitive. Sources must be
/// shareable across threads so chapters can be loaded in parallel.
pub trait ContentSource: Send + Sync {
    /// True when `path` names a readable file.
    fn exists(&self, path: &str) -> bool;

    /// Read `path` as text.
    fn read_text(&self, path: &str) -> io::Result<String>;

    /// Every file path in the source.
    fn list(&self) -> Vec<String>;
}

impl<S: ContentSource + ?Sized> ContentSource for &S {
    fn exists(&self, path: &str) -> bool {
        (**self).exists(path)
    }

    fn read_text(&self, path: &str) -> io::Result<String> {
        (**self).read_text(path)
    }

    fn list(&self) -> Vec<String> {
        (**self).list()
    }
}

/// Candidate locations for `href`, in probe order.
///
/// 1. the href itself
/// 2. the href under the descriptor's directory (skipped at archive root)
/// 3. the href under `OPS/`
/// 4. the href under `OEBPS/`
///
/// The href is percent-decoded and its fragment stripped first; `.` and `..`
/// segments are normalized and duplicates removed.
pub fn candidate_paths(href: &str, package_dir: &str) -> Candidates {
    let href = strip_fragment(href);
    let href = percent_decode(href);
    let mut out = Candidates::new();

    push_unique(&mut out, normalize_path(&href));
    if !package_dir.is_empty() {
        push_unique(&mut out, join_path(package_dir, &href));
    }
    for dir in CONVENTIONAL_DIRS {
        push_unique(&mut out, join_path(dir, &href));
    }
    out
}

/// Find and read the content behind `href`.
///
/// The first existing candidate wins. When no candidate exists, or the
/// existing one cannot be read, a [`Diagnostic::ChapterReadFailure`] lists
/// every path that was tried.
pub fn resolve<S: ContentSource + ?Sized>(
    source: &S,
    href: &str,
    package_dir: &str,
) -> Result<(String, String), Diagnostic> {
    let candidates = candidate_paths(href, package_dir);
    let mut tried = Vec::with_capacity(candidates.len());
    for path in candidates {
        if !source.exists(&path) {
            tried.push(path);
            continue;
        }
        match source.read_text(&path) {
            Ok(text) => {
                log::debug!("resolved {} -> {}", href, path);
                return Ok((path, text));
            }
            Err(err) => {
                log::debug!("read of {} failed: {}", path, err);
                tried.push(path);
            }
        }
    }
    Err(Diagnostic::ChapterReadFailure {
        href: String::from(href),
        tried,
    })
}

/// Resolve a path written relative to another file (`a/b.xhtml` + `../c.css`).
pub fn resolve_relative(base_file: &str, href: &str) -> String {
    let dir = match base_file.rfind('/') {
        Some(idx) => &base_file[..idx],
        None => "",
    };
    let href = percent_decode(strip_fragment(href));
    if dir.is_empty() {
        normalize_path(&href)
    } else {
        join_path(dir, &href)
    }
}

fn push_unique(out: &mut Candidates, path: String) {
    if path.is_empty() || out.iter().any(|existing| *existing == path) {
        return;
    }
    if out.push(path).is_err() {
        log::debug!("candidate list full");
    }
}

fn strip_fragment(href: &str) -> &str {
    match href.find('#') {
        Some(idx) => &href[..idx],
        None => href,
    }
}

fn join_path(dir: &str, href: &str) -> String {
    let mut joined = String::with_capacity(dir.len() + href.len() + 1);
    joined.push_str(dir);
    joined.push('/');
    joined.push_str(href);
    normalize_path(&joined)
}

/// Collapse `.`/`..` segments and duplicate separators.
///
/// `..` above the root is dropped rather than escaping it.
pub(crate) fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Decode `%XX` escapes. Invalid escapes and non-UTF-8 results are kept
/// verbatim.
pub(crate) fn percent_decode(input: &str) -> String {
    if !input.contains('%') {
        return String::from(input);
    }
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| String::from(input))
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn strip_bom(text: String) -> String {
    match text.strip_prefix('\u{feff}') {
        Some(rest) => String::from(rest),
        None => text,
    }
}

/// Files of a book extracted to a directory on disk.
#[derive(Clone, Debug)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    /// Serve files below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, path: &str) -> PathBuf {
        let mut full = self.root.clone();
        for segment in normalize_path(path).split('/').filter(|s| !s.is_empty()) {
            full.push(segment);
        }
        full
    }

    fn collect(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::debug!("cannot list {}: {}", dir.display(), err);
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let rel = if prefix.is_empty() {
                name
            } else {
                alloc::format!("{}/{}", prefix, name)
            };
            match entry.file_type() {
                Ok(kind) if kind.is_dir() => self.collect(&entry.path(), &rel, out),
                Ok(kind) if kind.is_file() => out.push(rel),
                _ => {}
            }
        }
    }
}

impl ContentSource for DirSource {
    fn exists(&self, path: &str) -> bool {
        self.full_path(path).is_file()
    }

    fn read_text(&self, path: &str) -> io::Result<String> {
        let bytes = std::fs::read(self.full_path(path))?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        };
        Ok(strip_bom(text))
    }

    fn list(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect(&self.root, "", &mut out);
        out.sort();
        out
    }
}

/// In-memory book files keyed by path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemorySource {
    files: BTreeMap<String, String>,
}

impl MemorySource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a file.
    pub fn insert(&mut self, path: impl Into<String>, text: impl Into<String>) {
        self.files.insert(path.into(), text.into());
    }

    /// Builder-style [`MemorySource::insert`].
    pub fn with_file(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(path, text);
        self
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True when no files were added.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl<P: Into<String>, T: Into<String>> FromIterator<(P, T)> for MemorySource {
    fn from_iter<I: IntoIterator<Item = (P, T)>>(iter: I) -> Self {
        let mut source = Self::new();
        for (path, text) in iter {
            source.insert(path, text);
        }
        source
    }
}

impl ContentSource for MemorySource {
    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn read_text(&self, path: &str) -> io::Result<String> {
        self.files
            .get(path)
            .cloned()
            .map(strip_bom)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_owned()))
    }

    fn list(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }
}
