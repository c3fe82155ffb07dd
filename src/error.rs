//! Error and diagnostic types for the load pipeline.
//!
//! Only two conditions abort a book load: no package descriptor can be
//! located, or no chapter survives loading. Everything else is a
//! [`Diagnostic`] collected alongside the partial result.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

/// Fatal book-load failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// Neither the container pointer nor the archive listing named a package
    /// descriptor.
    PackageNotFound,
    /// A package descriptor was located but could not be read.
    PackageUnreadable {
        /// Path of the descriptor that failed to read.
        path: String,
        /// Underlying I/O message.
        message: String,
    },
    /// Zero chapters survived loading.
    EmptyResult {
        /// Number of spine entries that were attempted.
        attempted: usize,
        /// Diagnostics gathered before giving up.
        diagnostics: Diagnostics,
    },
}

impl LoadError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PackageNotFound => "PACKAGE_NOT_FOUND",
            Self::PackageUnreadable { .. } => "PACKAGE_UNREADABLE",
            Self::EmptyResult { .. } => "EMPTY_RESULT",
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PackageNotFound => write!(f, "no package descriptor (.opf) could be located"),
            Self::PackageUnreadable { path, message } => {
                write!(f, "package descriptor {} could not be read: {}", path, message)
            }
            Self::EmptyResult {
                attempted,
                diagnostics,
            } => write!(
                f,
                "no chapters were loaded ({} spine entries attempted, {} diagnostics)",
                attempted,
                diagnostics.len()
            ),
        }
    }
}

impl std::error::Error for LoadError {}

/// Recoverable condition recorded while loading a book.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// A spine entry resolved to no readable file under any candidate path.
    ChapterReadFailure {
        /// Manifest href of the dropped chapter.
        href: String,
        /// Candidate paths that were probed, in order.
        tried: Vec<String>,
    },
    /// A chapter was read but not kept (size limit, worker failure).
    ChapterDropped {
        /// Manifest href of the dropped chapter.
        href: String,
        /// Why it was dropped.
        reason: String,
    },
    /// Markup could not be fully parsed; a best-effort tree was kept.
    MalformedMarkup {
        /// Document the problem was found in (href or "package").
        context: String,
        /// Byte offset into the preprocessed input, when known.
        offset: Option<usize>,
        /// Human-readable description.
        message: String,
    },
    /// A single CSS declaration was skipped.
    MalformedStyleDeclaration {
        /// Where the declaration came from (stylesheet href, selector or
        /// `style` attribute).
        source: String,
        /// Raw declaration text.
        declaration: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

impl Diagnostic {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ChapterReadFailure { .. } => "CHAPTER_READ_FAILURE",
            Self::ChapterDropped { .. } => "CHAPTER_DROPPED",
            Self::MalformedMarkup { .. } => "MALFORMED_MARKUP",
            Self::MalformedStyleDeclaration { .. } => "MALFORMED_STYLE_DECLARATION",
        }
    }

    pub(crate) fn chapter_dropped(href: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ChapterDropped {
            href: href.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_markup(
        context: impl Into<String>,
        offset: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        Self::MalformedMarkup {
            context: context.into(),
            offset,
            message: message.into(),
        }
    }

    /// Attach a document context to a markup diagnostic raised without one.
    pub(crate) fn in_context(mut self, ctx: &str) -> Self {
        match &mut self {
            Self::MalformedMarkup { context, .. } if context.is_empty() => {
                context.push_str(ctx);
            }
            Self::MalformedStyleDeclaration { source, .. } if source.is_empty() => {
                source.push_str(ctx);
            }
            _ => {}
        }
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChapterReadFailure { href, tried } => write!(
                f,
                "chapter {} not found (tried: {})",
                href,
                tried.join(", ")
            ),
            Self::ChapterDropped { href, reason } => {
                write!(f, "chapter {} dropped: {}", href, reason)
            }
            Self::MalformedMarkup {
                context,
                offset: Some(offset),
                message,
            } => write!(f, "malformed markup in {} at {}: {}", context, offset, message),
            Self::MalformedMarkup {
                context, message, ..
            } => write!(f, "malformed markup in {}: {}", context, message),
            Self::MalformedStyleDeclaration {
                source,
                declaration,
                reason,
            } => write!(
                f,
                "skipped style declaration `{}` in {}: {}",
                declaration, source, reason
            ),
        }
    }
}

/// Ordered collection of recoverable diagnostics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic and mirror it to the log.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        log::warn!("[{}] {}", diagnostic.code(), diagnostic);
        self.items.push(diagnostic);
    }

    /// Append diagnostics gathered elsewhere. They were logged when first
    /// pushed, so they are not logged again.
    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        self.items.extend(other);
    }

    /// Number of diagnostics recorded.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing went wrong.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Number of spine chapters missing from the loaded book.
    pub fn chapter_failures(&self) -> usize {
        self.items
            .iter()
            .filter(|d| {
                matches!(
                    d,
                    Diagnostic::ChapterReadFailure { .. } | Diagnostic::ChapterDropped { .. }
                )
            })
            .count()
    }

    /// Short user-facing summary, e.g. `"3 of 12 chapters failed to load"`.
    ///
    /// Returns `None` when every chapter loaded.
    pub fn summary(&self, total_chapters: usize) -> Option<String> {
        let failed = self.chapter_failures();
        if failed == 0 {
            return None;
        }
        Some(alloc::format!(
            "{} of {} chapters failed to load",
            failed, total_chapters
        ))
    }

    /// Consume into the underlying vector.
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = alloc::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = core::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_counts_only_chapter_failures() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::ChapterReadFailure {
            href: "a.xhtml".into(),
            tried: vec!["a.xhtml".into(), "OPS/a.xhtml".into()],
        });
        diags.push(Diagnostic::malformed_markup("b.xhtml", Some(4), "unterminated tag"));
        diags.push(Diagnostic::ChapterReadFailure {
            href: "c.xhtml".into(),
            tried: vec![],
        });
        diags.push(Diagnostic::chapter_dropped("d.xhtml", "too large"));
        assert_eq!(diags.len(), 4);
        assert_eq!(diags.chapter_failures(), 3);
        assert_eq!(
            diags.summary(12).as_deref(),
            Some("3 of 12 chapters failed to load")
        );
    }

    #[test]
    fn summary_is_none_without_failures() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::MalformedStyleDeclaration {
            source: "style.css".into(),
            declaration: "color".into(),
            reason: "missing `:`",
        });
        assert_eq!(diags.summary(3), None);
    }

    #[test]
    fn display_includes_tried_paths() {
        let diag = Diagnostic::ChapterReadFailure {
            href: "ch1.xhtml".into(),
            tried: vec!["ch1.xhtml".into(), "OEBPS/ch1.xhtml".into()],
        };
        let text = diag.to_string();
        assert!(text.contains("ch1.xhtml, OEBPS/ch1.xhtml"));
        assert_eq!(diag.code(), "CHAPTER_READ_FAILURE");
    }

    #[test]
    fn in_context_fills_only_empty_context() {
        let diag = Diagnostic::malformed_markup("", None, "x").in_context("ch2.xhtml");
        assert!(matches!(
            diag,
            Diagnostic::MalformedMarkup { ref context, .. } if context == "ch2.xhtml"
        ));
        let kept = Diagnostic::malformed_markup("a", None, "x").in_context("b");
        assert!(matches!(
            kept,
            Diagnostic::MalformedMarkup { ref context, .. } if context == "a"
        ));
    }

    #[test]
    fn load_error_codes_are_stable() {
        assert_eq!(LoadError::PackageNotFound.code(), "PACKAGE_NOT_FOUND");
        let err = LoadError::EmptyResult {
            attempted: 2,
            diagnostics: Diagnostics::new(),
        };
        assert_eq!(err.code(), "EMPTY_RESULT");
        assert!(err.to_string().contains("2 spine entries"));
    }
}
