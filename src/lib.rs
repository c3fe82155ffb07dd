//! epub-folio -- forgiving EPUB content pipeline
//!
//! Locates and parses the package descriptor, resolves the reading order,
//! parses chapter markup into a styled structural tree and maps stylesheet
//! text onto a platform-neutral style model. Malformed books degrade to
//! partial results plus [`Diagnostics`] instead of failing.
//!
//! Archive extraction is out of scope: content is read through a
//! [`ContentSource`] (an extracted directory or an in-memory map).
//! Pagination lives in the companion `epub-folio-render` crate.
//!
//! # Features
//!
//! - `async` -- `tokio::fs` based [`load_book_from_dir_async`]

#![warn(missing_docs)]
#![cfg_attr(
    not(test),
    deny(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented
    )
)]

extern crate alloc;

pub mod book;
pub mod container;
pub mod css;
pub mod error;
pub mod html;
pub mod loader;
pub mod metadata;
pub mod navigation;
pub mod package;
pub mod spine;
pub mod text;

mod xml;

#[cfg(feature = "async")]
pub mod async_api;

#[cfg(feature = "async")]
pub use async_api::{load_book_from_dir_async, load_book_from_dir_async_with_options};
pub use book::{
    load_book, load_book_from_dir, Book, Chapter, LoadLimits, LoadOptions, LoadResult, TocEntry,
};
pub use container::{locate_package, parse_container};
pub use css::{
    convert_property_name, convert_property_value, convert_unit, parse_css, parse_inline_style,
    CssRule, StyleConfig, StyleContext, StyleMap, StyleSheet, StyleValue, TagDefaults,
};
pub use error::{Diagnostic, Diagnostics, LoadError};
pub use html::{parse_html, parse_html_plain, ParseOutput, ParsedNode};
pub use loader::{candidate_paths, ContentSource, DirSource, MemorySource};
pub use metadata::{BookMetadata, Identifier};
pub use navigation::{NavPoint, Navigation};
pub use package::{parse_package, Manifest, ManifestItem, PackageDocument};
pub use spine::{Spine, SpineItem};
