//! Async loading for runtimes that must not block on file I/O.
//!
//! Files are read with `tokio::fs` into a [`MemorySource`]; parsing then runs
//! the same synchronous pipeline as [`load_book`].

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use std::path::{Path, PathBuf};

use crate::book::{load_book, LoadOptions, LoadResult};
use crate::error::LoadError;
use crate::loader::MemorySource;

/// Extensions of the text resources the pipeline reads.
const TEXT_EXTENSIONS: [&str; 8] = ["xml", "opf", "ncx", "xhtml", "html", "htm", "css", "svg"];

/// Async counterpart of [`crate::load_book_from_dir`].
pub async fn load_book_from_dir_async(root: impl AsRef<Path>) -> Result<LoadResult, LoadError> {
    load_book_from_dir_async_with_options(root, &LoadOptions::default()).await
}

/// [`load_book_from_dir_async`] with explicit options.
pub async fn load_book_from_dir_async_with_options(
    root: impl AsRef<Path>,
    options: &LoadOptions,
) -> Result<LoadResult, LoadError> {
    let source = read_text_tree(root.as_ref()).await;
    log::debug!("read {} text resources", source.len());
    load_book(&source, options)
}

async fn read_text_tree(root: &Path) -> MemorySource {
    let mut source = MemorySource::new();
    let mut pending: Vec<(PathBuf, String)> = alloc::vec![(root.to_path_buf(), String::new())];

    while let Some((dir, prefix)) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) => {
                log::debug!("cannot list {}: {}", dir.display(), err);
                continue;
            }
        };
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    log::debug!("listing {} stopped: {}", dir.display(), err);
                    break;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let rel = if prefix.is_empty() {
                name
            } else {
                alloc::format!("{}/{}", prefix, name)
            };
            match entry.file_type().await {
                Ok(kind) if kind.is_dir() => pending.push((entry.path(), rel)),
                Ok(kind) if kind.is_file() && is_text_resource(&rel) => {
                    match tokio::fs::read(entry.path()).await {
                        Ok(bytes) => {
                            let text = String::from_utf8(bytes).unwrap_or_else(|err| {
                                String::from_utf8_lossy(err.as_bytes()).into_owned()
                            });
                            source.insert(rel, text);
                        }
                        Err(err) => log::debug!("cannot read {}: {}", rel, err),
                    }
                }
                _ => {}
            }
        }
    }
    source
}

fn is_text_resource(path: &str) -> bool {
    path.rsplit_once('.').is_some_and(|(_, ext)| {
        TEXT_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
    })
}
