//! Package descriptor discovery.
//!
//! `META-INF/container.xml` names the package descriptor through its first
//! `<rootfile full-path="...">`. Damaged books sometimes ship without it, so
//! the archive listing is searched for an `.opf` file as a fallback.

extern crate alloc;

use alloc::string::String;
use quick_xml::events::Event;

use crate::error::LoadError;
use crate::xml::{find_attr, lenient_reader};

/// Conventional location of the container pointer.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Media type identifying an OPF root file.
const OPF_MEDIA_TYPE: &str = "application/oebps-package+xml";

/// Extract the package descriptor path from container XML.
///
/// When several `<rootfile>` elements exist the first OPF-typed one wins,
/// otherwise the first one. Returns `None` if the XML is unusable or names
/// no root file.
pub fn parse_container(xml: &str) -> Option<String> {
    let mut reader = lenient_reader(xml);
    let mut buf = Vec::with_capacity(64);
    let mut first: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"rootfile" =>
            {
                let path = find_attr(&reader, &e, b"full-path")
                    .map(|path| String::from(path.trim()))
                    .filter(|path| !path.is_empty());
                if let Some(path) = path {
                    let is_opf = find_attr(&reader, &e, b"media-type")
                        .is_some_and(|media| media.trim() == OPF_MEDIA_TYPE);
                    if is_opf {
                        return Some(path);
                    }
                    if first.is_none() {
                        first = Some(path);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                log::debug!("container.xml parse error: {:?}", e);
                break;
            }
            _ => {}
        }
        buf.clear();
    }
    first
}

/// Locate the package descriptor.
///
/// Tries the container pointer first, then the first listing entry ending
/// in `.opf`. Fails with [`LoadError::PackageNotFound`] only when both
/// strategies come up empty.
pub fn locate_package<S: AsRef<str>>(
    container_xml: Option<&str>,
    listing: &[S],
) -> Result<String, LoadError> {
    if let Some(path) = container_xml.and_then(parse_container) {
        log::debug!("package descriptor from container pointer: {}", path);
        return Ok(path);
    }
    listing
        .iter()
        .map(AsRef::as_ref)
        .find(|name| is_package_file(name))
        .map(|name| {
            log::debug!("package descriptor from listing: {}", name);
            String::from(name.trim_start_matches("./"))
        })
        .ok_or(LoadError::PackageNotFound)
}

/// Directory containing the descriptor (`""` when it sits at the root).
pub fn package_dir(package_path: &str) -> &str {
    match package_path.rfind('/') {
        Some(idx) => &package_path[..idx],
        None => "",
    }
}

fn is_package_file(name: &str) -> bool {
    name.len() > 4
        && name
            .get(name.len() - 4..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(".opf"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

    #[test]
    fn container_names_descriptor() {
        assert_eq!(parse_container(CONTAINER).as_deref(), Some("OEBPS/content.opf"));
    }

    #[test]
    fn opf_typed_rootfile_is_preferred() {
        let xml = r#"<container><rootfiles>
            <rootfile full-path="preview.pdf" media-type="application/pdf"/>
            <rootfile full-path="book.opf" media-type="application/oebps-package+xml"/>
        </rootfiles></container>"#;
        assert_eq!(parse_container(xml).as_deref(), Some("book.opf"));
    }

    #[test]
    fn container_without_rootfile_yields_none() {
        assert_eq!(parse_container("<container><rootfiles/></container>"), None);
        assert_eq!(parse_container("not xml at all <<<"), None);
    }

    #[test]
    fn listing_fallback_picks_first_opf() {
        let listing = ["mimetype", "OPS/images/a.png", "OPS/package.OPF", "other.opf"];
        assert_eq!(
            locate_package(None, &listing).as_deref(),
            Ok("OPS/package.OPF")
        );
    }

    #[test]
    fn broken_container_falls_back_to_listing() {
        let listing = ["content.opf"];
        assert_eq!(
            locate_package(Some("<container/>"), &listing).as_deref(),
            Ok("content.opf")
        );
    }

    #[test]
    fn nothing_found_is_package_not_found() {
        let listing: [&str; 2] = ["mimetype", "OPS/ch1.xhtml"];
        assert_eq!(
            locate_package(None, &listing),
            Err(LoadError::PackageNotFound)
        );
    }

    #[test]
    fn package_dir_of_root_and_nested() {
        assert_eq!(package_dir("content.opf"), "");
        assert_eq!(package_dir("OEBPS/content.opf"), "OEBPS");
        assert_eq!(package_dir("a/b/c.opf"), "a/b");
    }
}
