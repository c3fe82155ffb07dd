//! Small quick-xml helpers shared by the descriptor and navigation parsers.

extern crate alloc;

use alloc::borrow::Cow;
use alloc::string::{String, ToString};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesRef, BytesStart};
use quick_xml::reader::Reader;

/// Pull reader with lenient settings for real-world package files.
pub(crate) fn lenient_reader(content: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(content.as_bytes());
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    reader
}

/// Decoded, entity-unescaped attribute value.
pub(crate) fn attr_value(reader: &Reader<&[u8]>, attr: &Attribute<'_>) -> String {
    let raw = reader
        .decoder()
        .decode(attr.value.as_ref())
        .unwrap_or_default();
    if !raw.contains('&') {
        return raw.into_owned();
    }
    quick_xml::escape::unescape(raw.as_ref())
        .map(Cow::into_owned)
        .unwrap_or_else(|_| raw.to_string())
}

/// Value of the attribute whose local name is `name` (prefix ignored).
pub(crate) fn find_attr(reader: &Reader<&[u8]>, e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .with_checks(false)
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .map(|attr| attr_value(reader, &attr))
}

/// Resolve a general entity reference (`&amp;`, `&#39;`) to text.
///
/// Unknown named entities are kept verbatim so no text is silently lost.
pub(crate) fn resolve_entity(e: &BytesRef<'_>) -> String {
    let name = e.decode().unwrap_or_default();
    let mut entity = String::with_capacity(name.len() + 2);
    entity.push('&');
    entity.push_str(name.as_ref());
    entity.push(';');
    match quick_xml::escape::unescape(&entity) {
        Ok(resolved) => resolved.into_owned(),
        Err(_) => entity.to_string(),
    }
}

/// Collapse runs of whitespace to single spaces and trim the ends.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::events::Event;

    #[test]
    fn find_attr_ignores_namespace_prefix() {
        let xml = r#"<dc:identifier opf:scheme="ISBN" id="uid">x</dc:identifier>"#;
        let mut reader = lenient_reader(xml);
        let mut buf = Vec::new();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                assert_eq!(find_attr(&reader, &e, b"scheme").as_deref(), Some("ISBN"));
                assert_eq!(find_attr(&reader, &e, b"id").as_deref(), Some("uid"));
                assert_eq!(find_attr(&reader, &e, b"missing"), None);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn collapse_whitespace_trims_and_joins() {
        assert_eq!(collapse_whitespace("  Pride \n and\tPrejudice "), "Pride and Prejudice");
        assert_eq!(collapse_whitespace(" \n "), "");
    }
}
