//! Dublin Core metadata carried by the package descriptor.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

/// Book identifier such as an ISBN or UUID.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Identifier {
    /// Identifier scheme (`opf:scheme`, else element id, else `"unknown"`).
    pub scheme: String,
    /// Identifier value.
    pub value: String,
}

/// Descriptive metadata for a book.
///
/// Every field defaults to empty when the descriptor omits it; a missing
/// field is never an error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BookMetadata {
    /// `dc:title`
    pub title: String,
    /// `dc:creator`
    pub creator: String,
    /// `dc:publisher`
    pub publisher: String,
    /// `dc:language`
    pub language: String,
    /// `dc:description`
    pub description: String,
    /// Every `dc:subject`, in document order.
    pub subjects: Vec<String>,
    /// Every `dc:identifier`, in document order.
    pub identifiers: Vec<Identifier>,
    /// `dc:date`
    pub date: String,
}

/// Metadata element recognized by the package parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MetadataField {
    Title,
    Creator,
    Publisher,
    Language,
    Description,
    Subject,
    Identifier,
    Date,
}

impl MetadataField {
    /// Map a local element name (namespace prefix already removed).
    pub(crate) fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Self::Title),
            b"creator" => Some(Self::Creator),
            b"publisher" => Some(Self::Publisher),
            b"language" => Some(Self::Language),
            b"description" => Some(Self::Description),
            b"subject" => Some(Self::Subject),
            b"identifier" => Some(Self::Identifier),
            b"date" => Some(Self::Date),
            _ => None,
        }
    }
}

impl BookMetadata {
    /// Store a completed element value.
    ///
    /// Scalar fields keep the first non-empty value; subjects and
    /// identifiers accumulate.
    pub(crate) fn record(&mut self, field: MetadataField, value: String, scheme: Option<String>) {
        let slot = match field {
            MetadataField::Title => &mut self.title,
            MetadataField::Creator => &mut self.creator,
            MetadataField::Publisher => &mut self.publisher,
            MetadataField::Language => &mut self.language,
            MetadataField::Description => &mut self.description,
            MetadataField::Date => &mut self.date,
            MetadataField::Subject => {
                self.subjects.push(value);
                return;
            }
            MetadataField::Identifier => {
                self.identifiers.push(Identifier {
                    scheme: scheme.unwrap_or_else(|| String::from("unknown")),
                    value,
                });
                return;
            }
        };
        if slot.is_empty() {
            *slot = value;
        }
    }

    /// Primary identifier value, if any.
    pub fn identifier(&self) -> Option<&str> {
        self.identifiers.first().map(|id| id.value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_fields_keep_first_value() {
        let mut meta = BookMetadata::default();
        meta.record(MetadataField::Title, "First".into(), None);
        meta.record(MetadataField::Title, "Second".into(), None);
        assert_eq!(meta.title, "First");
    }

    #[test]
    fn empty_first_value_is_replaced() {
        let mut meta = BookMetadata::default();
        meta.record(MetadataField::Creator, String::new(), None);
        meta.record(MetadataField::Creator, "Jane Austen".into(), None);
        assert_eq!(meta.creator, "Jane Austen");
    }

    #[test]
    fn lists_accumulate_in_order() {
        let mut meta = BookMetadata::default();
        meta.record(MetadataField::Subject, "Fiction".into(), None);
        meta.record(MetadataField::Subject, "Romance".into(), None);
        meta.record(MetadataField::Identifier, "urn:isbn:1".into(), Some("ISBN".into()));
        meta.record(MetadataField::Identifier, "abc".into(), None);
        assert_eq!(meta.subjects, vec!["Fiction", "Romance"]);
        assert_eq!(meta.identifiers[0].scheme, "ISBN");
        assert_eq!(meta.identifiers[1].scheme, "unknown");
        assert_eq!(meta.identifier(), Some("urn:isbn:1"));
    }

    #[test]
    fn field_lookup_ignores_unknown_names() {
        assert_eq!(
            MetadataField::from_local_name(b"language"),
            Some(MetadataField::Language)
        );
        assert_eq!(MetadataField::from_local_name(b"meta"), None);
    }
}
