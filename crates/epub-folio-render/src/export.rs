//! Hand-off encodings for the external renderer.
//!
//! Pages are wrapped in a versioned envelope together with the viewport they
//! were computed for. JSON is for debugging and web views; the postcard form
//! is compact for IPC.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::paginate::{Page, Viewport};

const EXPORT_SCHEMA_VERSION: u8 = 1;

/// Versioned page payload for one chapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageExport {
    version: u8,
    /// Chapter index in spine order.
    pub chapter_index: usize,
    /// Viewport the pages were computed for.
    pub viewport: Viewport,
    /// Pages in order.
    pub pages: Vec<Page>,
}

/// Encoding or decoding failure.
#[derive(Debug)]
pub enum ExportError {
    /// JSON encoding failed.
    Json(serde_json::Error),
    /// Binary encoding failed.
    Binary(postcard::Error),
    /// Payload was written by an incompatible version.
    Version { found: u8, expected: u8 },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(err) => write!(f, "page export json error: {}", err),
            Self::Binary(err) => write!(f, "page export binary error: {}", err),
            Self::Version { found, expected } => write!(
                f,
                "page export version {} is not supported (expected {})",
                found, expected
            ),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<serde_json::Error> for ExportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

impl From<postcard::Error> for ExportError {
    fn from(err: postcard::Error) -> Self {
        Self::Binary(err)
    }
}

impl PageExport {
    /// Wrap the pages of one chapter.
    pub fn new(chapter_index: usize, viewport: Viewport, pages: &[Page]) -> Self {
        Self {
            version: EXPORT_SCHEMA_VERSION,
            chapter_index,
            viewport,
            pages: pages.to_vec(),
        }
    }

    /// JSON text.
    pub fn to_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse JSON text, rejecting other schema versions.
    pub fn from_json(text: &str) -> Result<Self, ExportError> {
        serde_json::from_str::<Self>(text)?.checked()
    }

    /// Compact binary form.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ExportError> {
        Ok(postcard::to_allocvec(self)?)
    }

    /// Parse the binary form, rejecting other schema versions.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExportError> {
        postcard::from_bytes::<Self>(bytes)?.checked()
    }

    fn checked(self) -> Result<Self, ExportError> {
        if self.version != EXPORT_SCHEMA_VERSION {
            return Err(ExportError::Version {
                found: self.version,
                expected: EXPORT_SCHEMA_VERSION,
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paginate::{PageNode, PageNodeKind};

    fn sample() -> PageExport {
        let page = Page {
            nodes: vec![PageNode {
                path: vec![0, 1, 0],
                tag: "p".into(),
                kind: PageNodeKind::Text,
                height: 48,
            }],
            height_used: 48,
        };
        PageExport::new(2, Viewport::new(600, 800), &[page])
    }

    #[test]
    fn json_carries_field_names_for_web_views() {
        let json = sample().to_json().expect("json");
        assert!(json.contains("\"height_used\":48"));
        assert!(json.contains("\"width_px\":600"));
        assert_eq!(PageExport::from_json(&json).expect("parse"), sample());
    }

    #[test]
    fn binary_form_is_smaller_than_json() {
        let export = sample();
        let bytes = export.to_bytes().expect("bytes");
        assert!(bytes.len() < export.to_json().expect("json").len());
        assert_eq!(PageExport::from_bytes(&bytes).expect("decode"), export);
    }

    #[test]
    fn other_versions_are_rejected() {
        let json = sample().to_json().expect("json").replacen("\"version\":1", "\"version\":9", 1);
        assert!(matches!(
            PageExport::from_json(&json),
            Err(ExportError::Version { found: 9, expected: 1 })
        ));
    }

    #[test]
    fn truncated_bytes_fail() {
        let bytes = sample().to_bytes().expect("bytes");
        assert!(matches!(
            PageExport::from_bytes(&bytes[..bytes.len() / 2]),
            Err(ExportError::Binary(_))
        ));
    }
}
