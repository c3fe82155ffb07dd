//! EPUB spine: the canonical reading order.
//!
//! The spine is an ordered list of manifest references. Order is taken
//! verbatim from the package descriptor; duplicate references are kept.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

/// A single spine entry (`<itemref>`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpineItem {
    /// Manifest item this entry references.
    pub idref: String,
    /// Whether this item is part of the linear reading order.
    ///
    /// Only an explicit `linear="no"` makes this false.
    pub linear: bool,
}

impl SpineItem {
    /// Linear entry for the given manifest id.
    pub fn new(idref: impl Into<String>) -> Self {
        Self {
            idref: idref.into(),
            linear: true,
        }
    }
}

/// Ordered spine entries plus the optional EPUB 2 NCX reference.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Spine {
    items: Vec<SpineItem>,
    toc_id: Option<String>,
}

impl Spine {
    /// Create an empty spine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a spine from raw idrefs (all linear).
    pub fn from_idrefs<I, S>(idrefs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: idrefs.into_iter().map(SpineItem::new).collect(),
            toc_id: None,
        }
    }

    pub(crate) fn push(&mut self, item: SpineItem) {
        self.items.push(item);
    }

    pub(crate) fn set_toc_id(&mut self, id: String) {
        if !id.is_empty() {
            self.toc_id = Some(id);
        }
    }

    /// Ordered spine entries.
    pub fn items(&self) -> &[SpineItem] {
        &self.items
    }

    /// `<spine toc="...">` value (EPUB 2 NCX manifest id).
    pub fn toc_id(&self) -> Option<&str> {
        self.toc_id.as_deref()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when the descriptor declared no itemrefs.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entry at `index`.
    pub fn get(&self, index: usize) -> Option<&SpineItem> {
        self.items.get(index)
    }

    /// Position of the first entry referencing `idref`.
    pub fn position_of(&self, idref: &str) -> Option<usize> {
        self.items.iter().position(|item| item.idref == idref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_idrefs_keeps_order_and_duplicates() {
        let spine = Spine::from_idrefs(["a", "b", "a"]);
        assert_eq!(spine.len(), 3);
        assert_eq!(spine.get(2).map(|i| i.idref.as_str()), Some("a"));
        assert_eq!(spine.position_of("a"), Some(0));
        assert!(spine.items().iter().all(|i| i.linear));
    }

    #[test]
    fn empty_toc_id_is_ignored() {
        let mut spine = Spine::new();
        spine.set_toc_id(String::new());
        assert_eq!(spine.toc_id(), None);
        spine.set_toc_id("ncx".into());
        assert_eq!(spine.toc_id(), Some("ncx"));
    }
}
