//! Plain-text helpers over chapter markup.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use crate::html::{decode_entities, preprocess};

/// Default excerpt length handed to language detection.
pub const DEFAULT_EXCERPT_CHARS: usize = 500;

/// Markup reduced to readable text.
///
/// Scripts, styles and comments are dropped, tags become word breaks,
/// entities are decoded and whitespace is collapsed.
pub fn plain_text(markup: &str) -> String {
    let cleaned = preprocess(markup).markup;
    let mut stripped = String::with_capacity(cleaned.len());
    let mut in_tag = false;
    for ch in cleaned.chars() {
        match (in_tag, ch) {
            (false, '<') => {
                in_tag = true;
                stripped.push(' ');
            }
            (true, '>') => in_tag = false,
            (false, c) => stripped.push(c),
            (true, _) => {}
        }
    }
    crate::xml::collapse_whitespace(&decode_entities(&stripped))
}

/// First `max_chars` characters of [`plain_text`].
pub fn excerpt(markup: &str, max_chars: usize) -> String {
    let text = plain_text(markup);
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => String::from(text[..cut].trim_end()),
        None => text,
    }
}

/// A whitespace-delimited word and where it sits in its source text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Word<'a> {
    /// Word text.
    pub text: &'a str,
    /// Ordinal among the words of the source.
    pub index: usize,
    /// Byte offset of the word in the source.
    pub offset: usize,
}

/// Split text into words for per-word hit targets.
pub fn words(text: &str) -> Vec<Word<'_>> {
    let base = text.as_ptr() as usize;
    text.split_whitespace()
        .enumerate()
        .map(|(index, word)| Word {
            text: word,
            index,
            offset: word.as_ptr() as usize - base,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_strips_markup() {
        let markup = r#"<html><head><style>p{color:red}</style><script>var x = "<p>";</script></head>
<body><h1>Title</h1><p>One &lt;two&gt; &amp; <b>three</b></p></body></html>"#;
        assert_eq!(plain_text(markup), "Title One <two> & three");
    }

    #[test]
    fn excerpt_cuts_on_char_boundary() {
        assert_eq!(excerpt("<p>héllo world</p>", 5), "héllo");
        assert_eq!(excerpt("<p>short</p>", 500), "short");
        assert_eq!(excerpt("", 10), "");
    }

    #[test]
    fn words_carry_offsets() {
        let text = "  tap  these words";
        let found = words(text);
        assert_eq!(found.len(), 3);
        assert_eq!(found[1].text, "these");
        assert_eq!(found[1].index, 1);
        assert_eq!(&text[found[2].offset..], "words");
    }
}
