//! Document view: the underlying character string plus a token sequence.
//!
//! Tokenization is the caller's job; a `Document` only validates that token
//! spans are ordered, non-overlapping and on char boundaries. Each token owns
//! its annotation map, and the document owns the diagnostics channel that
//! runtime errors are recorded on.

use crate::engine::AnnotationKey;
use crate::error::{DocumentError, RuntimeError};
use crate::{Span, Value};
use std::collections::BTreeMap;

/// A token plus its annotations.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    text: String,
    start: usize,
    end: usize,
    annotations: BTreeMap<AnnotationKey, Value>,
}

impl Token {
    /// Surface form.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Start byte offset in the document text.
    pub fn start(&self) -> usize {
        self.start
    }

    /// End byte offset (exclusive).
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn get(&self, key: AnnotationKey) -> Option<&Value> {
        self.annotations.get(&key)
    }

    pub fn annotations(&self) -> impl Iterator<Item = (AnnotationKey, &Value)> {
        self.annotations.iter().map(|(k, v)| (*k, v))
    }

    /// Set an annotation; returns true when the stored value changed.
    pub fn set(&mut self, key: AnnotationKey, value: Value) -> bool {
        match self.annotations.get(&key) {
            Some(existing) if *existing == value => false,
            _ => {
                self.annotations.insert(key, value);
                true
            }
        }
    }

    pub fn remove(&mut self, key: AnnotationKey) -> Option<Value> {
        self.annotations.remove(&key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    text: String,
    tokens: Vec<Token>,
    diagnostics: Vec<RuntimeError>,
}

impl Document {
    /// Build a document from its text and token byte spans.
    pub fn new(
        text: impl Into<String>,
        spans: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Self, DocumentError> {
        let text = text.into();
        let mut tokens: Vec<Token> = Vec::new();
        for (index, (start, end)) in spans.into_iter().enumerate() {
            if end > text.len() || start > end {
                return Err(DocumentError::OutOfBounds { index, start, end, len: text.len() });
            }
            if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
                return Err(DocumentError::NotCharBoundary { index, start, end });
            }
            if start == end || tokens.last().is_some_and(|prev| prev.end > start) {
                return Err(DocumentError::Unordered { index });
            }
            tokens.push(Token { text: text[start..end].to_string(), start, end, annotations: BTreeMap::new() });
        }
        Ok(Document { text, tokens, diagnostics: Vec::new() })
    }

    /// Join `words` with single spaces, one token per word.
    pub fn from_words<S: AsRef<str>>(words: &[S]) -> Self {
        let mut text = String::new();
        let mut spans = Vec::with_capacity(words.len());
        for word in words {
            let word = word.as_ref();
            if word.is_empty() {
                continue;
            }
            if !text.is_empty() {
                text.push(' ');
            }
            spans.push((text.len(), text.len() + word.len()));
            text.push_str(word);
        }
        let tokens = spans
            .into_iter()
            .map(|(start, end)| Token { text: text[start..end].to_string(), start, end, annotations: BTreeMap::new() })
            .collect();
        Document { text, tokens, diagnostics: Vec::new() }
    }

    /// One token per run of non-whitespace characters.
    pub fn from_whitespace(text: impl Into<String>) -> Self {
        let text = text.into();
        let tokens = regex!(r"\S+")
            .find_iter(&text)
            .map(|m| Token { text: m.as_str().to_string(), start: m.start(), end: m.end(), annotations: BTreeMap::new() })
            .collect();
        Document { text, tokens, diagnostics: Vec::new() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn token(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub fn token_mut(&mut self, index: usize) -> Option<&mut Token> {
        self.tokens.get_mut(index)
    }

    pub(crate) fn tokens_mut(&mut self) -> &mut [Token] {
        &mut self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Runtime errors recorded while processing this document.
    pub fn diagnostics(&self) -> &[RuntimeError] {
        &self.diagnostics
    }

    pub(crate) fn record(&mut self, err: RuntimeError) {
        self.diagnostics.push(err);
    }

    /// Annotation values of `key` for every token (None where unset).
    pub fn column(&self, key: AnnotationKey) -> Vec<Option<&Value>> {
        self.tokens.iter().map(|t| t.get(key)).collect()
    }

    /// Document text covered by a token span (from the first token's start to
    /// the last token's end).
    pub fn span_text(&self, span: Span) -> &str {
        if span.is_empty() || span.end > self.tokens.len() {
            return "";
        }
        let start = self.tokens[span.start].start;
        let end = self.tokens[span.end - 1].end;
        &self.text[start..end]
    }

    /// Smallest token span that touches the byte range `start..end`, or None
    /// when the range lies entirely between tokens.
    pub fn covering_span(&self, start: usize, end: usize) -> Option<Span> {
        let first = self.tokens.partition_point(|t| t.end <= start);
        let last = self.tokens.partition_point(|t| t.start < end);
        if first < last { Some(Span::new(first, last)) } else { None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_words_joins_with_spaces() {
        let doc = Document::from_words(&["foo", "foobar", "foo"]);
        assert_eq!(doc.text(), "foo foobar foo");
        let spans: Vec<(usize, usize)> = doc.tokens().iter().map(|t| (t.start(), t.end())).collect();
        assert_eq!(spans, vec![(0, 3), (4, 10), (11, 14)]);
    }

    #[test]
    fn from_whitespace_splits_runs() {
        let doc = Document::from_whitespace("  light\tblue\n.");
        let words: Vec<&str> = doc.tokens().iter().map(|t| t.text()).collect();
        assert_eq!(words, vec!["light", "blue", "."]);
    }

    #[test]
    fn new_validates_spans() {
        assert!(Document::new("abc def", vec![(0, 3), (4, 7)]).is_ok());
        assert_eq!(
            Document::new("abc", vec![(0, 4)]).unwrap_err(),
            DocumentError::OutOfBounds { index: 0, start: 0, end: 4, len: 3 }
        );
        assert_eq!(Document::new("abcdef", vec![(0, 3), (2, 5)]).unwrap_err(), DocumentError::Unordered { index: 1 });
        assert_eq!(
            Document::new("é", vec![(0, 1)]).unwrap_err(),
            DocumentError::NotCharBoundary { index: 0, start: 0, end: 1 }
        );
    }

    #[test]
    fn covering_span_extends_to_whole_tokens() {
        let doc = Document::from_words(&["foo", "foobar", "foo"]);
        assert_eq!(doc.covering_span(0, 3), Some(Span::new(0, 1)));
        assert_eq!(doc.covering_span(2, 6), Some(Span::new(0, 2)));
        assert_eq!(doc.covering_span(3, 4), None);
        assert_eq!(doc.span_text(Span::new(1, 3)), "foobar foo");
    }

    #[test]
    fn set_reports_changes() {
        let mut doc = Document::from_words(&["a"]);
        let mut reg = crate::KeyRegistry::new();
        let ner = reg.bind("ner", "NER");
        let tok = doc.token_mut(0).unwrap();
        assert!(tok.set(ner, "X".into()));
        assert!(!tok.set(ner, "X".into()));
        assert!(tok.set(ner, "Y".into()));
        assert_eq!(doc.column(ner), vec![Some(&Value::from("Y"))]);
    }

    #[test]
    fn remove_clears_one_key() {
        let mut doc = Document::from_words(&["a"]);
        let mut reg = crate::KeyRegistry::new();
        let (ner, tag) = (reg.bind("ner", "NER"), reg.bind("tag", "TAG"));
        let tok = doc.token_mut(0).unwrap();
        tok.set(ner, "X".into());
        tok.set(tag, "T".into());
        assert_eq!(tok.remove(ner), Some(Value::from("X")));
        assert_eq!(tok.remove(ner), None);
        assert_eq!(tok.get(ner), None);
        assert_eq!(tok.get(tag), Some(&Value::from("T")));
    }
}
