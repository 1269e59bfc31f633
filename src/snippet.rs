//! Highlighted snippets for ranked results.
//!
//! A snippet is a window of the document text positioned a little before
//! the first match, with every match inside the window wrapped in
//! [`HIGHLIGHT_OPEN`] / [`HIGHLIGHT_CLOSE`].
//!
//! Two kinds of match exist:
//!
//! - [`highlight_terms`] marks every word whose normalized form is one of the
//!   query terms. The whole word is marked (minus surrounding punctuation),
//!   so `tip` marks all of "Tips" and `dont` marks "don't".
//! - [`highlight_literal`] marks case-insensitive occurrences of a literal
//!   at any offset, the same rule exact-match search filters with.

use std::collections::HashSet;

use crate::tokenize::{normalize_word, word_spans};

pub const HIGHLIGHT_OPEN: &str = "<mark>";
pub const HIGHLIGHT_CLOSE: &str = "</mark>";
pub const ELLIPSIS: &str = "...";

/// Snippet of roughly `length` bytes highlighting words that normalize to
/// one of `terms`.
pub fn highlight_terms(text: &str, terms: &[String], length: usize) -> String {
    render(text, &term_spans(text, terms), length)
}

/// Snippet of roughly `length` bytes highlighting occurrences of `literal`.
pub fn highlight_literal(text: &str, literal: &str, length: usize) -> String {
    render(text, &literal_spans(text, literal), length)
}

/// Byte ranges of matched words, trimmed to their alphanumeric core.
fn term_spans(text: &str, terms: &[String]) -> Vec<(usize, usize)> {
    let wanted: HashSet<&str> = terms.iter().map(String::as_str).collect();
    word_spans(text)
        .into_iter()
        .filter_map(|(start, word)| {
            let term = normalize_word(word)?;
            if !wanted.contains(term.as_str()) {
                return None;
            }
            let (first, _) = word.char_indices().find(|(_, c)| c.is_alphanumeric())?;
            let (last, c) = word.char_indices().rev().find(|(_, c)| c.is_alphanumeric())?;
            Some((start + first, start + last + c.len_utf8()))
        })
        .collect()
}

/// Non-overlapping byte ranges where `literal` occurs, compared lower-cased.
fn literal_spans(text: &str, literal: &str) -> Vec<(usize, usize)> {
    let needle: Vec<char> = literal.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return Vec::new();
    }
    let mut spans = Vec::new();
    let mut resume = 0;
    for (i, _) in text.char_indices() {
        if i < resume {
            continue;
        }
        if let Some(len) = literal_len_at(&text[i..], &needle) {
            spans.push((i, i + len));
            resume = i + len;
        }
    }
    spans
}

/// Length in bytes of the prefix of `rest` equal to `needle` once lower-cased.
fn literal_len_at(rest: &str, needle: &[char]) -> Option<usize> {
    let mut k = 0;
    for (offset, c) in rest.char_indices() {
        if k == needle.len() {
            return Some(offset);
        }
        for lower in c.to_lowercase() {
            if needle.get(k) != Some(&lower) {
                return None;
            }
            k += 1;
        }
    }
    (k == needle.len()).then_some(rest.len())
}

/// Cut the window around the first span and mark the spans that fit in it.
/// Falls back to the start of the text when there is no span.
fn render(text: &str, spans: &[(usize, usize)], length: usize) -> String {
    let length = length.max(1);
    let first = spans.first().map(|&(s, _)| s);

    let mut start = first.map(|p| p.saturating_sub(length / 4)).unwrap_or(0);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (start + length).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }

    let mut out = String::with_capacity(end - start + 32);
    if start > 0 {
        out.push_str(ELLIPSIS);
    }

    let mut copied = start;
    for &(s, e) in spans {
        if s < copied || e > end {
            continue;
        }
        out.push_str(&text[copied..s]);
        out.push_str(HIGHLIGHT_OPEN);
        out.push_str(&text[s..e]);
        out.push_str(HIGHLIGHT_CLOSE);
        copied = e;
    }
    out.push_str(&text[copied..end]);

    if end < text.len() {
        out.push_str(ELLIPSIS);
    }
    out
}
