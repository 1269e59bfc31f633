//! Query and document normalization.
//!
//! Both the index builder and the query engine run text through the same
//! [`tokenize`] function, so a term only ever matches a term produced by
//! identical rules.
//!
//! # Rules
//!
//! 1. Lower-case the input.
//! 2. Split on whitespace.
//! 3. Strip every character outside `[a-z0-9]` from each token.
//! 4. Drop empty tokens and tokens in [`STOPWORDS`].
//! 5. Tokens longer than three characters lose one trailing `s`.
//!
//! Rule 5 is a plural heuristic, not a stemmer: `"tips"` becomes `"tip"`,
//! `"bus"` is left alone, and `"address"` becomes `"addres"`.
//!
//! [`word_terms`] applies the same rules while keeping one slot per
//! whitespace-separated word, so distances can be measured in words of the
//! original text.

/// Words that never become index terms.
pub const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Returns `true` if `word` is a stopword.
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Normalize free text into a sequence of index terms.
///
/// Duplicates are preserved so callers can count term frequency.
///
/// ```
/// use forum_search::tokenize::tokenize;
///
/// assert_eq!(tokenize("The NestJS performance tips!"), vec!["nestj", "performance", "tip"]);
/// assert!(tokenize("... the, of").is_empty());
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().filter_map(normalize_word).collect()
}

/// The term of every whitespace-separated word of `text`, by word position.
/// Stopwords and words with no ASCII letters or digits are `None`.
///
/// ```
/// use forum_search::tokenize::word_terms;
///
/// let words = word_terms("Winter in the ranges");
/// assert_eq!(words, vec![Some("winter".to_string()), None, None, Some("range".to_string())]);
/// ```
pub fn word_terms(text: &str) -> Vec<Option<String>> {
    text.split_whitespace().map(normalize_word).collect()
}

/// Byte offset and text of every whitespace-separated word.
pub fn word_spans(text: &str) -> Vec<(usize, &str)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, &text[s..i]));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, &text[s..]));
    }
    spans
}

/// Tokenize and keep only the first occurrence of each term, in order.
pub fn unique_terms(text: &str) -> Vec<String> {
    let mut terms = tokenize(text);
    let mut seen = std::collections::HashSet::new();
    terms.retain(|t| seen.insert(t.clone()));
    terms
}

/// The term a single raw word normalizes to, if any.
pub fn normalize_word(raw: &str) -> Option<String> {
    let mut word: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect();
    if word.is_empty() || is_stopword(&word) {
        return None;
    }
    if word.len() > 3 && word.ends_with('s') {
        word.pop();
    }
    Some(word)
}
