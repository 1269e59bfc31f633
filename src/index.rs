//! Inverted index over a [`Corpus`].
//!
//! Maps each normalized term to the set of corpus positions whose text
//! contains it. Positions are only meaningful for the corpus the index was
//! built from; a rebuilt corpus gets a rebuilt index.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::corpus::Corpus;
use crate::tokenize::tokenize;

/// Sorted set of corpus positions.
pub type PostingSet = BTreeSet<usize>;

#[derive(Debug, Clone, Default)]
pub struct InvertedIndex {
    postings: HashMap<String, PostingSet>,
}

impl InvertedIndex {
    /// Index every document in `corpus`.
    ///
    /// Each document contributes its position at most once per term, however
    /// often the term repeats in its text.
    pub fn build(corpus: &Corpus) -> Self {
        let mut postings: HashMap<String, PostingSet> = HashMap::new();
        for (position, doc) in corpus.documents().iter().enumerate() {
            let distinct: HashSet<String> = tokenize(&doc.text).into_iter().collect();
            for term in distinct {
                postings.entry(term).or_default().insert(position);
            }
        }
        Self { postings }
    }

    /// Positions of documents containing `term`, if any.
    pub fn postings(&self, term: &str) -> Option<&PostingSet> {
        self.postings.get(term)
    }

    /// Union of the posting sets of `terms`.
    pub fn union<'a, I>(&self, terms: I) -> PostingSet
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut candidates = PostingSet::new();
        for term in terms {
            if let Some(set) = self.postings(term) {
                candidates.extend(set.iter().copied());
            }
        }
        candidates
    }

    /// Whether the document at `position` contains `term`.
    pub fn contains(&self, term: &str, position: usize) -> bool {
        self.postings(term).is_some_and(|set| set.contains(&position))
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.postings.keys().map(String::as_str)
    }
}
