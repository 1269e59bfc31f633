//! Index generations and the construct-then-publish swap.
//!
//! A [`Generation`] pairs one corpus with the index built from it and never
//! changes afterwards. [`IndexHandle`] holds the current generation; readers
//! take an `Arc` to it and search without holding any lock, and a refresh
//! builds a complete new generation before swapping it in.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::config::RankingConfig;
use crate::corpus::{build_corpus, Corpus};
use crate::index::InvertedIndex;
use crate::models::ForumSnapshot;
use crate::search::{search, SearchQuery, SearchResponse};

#[derive(Debug)]
pub struct Generation {
    number: u64,
    built_at: DateTime<Utc>,
    corpus: Corpus,
    index: InvertedIndex,
}

impl Generation {
    pub fn build(number: u64, snapshot: &ForumSnapshot) -> Self {
        let started = Instant::now();
        let corpus = build_corpus(snapshot);
        let index = InvertedIndex::build(&corpus);
        tracing::info!(
            generation = number,
            documents = corpus.len(),
            terms = index.term_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "built index generation"
        );
        Self {
            number,
            built_at: Utc::now(),
            corpus,
            index,
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    pub fn search(
        &self,
        query: &SearchQuery,
        ranking: &RankingConfig,
        now: DateTime<Utc>,
    ) -> SearchResponse {
        search(&self.corpus, &self.index, query, ranking, now)
    }
}

/// Shared pointer to the current [`Generation`].
#[derive(Debug)]
pub struct IndexHandle {
    current: RwLock<Arc<Generation>>,
    next_number: AtomicU64,
}

impl IndexHandle {
    /// Build generation 1 from `snapshot`.
    pub fn new(snapshot: &ForumSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(Generation::build(1, snapshot))),
            next_number: AtomicU64::new(2),
        }
    }

    /// The generation to search. Stays valid after later publishes.
    pub fn current(&self) -> Arc<Generation> {
        self.current.read().clone()
    }

    /// Build a new generation from `snapshot` and publish it.
    ///
    /// Construction happens before the write lock is taken, so readers are
    /// only ever blocked for the pointer swap. A generation never replaces a
    /// newer one, even if two rebuilds finish out of order.
    pub fn rebuild(&self, snapshot: &ForumSnapshot) -> Arc<Generation> {
        let number = self.next_number.fetch_add(1, Ordering::SeqCst);
        let generation = Arc::new(Generation::build(number, snapshot));
        let mut current = self.current.write();
        if current.number() < number {
            *current = generation.clone();
            tracing::info!(generation = number, "published index generation");
        }
        current.clone()
    }
}
