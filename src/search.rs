//! Ranking query engine.
//!
//! Serves every ranked search against one [`Corpus`] / [`InvertedIndex`]
//! pair. The engine is a pure function of its inputs: no I/O, no shared
//! mutable state, so any number of callers can search the same generation
//! concurrently.
//!
//! # Algorithm
//!
//! 1. `match = exact` scans the corpus for the literal query, untrimmed
//!    and case-insensitive, and never touches the index.
//! 2. Otherwise the query is tokenized; no terms means no results. The
//!    posting sets of all terms are unioned into a candidate set.
//! 3. Candidates failing the type / business unit / thread filters are
//!    dropped; `match = and` also drops documents missing any term.
//! 4. Survivors are scored (see [`score_document`]).
//! 5. Sorted by relevance, recency (`new`) or popularity (`top`); ties
//!    always fall back to creation time and then id, so pages are stable.
//! 6. Paginated; `total` counts survivors before pagination.
//! 7. Decorated with thread / business unit names and a snippet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::config::RankingConfig;
use crate::corpus::Corpus;
use crate::index::InvertedIndex;
use crate::models::{DocumentKind, SearchDocument};
use crate::snippet::{highlight_literal, highlight_terms};
use crate::tokenize::{unique_terms, word_terms};

/// How query terms must match a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Any term.
    #[default]
    Or,
    /// Every term.
    And,
    /// The raw query as a literal substring.
    Exact,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Relevance,
    New,
    Top,
}

impl std::str::FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "or" => Ok(MatchMode::Or),
            "and" => Ok(MatchMode::And),
            "exact" => Ok(MatchMode::Exact),
            other => Err(format!("unknown match mode: '{}'. Use or, and, or exact.", other)),
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevance" => Ok(SortOrder::Relevance),
            "new" => Ok(SortOrder::New),
            "top" => Ok(SortOrder::Top),
            other => Err(format!("unknown sort: '{}'. Use relevance, new, or top.", other)),
        }
    }
}

/// A ranked search request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub query: String,
    #[serde(default, rename = "type")]
    pub kind: Option<DocumentKind>,
    #[serde(default, rename = "match")]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub business_unit_id: Option<i64>,
    #[serde(default)]
    pub thread_id: Option<i64>,
    #[serde(default)]
    pub sort: SortOrder,
    /// 1-based. Defaults to 1.
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
    /// Attach a [`ScoreBreakdown`] to every result.
    #[serde(default)]
    pub explain: bool,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    fn accepts(&self, doc: &SearchDocument) -> bool {
        if self.kind.is_some_and(|k| k != doc.kind()) {
            return false;
        }
        if self.business_unit_id.is_some() && self.business_unit_id != doc.business_unit_id {
            return false;
        }
        if self.thread_id.is_some() && self.thread_id != doc.thread_id {
            return false;
        }
        true
    }
}

/// Per-signal contributions to a relevance score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub term_frequency: f64,
    pub phrase: f64,
    pub proximity: f64,
    pub popularity: f64,
    pub recency: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.term_frequency + self.phrase + self.proximity + self.popularity + self.recency
    }
}

/// One row of a [`SearchResponse`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    pub business_unit_id: Option<i64>,
    pub thread_id: Option<i64>,
    pub thread_name: Option<String>,
    pub business_unit_name: Option<String>,
    pub post_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub popularity_score: u32,
    pub relevance_score: f64,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreBreakdown>,
    /// Corpus position in the generation that produced this result.
    #[serde(skip)]
    pub position: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub results: Vec<RankedResult>,
}

struct Scored {
    position: usize,
    breakdown: ScoreBreakdown,
    score: f64,
}

/// Run `query` against one corpus/index pair.
///
/// `now` anchors the recency bonus; callers pass `Utc::now()` outside tests.
pub fn search(
    corpus: &Corpus,
    index: &InvertedIndex,
    query: &SearchQuery,
    ranking: &RankingConfig,
    now: DateTime<Utc>,
) -> SearchResponse {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(ranking.default_limit)
        .clamp(1, ranking.max_limit.max(1));
    let raw = query.query.trim();
    let terms = unique_terms(raw);

    let empty = SearchResponse {
        total: 0,
        page,
        limit,
        results: Vec::new(),
    };

    let score = |position: usize, doc: &SearchDocument| {
        let breakdown = score_document(doc, raw, &terms, ranking, now);
        Scored {
            position,
            score: breakdown.total(),
            breakdown,
        }
    };

    let mut scored: Vec<Scored> = match query.match_mode {
        MatchMode::Exact => {
            if query.query.is_empty() {
                return empty;
            }
            let needle = query.query.to_lowercase();
            corpus
                .documents()
                .iter()
                .enumerate()
                .filter(|(_, d)| query.accepts(d) && d.text.to_lowercase().contains(&needle))
                .map(|(p, d)| score(p, d))
                .collect()
        }
        MatchMode::Or | MatchMode::And => {
            if terms.is_empty() {
                return empty;
            }
            let candidates = index.union(terms.iter().map(String::as_str));
            candidates
                .into_iter()
                .filter_map(|p| corpus.get(p).map(|d| (p, d)))
                .filter(|(_, d)| query.accepts(d))
                .filter(|(p, _)| {
                    query.match_mode != MatchMode::And
                        || terms.iter().all(|t| index.contains(t, *p))
                })
                .map(|(p, d)| score(p, d))
                .collect()
        }
    };

    sort_scored(&mut scored, corpus, query.sort);

    let total = scored.len();
    tracing::debug!(
        query = raw,
        mode = ?query.match_mode,
        terms = terms.len(),
        total,
        "search"
    );

    let snippet = |doc: &SearchDocument| match query.match_mode {
        MatchMode::Exact => highlight_literal(&doc.text, &query.query, ranking.snippet_length),
        _ => highlight_terms(&doc.text, &terms, ranking.snippet_length),
    };

    let results = scored
        .into_iter()
        .skip((page - 1).saturating_mul(limit))
        .take(limit)
        .filter_map(|s| {
            let doc = corpus.get(s.position)?;
            let names = corpus.names();
            Some(RankedResult {
                id: doc.id.clone(),
                kind: doc.kind(),
                business_unit_id: doc.business_unit_id,
                thread_id: doc.thread_id,
                thread_name: names.thread_name(doc.thread_id).map(str::to_string),
                business_unit_name: names
                    .business_unit_name(doc.business_unit_id)
                    .map(str::to_string),
                post_id: doc.post_id(),
                title: doc.title().map(str::to_string),
                created_at: doc.created_at,
                popularity_score: doc.popularity_score,
                relevance_score: s.score,
                snippet: snippet(doc),
                explain: query.explain.then_some(s.breakdown),
                position: s.position,
            })
        })
        .collect();

    SearchResponse {
        total,
        page,
        limit,
        results,
    }
}

fn sort_scored(scored: &mut [Scored], corpus: &Corpus, sort: SortOrder) {
    scored.sort_by(|a, b| {
        let (da, db) = match (corpus.get(a.position), corpus.get(b.position)) {
            (Some(da), Some(db)) => (da, db),
            _ => return a.position.cmp(&b.position),
        };
        let by_score = || b.score.total_cmp(&a.score);
        let by_new = || db.created_at.cmp(&da.created_at);
        let primary = match sort {
            SortOrder::Relevance => by_score().then_with(by_new),
            SortOrder::New => by_new().then_with(by_score),
            SortOrder::Top => db
                .popularity_score
                .cmp(&da.popularity_score)
                .then_with(by_score)
                .then_with(by_new),
        };
        match primary {
            Ordering::Equal => da.id.cmp(&db.id),
            other => other,
        }
    });
}

/// Composite relevance of `doc` for the distinct query `terms`.
///
/// - term frequency: title hits × `title_weight` + body hits × `content_weight`
/// - phrase: `phrase_boost` if `raw_query` occurs verbatim (case-insensitive)
/// - proximity: `proximity_boost / d`, `d` the smallest distance in words of
///   the text between two different query terms; zero unless two distinct
///   terms co-occur
/// - popularity: `popularity_score × upvote_boost`
/// - recency: `max(0, base_recency − age_days × recency_decay_per_day)`
pub fn score_document(
    doc: &SearchDocument,
    raw_query: &str,
    terms: &[String],
    ranking: &RankingConfig,
    now: DateTime<Utc>,
) -> ScoreBreakdown {
    let words = word_terms(&doc.text);
    let text_tokens: Vec<&String> = words.iter().flatten().collect();
    let title_tokens: Vec<String> = doc
        .title()
        .map(|t| word_terms(t).into_iter().flatten().collect())
        .unwrap_or_default();

    let mut term_frequency = 0.0;
    for term in terms {
        let total = text_tokens.iter().filter(|t| **t == term).count();
        let in_title = title_tokens.iter().filter(|t| *t == term).count();
        let in_body = total.saturating_sub(in_title);
        term_frequency +=
            in_title as f64 * ranking.title_weight + in_body as f64 * ranking.content_weight;
    }

    let phrase = if !raw_query.is_empty()
        && doc.text.to_lowercase().contains(&raw_query.to_lowercase())
    {
        ranking.phrase_boost
    } else {
        0.0
    };

    let proximity = min_term_distance(&words, terms)
        .map(|d| ranking.proximity_boost / d as f64)
        .unwrap_or(0.0);

    let popularity = doc.popularity_score as f64 * ranking.upvote_boost;

    let age_days = ((now - doc.created_at).num_seconds() as f64 / 86_400.0).max(0.0);
    let recency = (ranking.base_recency - age_days * ranking.recency_decay_per_day).max(0.0);

    ScoreBreakdown {
        term_frequency,
        phrase,
        proximity,
        popularity,
        recency,
    }
}

/// Smallest distance between word positions of two *different* terms.
///
/// `words` holds one slot per word of the text (see [`word_terms`]), so
/// stopwords between two terms still count toward the distance.
pub fn min_term_distance(words: &[Option<String>], terms: &[String]) -> Option<usize> {
    if terms.len() < 2 {
        return None;
    }
    let mut last_seen: Vec<Option<usize>> = vec![None; terms.len()];
    let mut best: Option<usize> = None;
    for (i, word) in words.iter().enumerate() {
        let Some(k) = word
            .as_ref()
            .and_then(|w| terms.iter().position(|t| t == w))
        else {
            continue;
        };
        for (j, seen) in last_seen.iter().enumerate() {
            if let (true, Some(p)) = (j != k, seen) {
                let d = i - p;
                best = Some(best.map_or(d, |b| b.min(d)));
            }
        }
        last_seen[k] = Some(i);
    }
    best
}
