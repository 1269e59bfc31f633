//! Access-scoped retrieval augmentation.
//!
//! Runs the ranking engine with a capped limit, keeps only documents in
//! threads the caller can read, bounds the shortlist, and fetches full
//! record detail for the shortlist alone.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::{RankingConfig, RetrievalConfig};
use crate::error::SearchError;
use crate::generation::Generation;
use crate::models::{AccessScope, DocumentRef};
use crate::search::{RankedResult, SearchQuery};
use crate::store::{ForumStore, RecordDetail};

/// A shortlisted document with its full record detail.
#[derive(Debug, Clone)]
pub struct ContextDocument {
    pub result: RankedResult,
    pub source: DocumentRef,
    pub url: String,
    pub detail: RecordDetail,
}

impl ContextDocument {
    pub fn reply_id(&self) -> Option<i64> {
        match self.source {
            DocumentRef::Reply(id) => Some(id),
            DocumentRef::Post(_) => None,
        }
    }
}

#[derive(Debug)]
pub enum Augmented {
    /// Nothing the caller may read matched.
    NoAccessibleResults,
    Shortlist(Vec<ContextDocument>),
}

pub async fn augment(
    generation: &Generation,
    store: &dyn ForumStore,
    query: &SearchQuery,
    scope: &AccessScope,
    ranking: &RankingConfig,
    retrieval: &RetrievalConfig,
    now: DateTime<Utc>,
) -> Result<Augmented, SearchError> {
    if scope.is_empty() {
        return Ok(Augmented::NoAccessibleResults);
    }

    let capped = SearchQuery {
        page: Some(1),
        limit: Some(retrieval.candidate_limit),
        ..query.clone()
    };
    let ranking = RankingConfig {
        max_limit: ranking.max_limit.max(retrieval.candidate_limit),
        ..ranking.clone()
    };
    let response = generation.search(&capped, &ranking, now);
    let candidates = response.results.len();

    let shortlist: Vec<(RankedResult, DocumentRef, String)> = response
        .results
        .into_iter()
        .filter(|r| scope.permits(r.thread_id))
        .take(retrieval.max_context_documents)
        .filter_map(|r| {
            let doc = generation.corpus().get(r.position)?;
            let (source, url) = (doc.source_ref(), doc.url());
            Some((r, source, url))
        })
        .collect();

    tracing::debug!(
        candidates,
        accessible = shortlist.len(),
        scope = scope.len(),
        "augmentation shortlist"
    );

    if shortlist.is_empty() {
        return Ok(Augmented::NoAccessibleResults);
    }

    let refs: Vec<DocumentRef> = shortlist.iter().map(|(_, source, _)| *source).collect();
    let secs = retrieval.enrichment_timeout_secs;
    let mut details = tokio::time::timeout(Duration::from_secs(secs), store.record_details(&refs))
        .await
        .map_err(|_| SearchError::EnrichmentTimeout(secs))??;

    let documents: Vec<ContextDocument> = shortlist
        .into_iter()
        .filter_map(|(result, source, url)| match details.remove(&source) {
            Some(detail) => Some(ContextDocument {
                result,
                source,
                url,
                detail,
            }),
            None => {
                tracing::debug!(id = %result.id, "shortlisted record no longer exists");
                None
            }
        })
        .collect();

    if documents.is_empty() {
        return Ok(Augmented::NoAccessibleResults);
    }
    Ok(Augmented::Shortlist(documents))
}
