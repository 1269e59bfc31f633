//! The search service: one value owning the store, the current index
//! generation, the answer model and the configuration.
//!
//! Both external contracts are served from here; the HTTP server and the
//! CLI are thin bindings over [`SearchService`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::answer::{self, AiAnswer, ChatTurn};
use crate::augment::{augment, Augmented};
use crate::config::Config;
use crate::db;
use crate::error::SearchError;
use crate::generation::IndexHandle;
use crate::llm::{create_model, AnswerModel};
use crate::models::DocumentKind;
use crate::search::{SearchQuery, SearchResponse};
use crate::sqlite_store::SqliteForumStore;
use crate::store::ForumStore;

/// AI-augmented search request.
///
/// Filters arrive as strings from the caller and are parsed here.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSearchRequest {
    pub query: String,
    #[serde(default)]
    pub conversation_history: Vec<ChatTurn>,
    #[serde(default)]
    pub business_unit_id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub generation: u64,
    pub documents: usize,
    pub terms: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub generation: u64,
    pub built_at: DateTime<Utc>,
    pub documents: usize,
    pub posts: usize,
    pub replies: usize,
    pub terms: usize,
}

pub struct SearchService {
    config: Config,
    store: Arc<dyn ForumStore>,
    model: Arc<dyn AnswerModel>,
    index: IndexHandle,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl SearchService {
    /// Open the configured SQLite database and build the first generation.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let pool = db::connect(&config).await?;
        let store: Arc<dyn ForumStore> = Arc::new(SqliteForumStore::new(pool));
        let model = create_model(&config.llm)?;
        Self::new(config, store, model).await
    }

    /// Build the first generation from `store`.
    pub async fn new(
        config: Config,
        store: Arc<dyn ForumStore>,
        model: Arc<dyn AnswerModel>,
    ) -> anyhow::Result<Self> {
        let snapshot = store.load_snapshot().await?;
        let index = IndexHandle::new(&snapshot);
        Ok(Self {
            config,
            store,
            model,
            index,
            refresh_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Ranked search against the current generation.
    pub fn search(&self, query: &SearchQuery) -> SearchResponse {
        self.index
            .current()
            .search(query, &self.config.ranking, Utc::now())
    }

    /// Answer `request` for `user_id`, citing only documents in threads the
    /// user can read.
    pub async fn ai_search(
        &self,
        user_id: i64,
        request: &AiSearchRequest,
    ) -> Result<AiAnswer, SearchError> {
        self.model.ensure_available()?;

        let query = SearchQuery {
            business_unit_id: parse_filter("businessUnitId", request.business_unit_id.as_deref())?,
            thread_id: parse_filter("threadId", request.thread_id.as_deref())?,
            ..SearchQuery::new(request.query.trim())
        };

        let scope = self.store.access_scope(user_id).await?;
        let generation = self.index.current();

        let augmented = augment(
            &generation,
            self.store.as_ref(),
            &query,
            &scope,
            &self.config.ranking,
            &self.config.retrieval,
            Utc::now(),
        )
        .await?;

        match augmented {
            Augmented::NoAccessibleResults => {
                tracing::info!(user_id, scope = scope.len(), "no accessible results");
                Ok(answer::no_accessible_results(generation.number()))
            }
            Augmented::Shortlist(shortlist) => {
                answer::synthesize(
                    self.model.as_ref(),
                    &query.query,
                    &request.conversation_history,
                    &shortlist,
                    generation.number(),
                )
                .await
            }
        }
    }

    /// Reload the snapshot and publish a new generation.
    ///
    /// Refreshes are serialized; searches keep running against the previous
    /// generation until the new one is published.
    pub async fn refresh(&self) -> anyhow::Result<RefreshReport> {
        let _guard = self.refresh_lock.lock().await;
        let snapshot = self.store.load_snapshot().await?;
        let generation = self.index.rebuild(&snapshot);
        Ok(RefreshReport {
            generation: generation.number(),
            documents: generation.corpus().len(),
            terms: generation.index().term_count(),
        })
    }

    pub fn stats(&self) -> IndexStats {
        let generation = self.index.current();
        let documents = generation.corpus().documents();
        let posts = documents
            .iter()
            .filter(|d| d.kind() == DocumentKind::Post)
            .count();
        IndexStats {
            generation: generation.number(),
            built_at: generation.built_at(),
            documents: documents.len(),
            posts,
            replies: documents.len() - posts,
            terms: generation.index().term_count(),
        }
    }
}

/// Parse an optional numeric filter. Blank strings count as absent.
fn parse_filter(name: &str, raw: Option<&str>) -> Result<Option<i64>, SearchError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|_| {
            SearchError::InvalidRequest(format!("{} must be an integer, got '{}'", name, value))
        }),
    }
}
