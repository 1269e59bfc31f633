//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/forum.sqlite"
//!
//! [ranking]
//! title_weight = 3.0
//! phrase_boost = 5.0
//!
//! [retrieval]
//! max_context_documents = 8
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```
//!
//! Every ranking constant is tunable here; none are hard-coded in the engine.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub ranking: RankingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Relevance weights and result-shaping limits for the ranking engine.
#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    /// Per-occurrence weight of a query term in a post title.
    #[serde(default = "default_title_weight")]
    pub title_weight: f64,
    /// Per-occurrence weight of a query term in body text.
    #[serde(default = "default_content_weight")]
    pub content_weight: f64,
    /// Added when the raw query appears verbatim in the text.
    #[serde(default = "default_phrase_boost")]
    pub phrase_boost: f64,
    /// Scaled by `1 / distance` between the closest pair of distinct query terms.
    #[serde(default = "default_proximity_boost")]
    pub proximity_boost: f64,
    /// Multiplier on the document's popularity score.
    #[serde(default = "default_upvote_boost")]
    pub upvote_boost: f64,
    /// Recency bonus of a brand-new document.
    #[serde(default = "default_base_recency")]
    pub base_recency: f64,
    /// Recency bonus lost per day of age.
    #[serde(default = "default_recency_decay")]
    pub recency_decay_per_day: f64,
    #[serde(default = "default_snippet_length")]
    pub snippet_length: usize,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            title_weight: default_title_weight(),
            content_weight: default_content_weight(),
            phrase_boost: default_phrase_boost(),
            proximity_boost: default_proximity_boost(),
            upvote_boost: default_upvote_boost(),
            base_recency: default_base_recency(),
            recency_decay_per_day: default_recency_decay(),
            snippet_length: default_snippet_length(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

fn default_title_weight() -> f64 {
    3.0
}
fn default_content_weight() -> f64 {
    1.0
}
fn default_phrase_boost() -> f64 {
    5.0
}
fn default_proximity_boost() -> f64 {
    2.0
}
fn default_upvote_boost() -> f64 {
    0.1
}
fn default_base_recency() -> f64 {
    2.0
}
fn default_recency_decay() -> f64 {
    0.05
}
fn default_snippet_length() -> usize {
    160
}
fn default_limit() -> usize {
    20
}
fn default_max_limit() -> usize {
    100
}

/// Bounds for the access-scoped context handed to the language model.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Result limit for the ranking pass that feeds the augmenter.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    /// Maximum documents in the shortlist after access filtering.
    #[serde(default = "default_max_context")]
    pub max_context_documents: usize,
    #[serde(default = "default_enrichment_timeout")]
    pub enrichment_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_limit: default_candidate_limit(),
            max_context_documents: default_max_context(),
            enrichment_timeout_secs: default_enrichment_timeout(),
        }
    }
}

fn default_candidate_limit() -> usize {
    50
}
fn default_max_context() -> usize {
    8
}
fn default_enrichment_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            temperature: default_temperature(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    1
}
fn default_temperature() -> f64 {
    0.2
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Header carrying the user id set by the upstream authentication layer.
    #[serde(default = "default_user_header")]
    pub user_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            user_header: default_user_header(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}
fn default_user_header() -> String {
    "x-user-id".to_string()
}

impl Config {
    /// A configuration with every default and the given database path.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig { path: path.into() },
            ranking: RankingConfig::default(),
            retrieval: RetrievalConfig::default(),
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Check cross-field constraints. Called by [`load_config`].
    pub fn validate(&self) -> Result<()> {
        let r = &self.ranking;
        let weights = [
            ("title_weight", r.title_weight),
            ("content_weight", r.content_weight),
            ("phrase_boost", r.phrase_boost),
            ("proximity_boost", r.proximity_boost),
            ("upvote_boost", r.upvote_boost),
            ("base_recency", r.base_recency),
            ("recency_decay_per_day", r.recency_decay_per_day),
        ];
        for (name, value) in weights {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("ranking.{} must be a finite, non-negative number", name);
            }
        }
        if r.snippet_length == 0 {
            anyhow::bail!("ranking.snippet_length must be >= 1");
        }
        if r.default_limit == 0 || r.max_limit == 0 {
            anyhow::bail!("ranking.default_limit and ranking.max_limit must be >= 1");
        }
        if r.default_limit > r.max_limit {
            anyhow::bail!("ranking.default_limit must be <= ranking.max_limit");
        }

        let q = &self.retrieval;
        if q.candidate_limit == 0 || q.max_context_documents == 0 {
            anyhow::bail!(
                "retrieval.candidate_limit and retrieval.max_context_documents must be >= 1"
            );
        }
        if q.max_context_documents > q.candidate_limit {
            anyhow::bail!("retrieval.max_context_documents must be <= retrieval.candidate_limit");
        }

        match self.llm.provider.as_str() {
            "disabled" => {}
            "openai" => {
                if self.llm.model.is_none() {
                    anyhow::bail!("llm.model must be specified when provider is 'openai'");
                }
            }
            other => anyhow::bail!(
                "Unknown llm provider: '{}'. Must be disabled or openai.",
                other
            ),
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse("[db]\npath = \"forum.sqlite\"\n").unwrap();
        assert_eq!(config.ranking.title_weight, 3.0);
        assert_eq!(config.ranking.default_limit, 20);
        assert_eq!(config.retrieval.max_context_documents, 8);
        assert_eq!(config.llm.provider, "disabled");
        assert_eq!(config.server.user_header, "x-user-id");
    }

    #[test]
    fn test_overrides_ranking_weights() {
        let config = parse(
            "[db]\npath = \"f.sqlite\"\n[ranking]\nphrase_boost = 0.0\nupvote_boost = 1.5\n",
        )
        .unwrap();
        assert_eq!(config.ranking.phrase_boost, 0.0);
        assert_eq!(config.ranking.upvote_boost, 1.5);
        assert_eq!(config.ranking.content_weight, 1.0);
    }

    #[test]
    fn test_rejects_negative_weight() {
        let err = parse("[db]\npath = \"f\"\n[ranking]\ntitle_weight = -1.0\n").unwrap_err();
        assert!(err.to_string().contains("title_weight"));
    }

    #[test]
    fn test_rejects_context_larger_than_candidates() {
        let err = parse(
            "[db]\npath = \"f\"\n[retrieval]\ncandidate_limit = 4\nmax_context_documents = 5\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_context_documents"));
    }

    #[test]
    fn test_openai_requires_model() {
        assert!(parse("[db]\npath = \"f\"\n[llm]\nprovider = \"openai\"\n").is_err());
        assert!(parse(
            "[db]\npath = \"f\"\n[llm]\nprovider = \"openai\"\nmodel = \"gpt-4o-mini\"\n"
        )
        .is_ok());
    }

    #[test]
    fn test_rejects_unknown_provider() {
        let err = parse("[db]\npath = \"f\"\n[llm]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown llm provider"));
    }

    #[test]
    fn test_load_config_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("fsearch.toml");
        std::fs::write(&path, "[db]\npath = \"x.sqlite\"\n[server]\nbind = \"0.0.0.0:9\"\n")
            .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9");
        assert!(load_config(&tmp.path().join("missing.toml")).is_err());
    }
}
