//! Language-model capability interface.
//!
//! The rest of the engine only sees [`AnswerModel`]: send messages plus a
//! JSON schema, get back a JSON value that the provider was asked to shape
//! accordingly. Validating that value is the caller's job.
//!
//! - **[`DisabledModel`]**: always unavailable; used when `llm.provider = "disabled"`.
//! - **[`OpenAiModel`]**: OpenAI-compatible `chat/completions` with
//!   `response_format = json_schema` (strict), a per-attempt timeout and bounded retry.
//!
//! # Retry Strategy
//!
//! - HTTP 429 and 5xx → retry
//! - other HTTP 4xx → fail immediately
//! - network errors and timeouts → retry
//! - unparseable content → fail immediately
//! - backoff: 500ms, 1s, 2s, ... (capped at 2^5 × base)

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::LlmConfig;
use crate::error::SearchError;

/// One message of a chat-completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// A schema-constrained generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub schema_name: String,
    pub schema: Value,
}

#[async_trait]
pub trait AnswerModel: Send + Sync {
    /// Model identifier reported in answer metadata.
    fn model_name(&self) -> &str;

    /// Fails with [`SearchError::ModelUnavailable`] if calls cannot succeed
    /// for configuration reasons.
    fn ensure_available(&self) -> Result<(), SearchError>;

    /// Run the request and return the structured output.
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, SearchError>;
}

// ============ Disabled ============

pub struct DisabledModel;

#[async_trait]
impl AnswerModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn ensure_available(&self) -> Result<(), SearchError> {
        Err(SearchError::ModelUnavailable(
            "llm.provider is \"disabled\"".to_string(),
        ))
    }

    async fn generate(&self, _request: &GenerationRequest) -> Result<Value, SearchError> {
        self.ensure_available()?;
        Ok(Value::Null)
    }
}

// ============ OpenAI-compatible ============

pub struct OpenAiModel {
    model: String,
    endpoint: String,
    api_key: Option<String>,
    api_key_env: String,
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
    temperature: f64,
    backoff: Duration,
}

enum AttemptError {
    Transient(SearchError),
    Fatal(SearchError),
}

impl OpenAiModel {
    /// Build a client for `config`. A missing `api_key` is not an error here;
    /// it surfaces as [`SearchError::ModelUnavailable`] at call time.
    pub fn new(config: &LlmConfig, api_key: Option<String>) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.model required for OpenAI provider"))?;
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            model,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.filter(|k| !k.is_empty()),
            api_key_env: config.api_key_env.clone(),
            client,
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            temperature: config.temperature,
            backoff: Duration::from_millis(500),
        })
    }

    /// Override the base retry delay.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": request.messages,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "strict": true,
                    "schema": request.schema,
                }
            }
        })
    }

    async fn attempt(&self, api_key: &str, body: &Value) -> Result<Value, AttemptError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(SearchError::ModelRequest(e.to_string())))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = SearchError::ModelRequest(format!("HTTP {}: {}", status, text));
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                AttemptError::Transient(err)
            } else {
                AttemptError::Fatal(err)
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| AttemptError::Transient(SearchError::ModelRequest(e.to_string())))?;
        parse_completion(&json).map_err(AttemptError::Fatal)
    }
}

/// Extract and decode `choices[0].message.content`.
fn parse_completion(json: &Value) -> Result<Value, SearchError> {
    let message = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| SearchError::MalformedModelOutput("missing choices[0].message".into()))?;

    if let Some(refusal) = message.get("refusal").and_then(Value::as_str) {
        return Err(SearchError::MalformedModelOutput(format!(
            "model refused: {}",
            refusal
        )));
    }

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| SearchError::MalformedModelOutput("missing message content".into()))?;

    serde_json::from_str(content)
        .map_err(|e| SearchError::MalformedModelOutput(format!("content is not JSON: {}", e)))
}

#[async_trait]
impl AnswerModel for OpenAiModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn ensure_available(&self) -> Result<(), SearchError> {
        match self.api_key {
            Some(_) => Ok(()),
            None => Err(SearchError::ModelUnavailable(format!(
                "{} environment variable not set",
                self.api_key_env
            ))),
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Value, SearchError> {
        self.ensure_available()?;
        let api_key = self.api_key.as_deref().unwrap_or_default();
        let body = self.request_body(request);
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff * (1u32 << (attempt - 1).min(5));
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_err.as_ref().map(ToString::to_string).unwrap_or_default(),
                    "retrying model call"
                );
                tokio::time::sleep(delay).await;
            }

            match tokio::time::timeout(self.timeout, self.attempt(api_key, &body)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(AttemptError::Fatal(err))) => return Err(err),
                Ok(Err(AttemptError::Transient(err))) => last_err = Some(err),
                Err(_) => last_err = Some(SearchError::ModelTimeout(self.timeout)),
            }
        }

        Err(last_err
            .unwrap_or_else(|| SearchError::ModelRequest("model call failed after retries".into())))
    }
}

/// Create the [`AnswerModel`] selected by `config`.
///
/// | Config Value | Model |
/// |-------------|-------|
/// | `"disabled"` | [`DisabledModel`] |
/// | `"openai"` | [`OpenAiModel`], key read from `api_key_env` |
pub fn create_model(config: &LlmConfig) -> anyhow::Result<Arc<dyn AnswerModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledModel)),
        "openai" => {
            let key = std::env::var(&config.api_key_env).ok();
            Ok(Arc::new(OpenAiModel::new(config, key)?))
        }
        other => bail!("Unknown llm provider: {}", other),
    }
}
