//! Answer synthesis over an access-filtered shortlist.
//!
//! The model sees every shortlisted document under its document id
//! (`post_42`, `reply_17`) and must reply in a fixed JSON shape. Cited ids
//! are then resolved against the shortlist, so source metadata in an
//! [`AiAnswer`] always comes from the index and the store, never from the
//! model's text.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::augment::ContextDocument;
use crate::error::SearchError;
use crate::llm::{AnswerModel, ChatMessage, GenerationRequest};
use crate::models::DocumentKind;

/// Name under which the output schema is registered with the provider.
pub const SCHEMA_NAME: &str = "forum_answer";

/// Bodies longer than this are cut before prompting.
pub const MAX_BODY_CHARS: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// A prior turn of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// The model's reply, exactly as the output schema requires.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAnswer {
    pub answer: String,
    pub relevant_source_ids: Vec<String>,
    pub suggested_followups: Vec<String>,
}

/// A cited document, fully described.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    pub post_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub url: String,
    pub snippet: String,
    pub author_name: Option<String>,
    pub thread_id: Option<i64>,
    pub thread_name: Option<String>,
    pub business_unit_id: Option<i64>,
    pub business_unit_name: Option<String>,
    pub popularity_score: u32,
    pub created_at: DateTime<Utc>,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerMetadata {
    pub model: String,
    pub generated_at: DateTime<Utc>,
    pub source_count: usize,
    pub generation: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAnswer {
    pub answer: String,
    pub sources: Vec<AiSource>,
    pub suggested_followups: Vec<String>,
    pub metadata: AnswerMetadata,
}

/// JSON schema of [`ModelAnswer`], in the strict subset providers accept.
pub fn output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "answer": { "type": "string" },
            "relevantSourceIds": { "type": "array", "items": { "type": "string" } },
            "suggestedFollowups": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["answer", "relevantSourceIds", "suggestedFollowups"],
        "additionalProperties": false
    })
}

/// Instruction block: task, citation rules, then every shortlisted document.
pub fn system_prompt(shortlist: &[ContextDocument]) -> String {
    let mut prompt = String::from(
        "You answer questions about an internal discussion forum using only the documents below.\n\
         If the documents do not contain the answer, say so plainly.\n\n\
         Citation rules:\n\
         - Cite a post inline as a markdown link to /posts/{postId}.\n\
         - Cite a reply inline as a markdown link to /posts/{postId}#reply-{replyId}.\n\
         - List the id (for example post_42) of every document you cite in relevantSourceIds.\n\
         - Never cite a document that is not listed below.\n\
         - Offer two or three short follow-up questions in suggestedFollowups.\n\n\
         Documents:\n",
    );

    for doc in shortlist {
        let r = &doc.result;
        prompt.push_str(&format!("\n[{}] {}", r.id, r.kind));
        if let Some(title) = &r.title {
            prompt.push_str(&format!(" \"{}\"", title));
        }
        if let Some(author) = &doc.detail.author_name {
            prompt.push_str(&format!(" by {}", author));
        }
        let thread = doc.detail.thread_name.as_ref().or(r.thread_name.as_ref());
        if let Some(thread) = thread {
            prompt.push_str(&format!(" in {}", thread));
        }
        let unit = doc
            .detail
            .business_unit_name
            .as_ref()
            .or(r.business_unit_name.as_ref());
        if let Some(unit) = unit {
            prompt.push_str(&format!(" ({})", unit));
        }
        prompt.push_str(&format!(
            "\nLink: {}\nUpvotes: {} | Posted: {}\n{}\n",
            doc.url,
            r.popularity_score,
            r.created_at.format("%Y-%m-%d"),
            truncate_chars(&doc.detail.body, MAX_BODY_CHARS)
        ));
    }
    prompt
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// System instruction, prior turns in order, then the new question.
pub fn build_messages(
    query: &str,
    history: &[ChatTurn],
    shortlist: &[ContextDocument],
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::new("system", system_prompt(shortlist)));
    messages.extend(
        history
            .iter()
            .map(|t| ChatMessage::new(t.role.as_str(), t.content.clone())),
    );
    messages.push(ChatMessage::new("user", query));
    messages
}

/// Decode the model output. Anything not matching the schema is an error.
pub fn parse_model_answer(value: Value) -> Result<ModelAnswer, SearchError> {
    serde_json::from_value(value).map_err(|e| SearchError::MalformedModelOutput(e.to_string()))
}

/// Map cited ids to shortlist documents, first citation first.
///
/// Duplicates collapse; ids outside the shortlist are dropped.
pub fn resolve_citations(ids: &[String], shortlist: &[ContextDocument]) -> Vec<AiSource> {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    for id in ids {
        let id = id.trim().trim_start_matches('[').trim_end_matches(']');
        if !seen.insert(id.to_string()) {
            continue;
        }
        match shortlist.iter().find(|d| d.result.id == id) {
            Some(doc) => sources.push(to_source(doc)),
            None => tracing::debug!(id, "dropping citation outside shortlist"),
        }
    }
    sources
}

fn to_source(doc: &ContextDocument) -> AiSource {
    let r = &doc.result;
    AiSource {
        id: r.id.clone(),
        kind: r.kind,
        post_id: r.post_id,
        reply_id: doc.reply_id(),
        title: r.title.clone(),
        url: doc.url.clone(),
        snippet: r.snippet.clone(),
        author_name: doc.detail.author_name.clone(),
        thread_id: r.thread_id,
        thread_name: doc.detail.thread_name.clone().or_else(|| r.thread_name.clone()),
        business_unit_id: r.business_unit_id,
        business_unit_name: doc
            .detail
            .business_unit_name
            .clone()
            .or_else(|| r.business_unit_name.clone()),
        popularity_score: r.popularity_score,
        created_at: r.created_at,
        relevance_score: r.relevance_score,
    }
}

/// Ask `model` to answer `query` from `shortlist`.
pub async fn synthesize(
    model: &dyn AnswerModel,
    query: &str,
    history: &[ChatTurn],
    shortlist: &[ContextDocument],
    generation: u64,
) -> Result<AiAnswer, SearchError> {
    let request = GenerationRequest {
        messages: build_messages(query, history, shortlist),
        schema_name: SCHEMA_NAME.to_string(),
        schema: output_schema(),
    };
    let parsed = parse_model_answer(model.generate(&request).await?)?;
    let sources = resolve_citations(&parsed.relevant_source_ids, shortlist);

    tracing::info!(
        model = model.model_name(),
        shortlist = shortlist.len(),
        cited = parsed.relevant_source_ids.len(),
        resolved = sources.len(),
        "synthesized answer"
    );

    Ok(AiAnswer {
        answer: parsed.answer,
        metadata: AnswerMetadata {
            model: model.model_name().to_string(),
            generated_at: Utc::now(),
            source_count: sources.len(),
            generation,
        },
        sources,
        suggested_followups: parsed.suggested_followups,
    })
}

/// Answer returned without a model call when nothing accessible matched.
pub fn no_accessible_results(generation: u64) -> AiAnswer {
    AiAnswer {
        answer: "I couldn't find any forum posts or replies you have access to that match \
                 your question. Try rephrasing it, using different keywords, or widening \
                 the business unit or thread filter."
            .to_string(),
        sources: Vec::new(),
        suggested_followups: vec![
            "Can you rephrase the question with different keywords?".to_string(),
            "Which thread or business unit should I look in?".to_string(),
            "What are the most recent discussions in my threads?".to_string(),
        ],
        metadata: AnswerMetadata {
            model: "none".to_string(),
            generated_at: Utc::now(),
            source_count: 0,
            generation,
        },
    }
}
