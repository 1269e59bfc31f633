//! HTTP server tests against a seeded SQLite database and a mock
//! OpenAI-compatible chat completions endpoint.

mod common;

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;

use forum_search::config::{Config, LlmConfig};
use forum_search::llm::{AnswerModel, DisabledModel, OpenAiModel};
use forum_search::server::router;
use forum_search::service::SearchService;
use forum_search::sqlite_store::SqliteForumStore;

// ─── Mock model endpoint ────────────────────────────────────────────

#[derive(Clone)]
enum Scripted {
    /// 200 with this string as `choices[0].message.content`.
    Content(String),
    Status(u16),
    Hang(Duration),
}

#[derive(Clone, Default)]
struct MockLlm {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl MockLlm {
    fn with(script: Vec<Scripted>) -> Self {
        let mock = MockLlm::default();
        mock.script.lock().extend(script);
        mock
    }

    fn hits(&self) -> usize {
        self.requests.lock().len()
    }
}

async fn completions(
    State(mock): State<MockLlm>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    mock.requests.lock().push(body);
    let next = mock.script.lock().pop_front();
    match next {
        Some(Scripted::Content(content)) => (
            StatusCode::OK,
            Json(json!({
                "id": "chatcmpl-test",
                "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
            })),
        ),
        Some(Scripted::Status(code)) => (
            StatusCode::from_u16(code).unwrap(),
            Json(json!({"error": {"message": "scripted failure"}})),
        ),
        Some(Scripted::Hang(d)) => {
            tokio::time::sleep(d).await;
            (StatusCode::OK, Json(json!({})))
        }
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"message": "script exhausted"}})),
        ),
    }
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    addr
}

async fn spawn_mock(mock: MockLlm) -> SocketAddr {
    spawn(
        Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(mock),
    )
    .await
}

fn answer_content(ids: &[&str]) -> String {
    json!({
        "answer": "The elk winter range moved north ([reply](/posts/3#reply-25)).",
        "relevantSourceIds": ids,
        "suggestedFollowups": ["When did it move?", "Is there a map?"]
    })
    .to_string()
}

// ─── Harness ────────────────────────────────────────────────────────

struct Harness {
    _tmp: TempDir,
    base: String,
    pool: sqlx::SqlitePool,
    client: reqwest::Client,
}

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn ai_search(&self, user: Option<&str>, body: Value) -> reqwest::Response {
        let mut req = self.client.post(self.url("/ai-search")).json(&body);
        if let Some(user) = user {
            req = req.header("x-user-id", user);
        }
        req.send().await.unwrap()
    }
}

async fn start(model: Arc<dyn AnswerModel>) -> Harness {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("forum.sqlite");
    let pool = common::seeded_pool(&path).await;
    let service = SearchService::new(
        Config::with_db_path(&path),
        Arc::new(SqliteForumStore::new(pool.clone())),
        model,
    )
    .await
    .unwrap();
    let addr = spawn(router(Arc::new(service))).await;
    Harness {
        _tmp: tmp,
        base: format!("http://{}", addr),
        pool,
        client: reqwest::Client::new(),
    }
}

fn openai_model(addr: SocketAddr, max_retries: u32) -> OpenAiModel {
    let config = LlmConfig {
        provider: "openai".to_string(),
        model: Some("mock-model".to_string()),
        base_url: format!("http://{}/v1", addr),
        max_retries,
        ..Default::default()
    };
    OpenAiModel::new(&config, Some("test-key".to_string()))
        .unwrap()
        .with_backoff(Duration::from_millis(10))
}

async fn start_with_mock(script: Vec<Scripted>, max_retries: u32) -> (Harness, MockLlm) {
    let mock = MockLlm::with(script);
    let addr = spawn_mock(mock.clone()).await;
    let harness = start(Arc::new(openai_model(addr, max_retries))).await;
    (harness, mock)
}

// ─── Ranked search ──────────────────────────────────────────────────

#[tokio::test]
async fn test_health_reports_generation() {
    let h = start(Arc::new(DisabledModel)).await;
    let body: Value = reqwest::get(h.url("/health")).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["generation"], 1);
    assert_eq!(body["documents"], 6);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_search_endpoint() {
    let h = start(Arc::new(DisabledModel)).await;
    let resp = h
        .client
        .post(h.url("/search"))
        .json(&json!({"query": "performance caching"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 20);
    let first = &body["results"][0];
    assert_eq!(first["id"], "post_1");
    assert_eq!(first["type"], "post");
    assert_eq!(first["threadName"], "Wildlife");
    assert_eq!(first["businessUnitName"], "Parks");
    assert!(first["snippet"].as_str().unwrap().contains("<mark>performance</mark>"));

    let none: Value = h
        .client
        .post(h.url("/search"))
        .json(&json!({"query": "nonexistentterm"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(none["total"], 0);
    assert_eq!(none["results"], json!([]));

    let replies: Value = h
        .client
        .post(h.url("/search"))
        .json(&json!({"query": "winter range", "type": "reply", "sort": "top"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(replies["total"], 1);
    assert_eq!(replies["results"][0]["id"], "reply_25");
    assert_eq!(replies["results"][0]["postId"], 3);
    assert!(replies["results"][0].get("title").is_none());
}

#[tokio::test]
async fn test_search_rejects_bad_body() {
    let h = start(Arc::new(DisabledModel)).await;
    let resp = h
        .client
        .post(h.url("/search"))
        .json(&json!({"query": "x", "match": "fuzzy"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_admin_refresh_publishes_new_generation() {
    let h = start(Arc::new(DisabledModel)).await;
    sqlx::query(
        "INSERT INTO posts (id, title, body, author_id, thread_id, upvotes, created_at)
         VALUES (5, 'Glacier melt', 'Survey results', 7, 10, 0, 0)",
    )
    .execute(&h.pool)
    .await
    .unwrap();

    let report: Value = h
        .client
        .post(h.url("/admin/refresh"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["generation"], 2);
    assert_eq!(report["documents"], 7);
    assert!(report["terms"].as_u64().unwrap() > 0);

    let found: Value = h
        .client
        .post(h.url("/search"))
        .json(&json!({"query": "glacier"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found["total"], 1);
}

// ─── AI search ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_ai_search_requires_user_header() {
    let (h, mock) = start_with_mock(vec![], 0).await;
    let missing = h.ai_search(None, json!({"query": "winter range"})).await;
    assert_eq!(missing.status(), 401);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unauthorized");

    let garbage = h.ai_search(Some("dana"), json!({"query": "winter range"})).await;
    assert_eq!(garbage.status(), 401);
    assert_eq!(mock.hits(), 0);
}

#[tokio::test]
async fn test_ai_search_disabled_model_is_unavailable() {
    let h = start(Arc::new(DisabledModel)).await;
    let resp = h.ai_search(Some("7"), json!({"query": "winter range"})).await;
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "model_unavailable");
}

#[tokio::test]
async fn test_ai_search_resolves_citations_within_scope() {
    let (h, mock) = start_with_mock(
        vec![Scripted::Content(answer_content(&[
            "reply_25", "post_4", "post_3", "reply_25",
        ]))],
        0,
    )
    .await;

    let resp = h
        .ai_search(
            Some("7"),
            json!({
                "query": "winter range",
                "conversationHistory": [
                    {"role": "user", "content": "Tell me about elk"},
                    {"role": "assistant", "content": "Elk are large deer."}
                ]
            }),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();

    let ids: Vec<&str> = body["sources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["reply_25", "post_3"]);
    assert_eq!(body["sources"][0]["url"], "/posts/3#reply-25");
    assert_eq!(body["sources"][0]["authorName"], "Lee");
    assert_eq!(body["sources"][0]["threadName"], "Wildlife");
    assert_eq!(body["sources"][1]["title"], "Winter range maps");
    assert_eq!(body["suggestedFollowups"].as_array().unwrap().len(), 2);
    assert_eq!(body["metadata"]["model"], "mock-model");
    assert_eq!(body["metadata"]["sourceCount"], 2);
    assert_eq!(body["metadata"]["generation"], 1);

    let requests = mock.requests.lock().clone();
    assert_eq!(requests.len(), 1);
    let sent = &requests[0];
    assert_eq!(sent["model"], "mock-model");
    assert_eq!(sent["response_format"]["type"], "json_schema");
    assert_eq!(sent["response_format"]["json_schema"]["strict"], true);
    let required = &sent["response_format"]["json_schema"]["schema"]["required"];
    assert_eq!(
        required,
        &json!(["answer", "relevantSourceIds", "suggestedFollowups"])
    );

    let messages = sent["messages"].as_array().unwrap();
    let roles: Vec<&str> = messages.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
    let system = messages[0]["content"].as_str().unwrap();
    assert!(system.contains("[post_3]"));
    assert!(system.contains("[reply_25]"));
    // Thread 20 is outside user 7's scope and never reaches the model.
    assert!(!system.contains("[post_4]"));
    assert_eq!(messages[3]["content"], "winter range");
}

#[tokio::test]
async fn test_ai_search_without_accessible_results_skips_model() {
    let (h, mock) = start_with_mock(vec![], 0).await;
    let resp = h.ai_search(Some("99"), json!({"query": "winter range"})).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["sources"], json!([]));
    assert!(!body["suggestedFollowups"].as_array().unwrap().is_empty());
    assert_eq!(body["metadata"]["model"], "none");
    assert_eq!(mock.hits(), 0);

    // Accessible threads but no matching text behaves the same.
    let resp = h.ai_search(Some("7"), json!({"query": "nonexistentterm"})).await;
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["metadata"]["sourceCount"], 0);
    assert_eq!(mock.hits(), 0);
}

#[tokio::test]
async fn test_ai_search_invalid_filter() {
    let (h, mock) = start_with_mock(vec![], 0).await;
    let resp = h
        .ai_search(Some("7"), json!({"query": "winter", "threadId": "ten"}))
        .await;
    assert_eq!(resp.status(), 400);
    assert_eq!(mock.hits(), 0);
}

#[tokio::test]
async fn test_ai_search_filter_narrows_shortlist() {
    let (h, mock) = start_with_mock(
        vec![Scripted::Content(answer_content(&["post_4"]))],
        0,
    )
    .await;
    let resp = h
        .ai_search(Some("8"), json!({"query": "budget", "businessUnitId": "2"}))
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["sources"][0]["id"], "post_4");
    assert_eq!(body["sources"][0]["businessUnitName"], "Finance");
    assert_eq!(mock.hits(), 1);
}

#[tokio::test]
async fn test_malformed_model_output_is_an_error() {
    let (h, _mock) = start_with_mock(
        vec![Scripted::Content("Sure! The winter range is north.".to_string())],
        0,
    )
    .await;
    let resp = h.ai_search(Some("7"), json!({"query": "winter range"})).await;
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "malformed_model_output");
}

#[tokio::test]
async fn test_schema_violation_is_an_error() {
    let missing_ids = json!({"answer": "north", "suggestedFollowups": []}).to_string();
    let (h, _mock) = start_with_mock(vec![Scripted::Content(missing_ids)], 0).await;
    let resp = h.ai_search(Some("7"), json!({"query": "winter range"})).await;
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "malformed_model_output");
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let (h, mock) = start_with_mock(
        vec![
            Scripted::Status(503),
            Scripted::Content(answer_content(&["post_3"])),
        ],
        1,
    )
    .await;
    let resp = h.ai_search(Some("7"), json!({"query": "winter range"})).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(mock.hits(), 2);
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let (h, mock) = start_with_mock(
        vec![Scripted::Status(429), Scripted::Status(500), Scripted::Status(500)],
        1,
    )
    .await;
    let resp = h.ai_search(Some("7"), json!({"query": "winter range"})).await;
    assert_eq!(resp.status(), 502);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "upstream_error");
    assert_eq!(mock.hits(), 2);
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let (h, mock) = start_with_mock(
        vec![Scripted::Status(400), Scripted::Content(answer_content(&[]))],
        1,
    )
    .await;
    let resp = h.ai_search(Some("7"), json!({"query": "winter range"})).await;
    assert_eq!(resp.status(), 502);
    assert_eq!(mock.hits(), 1);
}

#[tokio::test]
async fn test_model_timeout() {
    let mock = MockLlm::with(vec![Scripted::Hang(Duration::from_secs(5))]);
    let addr = spawn_mock(mock.clone()).await;
    let model = openai_model(addr, 0).with_timeout(Duration::from_millis(200));
    let h = start(Arc::new(model)).await;

    let resp = h.ai_search(Some("7"), json!({"query": "winter range"})).await;
    assert_eq!(resp.status(), 504);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "timeout");
}
