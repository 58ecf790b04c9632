use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use textflow_core::config::GatewayConfig;
use textflow_core::traits::{RunHistoryStore, StepProcessor};
use textflow_core::types::StepKind;
use textflow_engine::WorkflowRunner;
use textflow_gateway::{router, AppState};
use textflow_store::SqliteStore;
use textflow_test_utils::{MemoryHistoryStore, ScriptedProcessor};

fn digest_processor() -> ScriptedProcessor {
    ScriptedProcessor::new()
        .respond(StepKind::CleanText, "clean text")
        .respond(StepKind::Summarize, "Summary.")
        .fail(StepKind::TagCategory, "rate limited")
}

fn app_with(processor: impl StepProcessor, history: Arc<dyn RunHistoryStore>) -> (Router, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let runner = Arc::new(WorkflowRunner::new(Arc::new(processor), history.clone()));
    let state = Arc::new(AppState {
        config: GatewayConfig::default(),
        runner,
        workflows: store.clone(),
        history,
    });
    (router(state), store)
}

/// Router whose workflows and history share one in-memory database.
fn app() -> (Router, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let runner = Arc::new(WorkflowRunner::new(Arc::new(digest_processor()), store.clone()));
    let state = Arc::new(AppState {
        config: GatewayConfig::default(),
        runner,
        workflows: store.clone(),
        history: store.clone(),
    });
    (router(state), store)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(b) => {
            builder = builder.header("content-type", "application/json");
            Body::from(b.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn run_body(text: &str, steps: &[&str]) -> String {
    json!({
        "workflowId": "wf-adhoc",
        "workflowName": "Ad hoc",
        "inputText": text,
        "steps": steps.iter().map(|s| json!({"type": s})).collect::<Vec<_>>(),
    })
    .to_string()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = app();
    let (status, body) = send(&app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_workflow_crud() {
    let (app, _) = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/workflows",
        Some(r#"{"name": "Digest", "steps": [{"type": "clean-text"}, {"type": "summarize"}]}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["workflowId"].as_str().unwrap().to_string();

    let (status, body) = send(&app, Method::GET, "/api/workflows", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workflows"].as_array().unwrap().len(), 1);

    let (status, body) = send(&app, Method::GET, &format!("/api/workflows/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["workflow"]["name"], "Digest");
    assert_eq!(body["workflow"]["steps"][1]["type"], "summarize");

    let (status, _) = send(&app, Method::DELETE, &format!("/api/workflows/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::DELETE, &format!("/api/workflows/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Workflow not found");
}

#[tokio::test]
async fn test_create_workflow_rejects_bad_step_counts() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/workflows",
        Some(r#"{"name": "One", "steps": [{"type": "summarize"}]}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_unknown_step_kind_is_bad_request() {
    let (app, _) = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/workflows",
        Some(r#"{"name": "X", "steps": [{"type": "translate"}, {"type": "summarize"}]}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("translate"));
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (app, _) = app();
    let (status, _) = send(&app, Method::POST, "/api/workflows/run", Some("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_run_success_returns_results_and_records_history() {
    let (app, store) = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/workflows/run",
        Some(&run_body("raw noisy text...", &["clean-text", "summarize"])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(
        body["results"],
        json!([
            {"step": "clean-text", "input": "raw noisy text...", "output": "clean text"},
            {"step": "summarize", "input": "clean text", "output": "Summary."},
        ])
    );

    let history = store.list_recent(5).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id.0, body["runId"].as_str().unwrap());
}

#[tokio::test]
async fn test_run_failure_reports_step_error() {
    let (app, _) = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/workflows/run",
        Some(&run_body("raw", &["clean-text", "tag-category"])),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "rate limited");
    assert_eq!(body["failedStep"], "tag-category");

    let (_, body) = send(&app, Method::GET, "/api/history", None).await;
    let run = &body["history"][0];
    assert_eq!(run["status"], "failed");
    assert_eq!(run["error"], "rate limited");
    assert_eq!(run["results"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_run_validation_creates_no_history() {
    let (app, store) = app();

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/workflows/run",
        Some(&run_body("", &["clean-text", "summarize"])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Input text and at least 2 steps are required");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/workflows/run",
        Some(&run_body("text", &["summarize"])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(store.run_count().unwrap(), 0);
}

#[tokio::test]
async fn test_persistence_failure_still_returns_results() {
    let history = Arc::new(MemoryHistoryStore::failing());
    let (app, _) = app_with(digest_processor(), history.clone());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/workflows/run",
        Some(&run_body("raw", &["clean-text", "summarize"])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"].as_array().unwrap().len(), 2);
    assert_eq!(history.append_attempts(), 1);
}

#[tokio::test]
async fn test_run_saved_workflow() {
    let (app, _) = app();

    let (_, body) = send(
        &app,
        Method::POST,
        "/api/workflows",
        Some(r#"{"name": "Digest", "steps": [{"type": "clean-text"}, {"type": "summarize"}]}"#),
    )
    .await;
    let id = body["workflowId"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/workflows/{}/run", id),
        Some(r#"{"inputText": "raw"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][1]["output"], "Summary.");

    let (_, body) = send(&app, Method::GET, &format!("/api/history?workflowId={}", id), None).await;
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["workflowName"], "Digest");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/workflows/missing/run",
        Some(r#"{"inputText": "raw"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_history_limit_defaults_and_clamps() {
    let (app, _) = app();
    for i in 0..7 {
        send(
            &app,
            Method::POST,
            "/api/workflows/run",
            Some(&run_body(&format!("text {}", i), &["clean-text", "summarize"])),
        )
        .await;
    }

    let (_, body) = send(&app, Method::GET, "/api/history", None).await;
    assert_eq!(body["history"].as_array().unwrap().len(), 5);

    let (_, body) = send(&app, Method::GET, "/api/history?limit=2", None).await;
    assert_eq!(body["history"].as_array().unwrap().len(), 2);

    let (_, body) = send(&app, Method::GET, "/api/history?limit=abc", None).await;
    assert_eq!(body["history"].as_array().unwrap().len(), 5);

    let (_, body) = send(&app, Method::GET, "/api/history?limit=1000", None).await;
    assert_eq!(body["history"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn test_status_reports_degraded_when_store_down() {
    let history = Arc::new(MemoryHistoryStore::failing());
    let (app, _) = app_with(digest_processor(), history);

    let (status, body) = send(&app, Method::GET, "/api/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["services"]["database"]["status"], "disconnected");
    assert_eq!(body["services"]["backend"]["processor"], "scripted");
}

#[tokio::test]
async fn test_status_healthy() {
    let (app, _) = app();
    let (_, body) = send(&app, Method::GET, "/api/status", None).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["services"]["llm"]["status"], "connected");
}
