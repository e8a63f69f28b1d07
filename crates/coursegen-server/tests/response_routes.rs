//! Integration tests for the response push API.
//!
//! These drive the full router with `oneshot` requests, the way a stream
//! source would, and check the sections, tree and tasks it exposes.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use coursegen_server::{app, config::Config, state::AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

const ADD_INTRO: &str = r#"{"modifications":[{"action":"ADD","targetType":"MODULE","parentPath":"C1.S1","node":{"id":"M1","name":"Intro"}}]}"#;

/// Create an app backed by a temp capture directory.
fn create_test_app() -> (Router, Arc<AppState>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        capture_dir: Some(temp_dir.path().join("captures")),
        capture_enabled: true,
        stream_timeout_secs: 0,
        event_buffer: 64,
        retained_responses: 8,
    };

    let state = Arc::new(AppState::new(config).expect("Failed to create AppState"));
    (app(Arc::clone(&state)), state, temp_dir)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn begin(app: &Router, body: Value) -> Uuid {
    let (status, value) = send(app, "POST", "/api/responses", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    value["response_id"].as_str().unwrap().parse().unwrap()
}

async fn push(app: &Router, id: Uuid, text: &str) -> (StatusCode, Value) {
    send(app, "POST", &format!("/api/responses/{id}/chunks"), Some(json!({"text": text}))).await
}

#[tokio::test]
async fn test_health() {
    let (app, _state, _dir) = create_test_app();
    let (status, body) = send(&app, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_streamed_response_builds_tree_and_tasks() {
    let (app, _state, _dir) = create_test_app();
    let id = begin(&app, json!({"prompt": "Rust course", "model": "test"})).await;

    let (status, outcome) = push(&app, id, "[Thinking...] planning the module").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["status"], "thinking");

    push(&app, id, "...").await;
    let (_, outcome) = push(&app, id, ADD_INTRO).await;
    assert_eq!(outcome["treeRevision"], 1);

    let (status, _) = send(&app, "POST", &format!("/api/responses/{id}/complete"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, "GET", &format!("/api/responses/{id}/sections"), None).await;
    let kinds: Vec<&str> = body["sections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["type"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["thinking", "structured-data"]);
    assert_eq!(body["next"], 2);

    let (_, body) = send(&app, "GET", &format!("/api/responses/{id}/sections?since=1"), None).await;
    assert_eq!(body["sections"].as_array().unwrap().len(), 1);

    let (_, tree) = send(&app, "GET", "/api/tree", None).await;
    assert_eq!(tree["revision"], 1);
    assert_eq!(tree["node_count"], 3);
    let module = &tree["tree"]["roots"][0]["children"][0]["children"][0];
    assert_eq!(module["name"], "Intro");
    assert_eq!(module["type"], "MODULE");

    let (_, tasks) = send(&app, "GET", "/api/tasks", None).await;
    assert_eq!(tasks["pending"], 0);
    assert_eq!(tasks["tasks"][0]["title"], "Create module: Intro");
    assert_eq!(tasks["tasks"][0]["completed"], true);

    let (_, summary) = send(&app, "GET", &format!("/api/responses/{id}"), None).await;
    assert_eq!(summary["phase"], "complete");
    assert_eq!(summary["fragments"], 3);

    let (_, captures) = send(&app, "GET", "/api/captures", None).await;
    assert_eq!(captures["captures"][0]["chunks"], 3);
}

#[tokio::test]
async fn test_error_mapping() {
    let (app, _state, _dir) = create_test_app();
    let missing = Uuid::new_v4();

    let (status, _) = push(&app, missing, "hello").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "GET", &format!("/api/responses/{missing}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let id = begin(&app, json!({})).await;
    let (status, _) = send(&app, "POST", "/api/responses", Some(json!({"id": id}))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, summary) = send(
        &app,
        "POST",
        &format!("/api/responses/{id}/error"),
        Some(json!({"message": "upstream reset"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["phase"], "error");

    let (status, _) = push(&app, id, "late").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, "POST", "/api/tasks/task-missing/done", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_regenerate_supersedes_previous_response() {
    let (app, state, _dir) = create_test_app();
    let first = begin(&app, json!({})).await;
    push(&app, first, ADD_INTRO).await;

    let second = begin(&app, json!({"supersedes": first})).await;
    let (status, _) = push(&app, first, "[Generating...] stale").await;
    assert_eq!(status, StatusCode::CONFLICT);

    push(&app, second, ADD_INTRO).await;
    assert_eq!(state.pipeline.tree().await.node_count(), 3);
    assert_eq!(state.pipeline.tasks().await.len(), 1);

    let (_, summary) = send(&app, "GET", &format!("/api/responses/{first}"), None).await;
    assert_eq!(summary["phase"], "superseded");
    assert_eq!(summary["supersededBy"], second.to_string());
}

#[tokio::test]
async fn test_stray_brace_in_prose_does_not_hide_block() {
    let (app, state, _dir) = create_test_app();
    let id = begin(&app, json!({})).await;

    push(&app, id, "Tip: a JSON object starts with {. Here it is:\n").await;
    let (_, outcome) = push(&app, id, ADD_INTRO).await;
    assert_eq!(outcome["treeRevision"], 1);
    push(&app, id, "\nAll done.").await;

    let sections = state.pipeline.sections(id).await.unwrap();
    let contents: Vec<&str> = sections.iter().map(|s| s.content.as_str()).collect();
    assert!(contents[0].contains("starts with {."));
    assert_eq!(contents[1], ADD_INTRO);
    assert!(contents[2].contains("All done."));
}

#[tokio::test]
async fn test_forget_ended_response() {
    let (app, _state, _dir) = create_test_app();
    let id = begin(&app, json!({})).await;
    push(&app, id, "hello").await;
    let uri = format!("/api/responses/{id}");

    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    send(&app, "POST", &format!("{uri}/complete"), Some(json!({}))).await;
    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "GET", &format!("{uri}/sections"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mark_task_done() {
    let (app, state, _dir) = create_test_app();
    let id = begin(&app, json!({})).await;
    push(
        &app,
        id,
        r#"{"action":"UPDATE","targetType":"SUBJECT","parentPath":"C1","node":{"id":"S1","name":"Basics"}}"#,
    )
    .await;

    let task_id = state.pipeline.tasks().await[0].id.clone();
    let uri = format!("/api/tasks/{task_id}/done");

    let (status, body) = send(&app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], true);

    let (_, body) = send(&app, "POST", &uri, None).await;
    assert_eq!(body["changed"], false);
}
