//! Router tests driven through `tower::ServiceExt::oneshot` against
//! in-memory stores and the mock collaborators.

use std::sync::Arc;

use actions::mock::test_collaborators;
use actions::ActionRegistry;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use engine::{
    EngineConfig, InMemoryDefinitionRegistry, InMemoryRunStore, ManualClock, Scheduler,
    WorkflowEngine, WorkflowService,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::{router, AppState};

fn app() -> Router {
    let engine = WorkflowEngine::new(
        ActionRegistry::builtin(test_collaborators()),
        Arc::new(InMemoryDefinitionRegistry::new()),
        Arc::new(InMemoryRunStore::new()),
        EngineConfig::default(),
    );
    let scheduler = Arc::new(Scheduler::new(engine.clone(), Arc::new(ManualClock::new(Utc::now()))));
    router(AppState::new(WorkflowService::new(engine, scheduler)))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    dispatch(app, request.body(body).unwrap()).await
}

/// Send `raw` verbatim as a JSON-typed body.
async fn send_raw(app: &Router, uri: &str, raw: &'static str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(raw))
        .unwrap();
    dispatch(app, request).await
}

async fn dispatch(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn notify_workflow() -> Value {
    json!({
        "name": "greet",
        "trigger": { "type": "manual" },
        "actions": [
            { "id": "hello", "name": "Say hello", "type": "notification",
              "config": { "message": "hi", "recipient": "ops" } }
        ]
    })
}

#[tokio::test]
async fn health_is_ok() {
    let (status, body) = send(&app(), Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn create_get_list_update_delete() {
    let app = app();

    let (status, created) = send(&app, Method::POST, "/api/v1/workflows", Some(notify_workflow())).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_owned();
    assert_eq!(created["enabled"], true);

    let (status, fetched) = send(&app, Method::GET, &format!("/api/v1/workflows/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "greet");

    let (_, list) = send(&app, Method::GET, "/api/v1/workflows", None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let (status, updated) = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/workflows/{id}"),
        Some(json!({ "name": "greet everyone" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "greet everyone");

    let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/workflows/{id}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/workflows/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn invalid_schedule_is_unprocessable() {
    let workflow = json!({
        "name": "broken",
        "trigger": { "type": "schedule", "expression": "61 * * * *" },
        "actions": []
    });
    let (status, body) = send(&app(), Method::POST, "/api/v1/workflows", Some(workflow)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("invalid schedule expression"));
}

#[tokio::test]
async fn run_returns_terminal_run_and_history_lists_it() {
    let app = app();
    let (_, created) = send(&app, Method::POST, "/api/v1/workflows", Some(notify_workflow())).await;
    let id = created["id"].as_str().unwrap().to_owned();

    let (status, history) = send(&app, Method::GET, &format!("/api/v1/workflows/{id}/runs"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history, json!([]));

    let (status, run) = send(&app, Method::POST, &format!("/api/v1/workflows/{id}/run"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "completed");
    assert_eq!(run["logs"].as_array().unwrap().len(), 3);

    let run_id = run["id"].as_str().unwrap();
    let (status, fetched) = send(&app, Method::GET, &format!("/api/v1/runs/{run_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, run);

    let (_, history) =
        send(&app, Method::GET, &format!("/api/v1/workflows/{id}/runs?limit=5"), None).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn start_is_accepted_with_a_running_snapshot() {
    let app = app();
    let (_, created) = send(&app, Method::POST, "/api/v1/workflows", Some(notify_workflow())).await;
    let id = created["id"].as_str().unwrap().to_owned();

    let (status, run) = send(
        &app,
        Method::POST,
        &format!("/api/v1/workflows/{id}/start"),
        Some(json!({ "requested_by": "tests" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(run["workflow_id"], created["id"]);
    assert_eq!(run["status"], "running");
}

#[tokio::test]
async fn malformed_run_input_is_rejected_before_starting() {
    let app = app();
    let (_, created) = send(&app, Method::POST, "/api/v1/workflows", Some(notify_workflow())).await;
    let id = created["id"].as_str().unwrap().to_owned();

    for action in ["run", "start"] {
        let (status, body) =
            send_raw(&app, &format!("/api/v1/workflows/{id}/{action}"), "{\"requested_by\": ").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("not valid JSON"));
    }

    let (_, history) = send(&app, Method::GET, &format!("/api/v1/workflows/{id}/runs"), None).await;
    assert_eq!(history, json!([]));
}

#[tokio::test]
async fn malformed_event_payload_is_rejected() {
    let (status, body) = send_raw(&app(), "/api/v1/events/user.created", "not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("not valid JSON"));
}

#[tokio::test]
async fn unknown_workflow_run_is_not_found() {
    let uri = format!("/api/v1/workflows/{}/run", uuid::Uuid::new_v4());
    let (status, _) = send(&app(), Method::POST, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn events_start_matching_workflows() {
    let app = app();
    let listener = json!({
        "name": "welcome",
        "trigger": { "type": "event", "event": "user.created" },
        "actions": [
            { "id": "is_user", "name": "Has email", "type": "condition",
              "config": { "field": "trigger.email", "operator": "exists" } }
        ]
    });
    send(&app, Method::POST, "/api/v1/workflows", Some(listener)).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/events/user.created",
        Some(json!({ "email": "new@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["event"], "user.created");
    assert_eq!(body["run_ids"].as_array().unwrap().len(), 1);

    let (_, body) = send(&app, Method::POST, "/api/v1/events/user.deleted", None).await;
    assert_eq!(body["run_ids"], json!([]));

    let (status, running) = send(&app, Method::GET, "/api/v1/runs/running", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(running.is_array());
}
