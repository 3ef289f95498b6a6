//! Wire-level tests for [`ComfyUIApi`] against an in-process axum server
//! that mimics the ComfyUI HTTP endpoints.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use comfybot_comfyui::api::{ComfyUIApi, ComfyUIApiError, EngineApi};
use comfybot_comfyui::history::{ArtifactRef, JobStatus};
use comfybot_core::variant::Variant;

const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Default)]
struct Recorded {
    prompts: Arc<Mutex<Vec<Value>>>,
    views: Arc<Mutex<Vec<HashMap<String, String>>>>,
    queue: Arc<Mutex<Vec<Value>>>,
    interrupts: Arc<Mutex<Vec<Value>>>,
}

async fn submit(State(rec): State<Recorded>, Json(body): Json<Value>) -> Json<Value> {
    rec.prompts.lock().unwrap().push(body);
    Json(json!({"prompt_id": "abc-123", "number": 4, "node_errors": {}}))
}

async fn history(Path(prompt_id): Path<String>) -> Json<Value> {
    // "nested" stands for a workflow whose SaveImage node writes into a
    // dated subfolder.
    let subfolder = if prompt_id == "nested" { "flux/2024" } else { "" };
    Json(json!({
        prompt_id: {
            "status": {"status_str": "success", "completed": true, "messages": []},
            "outputs": {"9": {"images": [
                {"filename": "ComfyUI_0001.png", "subfolder": subfolder, "type": "output"}
            ]}}
        }
    }))
}

async fn view(
    State(rec): State<Recorded>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    rec.views.lock().unwrap().push(params);
    b"\x89PNG fake".to_vec()
}

async fn queue(State(rec): State<Recorded>, Json(body): Json<Value>) -> StatusCode {
    rec.queue.lock().unwrap().push(body);
    StatusCode::OK
}

async fn queue_state() -> Json<Value> {
    Json(json!({
        "queue_running": [[3, "abc-123", {}, {"client_id": "x"}, ["9"]]],
        "queue_pending": []
    }))
}

async fn interrupt(State(rec): State<Recorded>, Json(body): Json<Value>) -> StatusCode {
    rec.interrupts.lock().unwrap().push(body);
    StatusCode::OK
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_engine() -> (ComfyUIApi, Recorded) {
    let rec = Recorded::default();
    let app = Router::new()
        .route("/prompt", post(submit))
        .route("/history/{prompt_id}", get(history))
        .route("/view", get(view))
        .route("/queue", get(queue_state).post(queue))
        .route("/interrupt", post(interrupt))
        .with_state(rec.clone());
    let addr = spawn(app).await;
    (ComfyUIApi::new(format!("http://{addr}")), rec)
}

// ---------------------------------------------------------------------------
// Test: POST /prompt wraps the workflow and returns the prompt id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submit_posts_workflow_under_prompt_key() {
    let (api, rec) = spawn_engine().await;
    let bindings = Variant::Image.profile().bindings;
    let request = Variant::Image
        .default_template()
        .to_request(&bindings, "a red fox in snow", 99)
        .unwrap();

    let response = api.submit_workflow(&request.workflow, TIMEOUT).await.unwrap();

    assert_eq!(response.prompt_id, "abc-123");
    assert_eq!(response.number, Some(4));

    let prompts = rec.prompts.lock().unwrap();
    assert_eq!(prompts[0]["prompt"]["6"]["inputs"]["text"], "a red fox in snow");
    assert_eq!(prompts[0]["prompt"]["31"]["inputs"]["seed"], 99);
    assert_eq!(prompts[0]["client_id"], api.client_id());
}

// ---------------------------------------------------------------------------
// Test: GET /history parses into a completed status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_is_parsed() {
    let (api, _rec) = spawn_engine().await;

    let history = api.get_history("abc-123", TIMEOUT).await.unwrap();

    let entry = assert_matches!(
        JobStatus::from_history(history, "abc-123"),
        JobStatus::Completed(entry) => entry
    );
    assert_eq!(entry.first_artifact("9").unwrap().filename, "ComfyUI_0001.png");
}

// ---------------------------------------------------------------------------
// Test: GET /view sends filename, subfolder and the output type tag
// ---------------------------------------------------------------------------

#[tokio::test]
async fn view_sends_artifact_query() {
    let (api, rec) = spawn_engine().await;
    let artifact = ArtifactRef {
        filename: "ComfyUI_0001.png".into(),
        subfolder: String::new(),
        kind: Some("output".into()),
    };

    let bytes = api.view(&artifact, TIMEOUT).await.unwrap();

    assert_eq!(bytes, b"\x89PNG fake");
    let views = rec.views.lock().unwrap();
    assert_eq!(views[0]["filename"], "ComfyUI_0001.png");
    assert_eq!(views[0]["subfolder"], "");
    assert_eq!(views[0]["type"], "output");
}

#[tokio::test]
async fn view_uses_subfolder_from_history_entry() {
    let (api, rec) = spawn_engine().await;

    let history = api.get_history("nested", TIMEOUT).await.unwrap();
    let entry = assert_matches!(
        JobStatus::from_history(history, "nested"),
        JobStatus::Completed(entry) => entry
    );
    let artifact = entry.first_artifact("9").unwrap();
    api.view(artifact, TIMEOUT).await.unwrap();

    let views = rec.views.lock().unwrap();
    assert_eq!(views[0]["filename"], "ComfyUI_0001.png");
    assert_eq!(views[0]["subfolder"], "flux/2024");
}

// ---------------------------------------------------------------------------
// Test: POST /queue asks the engine to delete the prompt
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_execution_deletes_from_queue() {
    let (api, rec) = spawn_engine().await;

    api.cancel_execution("abc-123").await.unwrap();

    assert_eq!(rec.queue.lock().unwrap()[0], json!({"delete": ["abc-123"]}));
}

// ---------------------------------------------------------------------------
// Test: GET /queue and POST /interrupt
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queue_reports_running_prompt() {
    let (api, _rec) = spawn_engine().await;

    let queue = api.get_queue().await.unwrap();

    assert!(queue.is_running("abc-123"));
    assert!(!queue.is_running("other"));
}

#[tokio::test]
async fn interrupt_names_the_prompt() {
    let (api, rec) = spawn_engine().await;

    api.interrupt("abc-123").await.unwrap();

    assert_eq!(rec.interrupts.lock().unwrap()[0], json!({"prompt_id": "abc-123"}));
}

// ---------------------------------------------------------------------------
// Test: error statuses and malformed bodies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn non_success_status_is_api_error() {
    let app = Router::new().route(
        "/prompt",
        post(|| async { (StatusCode::BAD_REQUEST, "invalid prompt") }),
    );
    let api = ComfyUIApi::new(format!("http://{}", spawn(app).await));

    let err = api
        .submit_workflow(&Variant::Image.default_template(), TIMEOUT)
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ComfyUIApiError::ApiError { status: 400, body } if body == "invalid prompt"
    );
}

#[tokio::test]
async fn missing_prompt_id_is_invalid_response() {
    let app = Router::new().route("/prompt", post(|| async { Json(json!({"number": 1})) }));
    let api = ComfyUIApi::new(format!("http://{}", spawn(app).await));

    let err = api
        .submit_workflow(&Variant::Image.default_template(), TIMEOUT)
        .await
        .unwrap_err();

    assert_matches!(err, ComfyUIApiError::InvalidResponse(_));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn unreachable_engine_is_a_connect_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = ComfyUIApi::new(format!("http://{addr}"));
    let err = api.get_history("abc", TIMEOUT).await.unwrap_err();

    assert_matches!(err, ComfyUIApiError::Connect(_));
    assert!(err.is_transient());
}
