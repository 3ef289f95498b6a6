//! Wire-level tests for [`TelegramApi`] and the update poller against an
//! in-process axum server that mimics the Bot API.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use comfybot_bot::dispatcher::Dispatcher;
use comfybot_bot::interaction::InteractionContext;
use comfybot_bot::telegram::{poller, TelegramApi};
use comfybot_bot::transport::{ChatTransport, MessageRef, TransportError};
use comfybot_comfyui::api::{ComfyUIApi, EngineApi};
use comfybot_comfyui::job::{JobRunner, JobSettings};
use comfybot_comfyui::retry::RetryConfig;
use comfybot_core::variant::Variant;

const TOKEN: &str = "123456-secret";

#[derive(Clone, Default)]
struct BotApi {
    calls: Arc<Mutex<Vec<(String, Value)>>>,
    uploads: Arc<Mutex<Vec<HashMap<String, String>>>>,
    updates: Arc<Mutex<VecDeque<Value>>>,
    offsets: Arc<Mutex<Vec<i64>>>,
    next_id: Arc<AtomicI64>,
}

impl BotApi {
    fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, body)| body.clone())
            .collect()
    }

    fn message(&self, chat_id: &Value) -> Value {
        json!({
            "ok": true,
            "result": {
                "message_id": 500 + self.next_id.fetch_add(1, Ordering::SeqCst),
                "date": 0,
                "chat": {"id": chat_id, "type": "private"}
            }
        })
    }
}

fn record(api: &BotApi, method: &str, body: &Value) {
    api.calls
        .lock()
        .unwrap()
        .push((method.to_string(), body.clone()));
}

async fn get_me() -> Json<Value> {
    Json(json!({
        "ok": true,
        "result": {"id": 1, "is_bot": true, "first_name": "Comfy", "username": "comfy_bot"}
    }))
}

async fn send_message(
    State(api): State<BotApi>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    record(&api, "sendMessage", &body);
    if body["text"] == "slow down" {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 3",
                "parameters": {"retry_after": 3}
            })),
        );
    }
    (StatusCode::OK, Json(api.message(&body["chat_id"])))
}

async fn edit_message_text(State(api): State<BotApi>, Json(body): Json<Value>) -> Json<Value> {
    record(&api, "editMessageText", &body);
    Json(api.message(&body["chat_id"]))
}

async fn delete_message(
    State(api): State<BotApi>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    record(&api, "deleteMessage", &body);
    if body["message_id"] == 404 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: message to delete not found"
            })),
        );
    }
    (StatusCode::OK, Json(json!({"ok": true, "result": true})))
}

async fn upload(State(api): State<BotApi>, mut multipart: Multipart) -> Json<Value> {
    let mut fields = HashMap::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        if let Some(file_name) = field.file_name() {
            fields.insert(format!("{name}.file_name"), file_name.to_string());
        }
        let bytes = field.bytes().await.unwrap();
        fields.insert(name, String::from_utf8_lossy(&bytes).into_owned());
    }
    let chat_id: i64 = fields["chat_id"].parse().unwrap();
    api.uploads.lock().unwrap().push(fields);
    Json(api.message(&json!(chat_id)))
}

async fn get_updates(State(api): State<BotApi>, Json(body): Json<Value>) -> Json<Value> {
    record(&api, "getUpdates", &body);
    api.offsets
        .lock()
        .unwrap()
        .push(body["offset"].as_i64().unwrap_or_default());

    let batch = api.updates.lock().unwrap().pop_front();
    let result = match batch {
        Some(batch) => batch,
        None => {
            tokio::time::sleep(Duration::from_millis(20)).await;
            json!([])
        }
    };
    Json(json!({"ok": true, "result": result}))
}

async fn spawn_bot_api() -> (TelegramApi, BotApi) {
    let state = BotApi::default();
    let prefix = format!("/bot{TOKEN}");
    let app = Router::new()
        .route(&format!("{prefix}/getMe"), post(get_me))
        .route(&format!("{prefix}/sendMessage"), post(send_message))
        .route(&format!("{prefix}/editMessageText"), post(edit_message_text))
        .route(&format!("{prefix}/deleteMessage"), post(delete_message))
        .route(&format!("{prefix}/sendPhoto"), post(upload))
        .route(&format!("{prefix}/sendDocument"), post(upload))
        .route(&format!("{prefix}/getUpdates"), post(get_updates))
        .with_state(state.clone());

    let addr = spawn(app).await;
    (TelegramApi::new(format!("http://{addr}/"), TOKEN), state)
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

// ---------------------------------------------------------------------------
// Test: method calls
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_me_returns_bot_account() {
    let (api, _) = spawn_bot_api().await;

    let me = api.get_me().await.unwrap();

    assert_eq!(me.username.as_deref(), Some("comfy_bot"));
    assert_eq!(me.first_name, "Comfy");
}

#[tokio::test]
async fn send_text_replies_to_the_user_message() {
    let (api, rec) = spawn_bot_api().await;

    let sent = api.send_text(42, "🔄 Generating your image...", Some(9)).await.unwrap();

    assert_eq!(sent.chat_id, 42);
    let calls = rec.calls_to("sendMessage");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["chat_id"], 42);
    assert_eq!(calls[0]["text"], "🔄 Generating your image...");
    assert_eq!(calls[0]["reply_parameters"]["message_id"], 9);
}

#[tokio::test]
async fn edit_and_delete_address_the_status_message() {
    let (api, rec) = spawn_bot_api().await;
    let status = MessageRef {
        chat_id: 42,
        message_id: 100,
    };

    api.edit_text(status, "⏳ Processing image...").await.unwrap();
    api.delete_message(status).await.unwrap();

    let edits = rec.calls_to("editMessageText");
    assert_eq!(edits[0]["message_id"], 100);
    assert_eq!(edits[0]["text"], "⏳ Processing image...");
    assert_eq!(rec.calls_to("deleteMessage")[0]["message_id"], 100);
}

#[tokio::test]
async fn photo_and_document_are_uploaded_as_multipart() {
    let (api, rec) = spawn_bot_api().await;

    api.send_photo(42, b"png".to_vec(), "✅ Result for: fox", Some(9))
        .await
        .unwrap();
    api.send_document(42, b"webp".to_vec(), "animation.webp", "✅ Result for: waves", None)
        .await
        .unwrap();

    let uploads = rec.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 2);

    assert_eq!(uploads[0]["photo"], "png");
    assert_eq!(uploads[0]["caption"], "✅ Result for: fox");
    let reply: Value = serde_json::from_str(&uploads[0]["reply_parameters"]).unwrap();
    assert_eq!(reply["message_id"], 9);

    assert_eq!(uploads[1]["document"], "webp");
    assert_eq!(uploads[1]["document.file_name"], "animation.webp");
    assert!(!uploads[1].contains_key("reply_parameters"));
}

#[tokio::test]
async fn long_captions_are_truncated() {
    let (api, rec) = spawn_bot_api().await;
    let caption = format!("✅ Result for: {}", "x".repeat(2000));

    api.send_photo(42, b"png".to_vec(), &caption, None).await.unwrap();

    let uploads = rec.uploads.lock().unwrap();
    assert_eq!(uploads[0]["caption"].chars().count(), 1024);
}

// ---------------------------------------------------------------------------
// Test: error envelopes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let (api, _) = spawn_bot_api().await;

    let err = api.send_text(42, "slow down", None).await.unwrap_err();

    assert_matches!(
        err,
        TransportError::Api {
            code: 429,
            retry_after: Some(3),
            ..
        }
    );
}

#[tokio::test]
async fn api_error_keeps_description() {
    let (api, _) = spawn_bot_api().await;
    let missing = MessageRef {
        chat_id: 42,
        message_id: 404,
    };

    let err = api.delete_message(missing).await.unwrap_err();

    assert_matches!(
        err,
        TransportError::Api { code: 400, ref description, retry_after: None }
            if description.contains("not found")
    );
}

#[tokio::test]
async fn unreachable_api_does_not_leak_the_token() {
    let api = TelegramApi::new("http://127.0.0.1:1", TOKEN);

    let err = api.get_me().await.unwrap_err();

    assert_matches!(err, TransportError::Request(_));
    assert!(!err.to_string().contains("secret"));
}

// ---------------------------------------------------------------------------
// Test: poller feeds the dispatcher and advances the offset
// ---------------------------------------------------------------------------

#[tokio::test]
async fn poller_dispatches_start_and_acknowledges_the_update() {
    let (api, rec) = spawn_bot_api().await;
    let api = Arc::new(api);
    rec.updates.lock().unwrap().push_back(json!([
        {"update_id": 10, "message": {
            "message_id": 3, "date": 0,
            "chat": {"id": 42, "type": "private"},
            "from": {"id": 7, "is_bot": false, "first_name": "Ada"},
            "text": "/start"
        }},
        {"update_id": 11, "edited_message": {
            "message_id": 3, "date": 0,
            "chat": {"id": 42, "type": "private"},
            "text": "/start"
        }}
    ]));

    let profile = Variant::Image.profile();
    // Never reached: only /start is dispatched.
    let engine: Arc<dyn EngineApi> = Arc::new(ComfyUIApi::new("http://127.0.0.1:1"));
    let dispatcher = Dispatcher::new(
        InteractionContext {
            transport: Arc::clone(&api) as Arc<dyn ChatTransport>,
            runner: Arc::new(JobRunner::new(
                engine,
                JobSettings::from_profile(&profile, RetryConfig::no_retry()),
            )),
            template: Arc::new(Variant::Image.default_template()),
            profile: profile.clone(),
        },
        CancellationToken::new(),
    );

    let cancel = CancellationToken::new();
    let stop = async {
        tokio::time::timeout(Duration::from_secs(5), async {
            while rec.offsets.lock().unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        cancel.cancel();
    };
    tokio::join!(poller::run(&api, &dispatcher, Duration::ZERO, &cancel), stop);

    let greetings = rec.calls_to("sendMessage");
    assert_eq!(greetings.len(), 1);
    assert_eq!(greetings[0]["chat_id"], 42);
    assert_eq!(greetings[0]["text"], profile.greeting);

    let offsets = rec.offsets.lock().unwrap();
    assert_eq!(offsets[0], 0);
    assert_eq!(offsets[1], 12);
}
