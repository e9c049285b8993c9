#![allow(dead_code)]

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Stand-in for the flashcard vendor: deck listing plus record creation.
pub struct MockMochi {
    pub decks: Value,
    pub listing_status: StatusCode,
    pub fail_positions: Vec<usize>,
    pub stagger_ms: u64,
    pub calls: AtomicUsize,
    pub listings: AtomicUsize,
    pub auth_headers: Mutex<Vec<String>>,
    pub created: Mutex<Vec<Value>>,
}

impl MockMochi {
    pub fn new(decks: Value) -> Self {
        Self {
            decks,
            listing_status: StatusCode::OK,
            fail_positions: Vec::new(),
            stagger_ms: 0,
            calls: AtomicUsize::new(0),
            listings: AtomicUsize::new(0),
            auth_headers: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(mut self, positions: &[usize]) -> Self {
        self.fail_positions = positions.to_vec();
        self
    }

    /// Delay each create call so that earlier calls finish last.
    pub fn staggered(mut self, step_ms: u64) -> Self {
        self.stagger_ms = step_ms;
        self
    }

    pub fn with_listing_status(mut self, status: StatusCode) -> Self {
        self.listing_status = status;
        self
    }

    pub fn created(&self) -> Vec<Value> {
        self.created.lock().unwrap().clone()
    }
}

pub fn default_decks() -> Value {
    json!({
        "docs": [
            {"id": "deck-trash", "name": "Old", "trashed?": "2023-05-01T00:00:00Z"},
            {"id": "deck-bio", "name": "Biology", "trashed?": null, "archived?": false},
            {"id": "deck-general", "name": "General"}
        ]
    })
}

async fn list_decks(State(mock): State<Arc<MockMochi>>, headers: HeaderMap) -> Response {
    mock.listings.fetch_add(1, Ordering::SeqCst);
    record_auth(&mock, &headers);
    if !mock.listing_status.is_success() {
        return (mock.listing_status, Json(json!({"errors": ["listing refused"]}))).into_response();
    }
    Json(mock.decks.clone()).into_response()
}

async fn create_card(
    State(mock): State<Arc<MockMochi>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let position = mock.calls.fetch_add(1, Ordering::SeqCst);
    record_auth(&mock, &headers);
    let front = body["content"]
        .as_str()
        .and_then(|content| content.split("\n---\n").next())
        .unwrap_or_default()
        .to_string();
    mock.created.lock().unwrap().push(body);
    if mock.stagger_ms > 0 {
        let steps = 20u64.saturating_sub(position as u64);
        tokio::time::sleep(Duration::from_millis(steps * mock.stagger_ms)).await;
    }
    if mock.fail_positions.contains(&position) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"errors": {"content": "is invalid"}})),
        )
            .into_response();
    }
    Json(json!({"id": front})).into_response()
}

fn record_auth(mock: &MockMochi, headers: &HeaderMap) {
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        mock.auth_headers.lock().unwrap().push(value.to_string());
    }
}

pub async fn spawn_mochi(mock: MockMochi) -> (String, Arc<MockMochi>) {
    let mock = Arc::new(mock);
    let router = Router::new()
        .route("/decks/", get(list_decks))
        .route("/cards/", post(create_card))
        .with_state(mock.clone());
    (spawn(router).await, mock)
}

/// Stand-in for the completion API: replies with a fixed text block.
pub struct MockCompletion {
    pub reply_text: String,
    pub status: StatusCode,
    pub requests: Mutex<Vec<(HeaderMap, Value)>>,
}

impl MockCompletion {
    pub fn replying(text: &str) -> Self {
        Self {
            reply_text: text.to_string(),
            status: StatusCode::OK,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(status: StatusCode) -> Self {
        Self {
            reply_text: String::new(),
            status,
            requests: Mutex::new(Vec::new()),
        }
    }
}

async fn anthropic_messages(
    State(mock): State<Arc<MockCompletion>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mock.requests.lock().unwrap().push((headers, body));
    if !mock.status.is_success() {
        return (mock.status, Json(json!({"error": {"message": "overloaded"}}))).into_response();
    }
    Json(json!({
        "id": "msg_1",
        "type": "message",
        "content": [{"type": "text", "text": mock.reply_text}]
    }))
    .into_response()
}

async fn openai_completions(
    State(mock): State<Arc<MockCompletion>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    mock.requests.lock().unwrap().push((headers, body));
    if !mock.status.is_success() {
        return (mock.status, "upstream unavailable").into_response();
    }
    Json(json!({
        "choices": [{"message": {"role": "assistant", "content": mock.reply_text}}]
    }))
    .into_response()
}

pub async fn spawn_completion(mock: MockCompletion) -> (String, Arc<MockCompletion>) {
    let mock = Arc::new(mock);
    let router = Router::new()
        .route("/messages", post(anthropic_messages))
        .route("/chat/completions", post(openai_completions))
        .with_state(mock.clone());
    (spawn(router).await, mock)
}
