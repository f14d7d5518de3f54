//! Mock OpenAI-compatible vendor for integration tests
//!
//! Serves `/chat/completions` in both shapes. Blocking replies echo the last
//! user message so concurrent callers can tell their answers apart.
//! Streaming replies replay a scripted list of SSE data payloads.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// Request captured by the mock
#[derive(Debug, Clone)]
pub struct Received {
    /// `Authorization` header, if sent
    pub authorization: Option<String>,
    /// JSON body
    pub body: Value,
}

/// Mock vendor returning predictable responses
pub struct MockVendor {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockVendorState>,
}

struct MockVendorState {
    request_count: AtomicU32,
    /// Requests to reject with 429 before succeeding
    fail_count: AtomicU32,
    received: Mutex<Vec<Received>>,
    /// SSE data payloads replayed for streaming requests
    stream_script: Vec<String>,
}

impl MockVendor {
    /// Start with the default stream script
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(0, default_script()).await
    }

    /// Start a mock that rejects the first `n` requests with 429
    pub async fn start_failing(n: u32) -> anyhow::Result<Self> {
        Self::start_inner(n, default_script()).await
    }

    /// Start a mock that streams the given data payloads verbatim
    pub async fn start_streaming(script: Vec<String>) -> anyhow::Result<Self> {
        Self::start_inner(0, script).await
    }

    async fn start_inner(fail_count: u32, stream_script: Vec<String>) -> anyhow::Result<Self> {
        let state = Arc::new(MockVendorState {
            request_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(fail_count),
            received: Mutex::new(Vec::new()),
            stream_script,
        });

        let app = Router::new()
            .route("/chat/completions", routing::post(handle_chat_completions))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for a provider or fallback table
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of completion requests received
    pub fn request_count(&self) -> u32 {
        self.state.request_count.load(Ordering::Relaxed)
    }

    /// Requests received so far, oldest first
    pub fn received(&self) -> Vec<Received> {
        self.state.received.lock().unwrap().clone()
    }
}

impl Drop for MockVendor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Two content frames, a finish frame, a usage-only frame, then `[DONE]`
fn default_script() -> Vec<String> {
    vec![
        content_frame("Hello"),
        content_frame(" world"),
        json!({"id": "chatcmpl-mock", "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}).to_string(),
        json!({"id": "chatcmpl-mock", "choices": [], "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}})
            .to_string(),
        "[DONE]".to_owned(),
    ]
}

/// Frame carrying one content delta
pub fn content_frame(text: &str) -> String {
    json!({"id": "chatcmpl-mock", "choices": [{"index": 0, "delta": {"content": text}}]}).to_string()
}

/// Frame carrying one tool call fragment
pub fn tool_frame(id: Option<&str>, name: Option<&str>, arguments: &str) -> String {
    let mut call = json!({"index": 0, "function": {"arguments": arguments}});
    if let Some(id) = id {
        call["id"] = json!(id);
        call["type"] = json!("function");
    }
    if let Some(name) = name {
        call["function"]["name"] = json!(name);
    }
    json!({"id": "chatcmpl-tools", "choices": [{"index": 0, "delta": {"tool_calls": [call]}}]}).to_string()
}

fn last_user_text(body: &Value) -> String {
    body["messages"]
        .as_array()
        .and_then(|messages| messages.iter().rev().find(|m| m["role"] == "user"))
        .and_then(|m| m["content"].as_str())
        .unwrap_or_default()
        .to_owned()
}

async fn handle_chat_completions(
    State(state): State<Arc<MockVendorState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.request_count.fetch_add(1, Ordering::Relaxed);
    state.received.lock().unwrap().push(Received {
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        body: body.clone(),
    });

    let remaining = state.fail_count.load(Ordering::Relaxed);
    if remaining > 0 {
        state.fail_count.fetch_sub(1, Ordering::Relaxed);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": {"message": "rate limit reached", "type": "rate_limit_error"}})),
        )
            .into_response();
    }

    if body["stream"] == true {
        let sse: String = state
            .stream_script
            .iter()
            .map(|data| format!("data: {data}\n\n"))
            .collect();
        return ([(header::CONTENT_TYPE, "text/event-stream")], sse).into_response();
    }

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": body["model"],
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": format!("echo: {}", last_user_text(&body))},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
    }))
    .into_response()
}
