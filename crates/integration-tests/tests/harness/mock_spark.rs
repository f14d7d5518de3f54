//! Mock Spark WebSocket endpoint for integration tests
//!
//! Rejects handshakes without the signed query parameters, records the
//! request frame, then replays scripted response frames.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct MockSparkState {
    frames: Arc<Vec<Value>>,
    received: Arc<Mutex<Option<Value>>>,
}

/// Mock Spark chat endpoint
pub struct MockSpark {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: MockSparkState,
}

impl MockSpark {
    /// Start a mock replaying `frames` on every connection
    pub async fn start(frames: Vec<Value>) -> anyhow::Result<Self> {
        let state = MockSparkState {
            frames: Arc::new(frames),
            received: Arc::new(Mutex::new(None)),
        };
        let app = Router::new()
            .route("/v3.5/chat", get(handshake))
            .with_state(state.clone());

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

    /// WebSocket endpoint URL
    pub fn endpoint(&self) -> String {
        format!("ws://{}/v3.5/chat", self.addr)
    }

    /// Last request frame received
    pub fn received(&self) -> Option<Value> {
        self.state.received.lock().unwrap().clone()
    }
}

impl Drop for MockSpark {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Response frame with one text fragment
///
/// `status` 0 opens, 1 continues and 2 closes the exchange.
pub fn frame(status: u8, content: &str) -> Value {
    json!({
        "header": {"code": 0, "message": "Success", "sid": "cht-int", "status": status},
        "payload": {
            "choices": {"status": status, "seq": 0, "text": [{"content": content, "role": "assistant", "index": 0}]}
        }
    })
}

/// Closing frame carrying usage
pub fn last_frame(content: &str, prompt_tokens: u32, completion_tokens: u32) -> Value {
    let mut last = frame(2, content);
    last["payload"]["usage"] = json!({"text": {
        "prompt_tokens": prompt_tokens,
        "completion_tokens": completion_tokens,
        "total_tokens": prompt_tokens + completion_tokens
    }});
    last
}

async fn handshake(
    ws: WebSocketUpgrade,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<MockSparkState>,
) -> Response {
    if !["authorization", "date", "host"].iter().all(|k| query.contains_key(*k)) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| replay(socket, state))
}

async fn replay(mut socket: WebSocket, state: MockSparkState) {
    let Some(Ok(Message::Text(request))) = socket.recv().await else {
        return;
    };
    *state.received.lock().unwrap() = serde_json::from_str(request.as_str()).ok();

    for frame in state.frames.iter() {
        if socket.send(Message::Text(frame.to_string().into())).await.is_err() {
            return;
        }
    }
}
