//! # Bridge Test Harness
//!
//! Support code for the end-to-end tests in `tests/`. It provides:
//!
//! - a fake upstream gateway (an axum app on an ephemeral port) whose reply,
//!   status and latency are scripted per test, and which records every call;
//! - an in-process bridge wired to that gateway, whose graceful shutdown the
//!   test can trigger;
//! - a small WebSocket client wrapper that reads outbound events as JSON.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_graceful::Shutdown;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use servers::bridge_logic::{
    config::ConfigArgs,
    downstream::{self, Listener},
    state::AppState,
    upstream::GatewayClient,
};

pub const GATEWAY_PATH: &str = "/api/message";
pub const GATEWAY_TOKEN: &str = "test-token";

/// How long a test waits for an expected event before failing.
const EVENT_WAIT: Duration = Duration::from_secs(5);

/// What the fake gateway answers.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Fixed status and body.
    Fixed { status: u16, body: String },
    /// `{"reply": "echo: <message>"}`.
    Echo,
}

#[derive(Debug, Clone)]
pub struct FakeBehavior {
    pub reply: Reply,
    pub delay: Duration,
}

impl FakeBehavior {
    pub fn json(body: Value) -> Self {
        Self::raw(body.to_string())
    }

    pub fn raw(body: impl Into<String>) -> Self {
        FakeBehavior {
            reply: Reply::Fixed {
                status: 200,
                body: body.into(),
            },
            delay: Duration::ZERO,
        }
    }

    pub fn echo() -> Self {
        FakeBehavior {
            reply: Reply::Echo,
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// One request as seen by the fake gateway.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub authorization: Option<String>,
    pub body: Value,
}

#[derive(Clone)]
struct FakeState {
    behavior: FakeBehavior,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

pub struct FakeGateway {
    pub addr: SocketAddr,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl FakeGateway {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

async fn fake_handler(State(state): State<FakeState>, headers: HeaderMap, body: String) -> (StatusCode, String) {
    let parsed: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    if let Ok(mut calls) = state.calls.lock() {
        calls.push(RecordedCall {
            authorization,
            body: parsed.clone(),
        });
    }

    if !state.behavior.delay.is_zero() {
        tokio::time::sleep(state.behavior.delay).await;
    }

    match &state.behavior.reply {
        Reply::Fixed { status, body } => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body.clone(),
        ),
        Reply::Echo => {
            let text = parsed["message"].as_str().unwrap_or_default();
            (StatusCode::OK, json!({ "reply": format!("echo: {text}") }).to_string())
        }
    }
}

pub async fn spawn_fake_gateway(behavior: FakeBehavior) -> FakeGateway {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route(GATEWAY_PATH, post(fake_handler))
        .with_state(FakeState {
            behavior,
            calls: Arc::clone(&calls),
        });

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake gateway");
    let addr = listener.local_addr().expect("fake gateway addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake gateway serve");
    });

    FakeGateway { addr, calls }
}

/// A gateway URL nothing listens on.
pub fn unreachable_gateway_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind temp port");
    let addr = listener.local_addr().expect("temp port addr");
    drop(listener);
    format!("http://{}", addr)
}

pub struct TestBridge {
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown: Option<Shutdown>,
    // Firing (or dropping) this starts graceful shutdown.
    trigger: Option<oneshot::Sender<()>>,
}

impl TestBridge {
    /// Signals shutdown and returns a task that resolves with the elapsed
    /// time once every connection has closed, or `None` past `limit`.
    pub fn begin_shutdown(&mut self, limit: Duration) -> JoinHandle<Option<Duration>> {
        if let Some(trigger) = self.trigger.take() {
            let _ = trigger.send(());
        }
        let shutdown = self.shutdown.take().expect("shutdown already started");
        tokio::spawn(async move { shutdown.shutdown_with_limit(limit).await.ok() })
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn spawn_bridge(gateway_url: String, request_timeout: Duration) -> TestBridge {
    let config = ConfigArgs {
        gateway_url: Some(gateway_url),
        gateway_path: Some(GATEWAY_PATH.to_string()),
        gateway_token: Some(GATEWAY_TOKEN.to_string()),
        request_timeout_ms: Some(request_timeout.as_millis() as u64),
        ..ConfigArgs::defaults()
    }
    .resolve()
    .expect("test config resolves");

    let gateway = GatewayClient::new(config.gateway).expect("gateway client");
    let (trigger, signal) = oneshot::channel::<()>();
    let shutdown = Shutdown::new(async move {
        let _ = signal.await;
    });
    let state = AppState::new(gateway, shutdown.guard_weak());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind bridge");
    let addr = listener.local_addr().expect("bridge addr");
    let serve_state = state.clone();
    shutdown.spawn_task_fn(move |guard| async move {
        downstream::run(Listener::Plain(listener), serve_state, guard)
            .await
            .expect("bridge serve");
    });

    TestBridge {
        addr,
        state,
        shutdown: Some(shutdown),
        trigger: Some(trigger),
    }
}

pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    pub async fn connect(url: &str) -> Self {
        Self::try_connect(url).await.expect("ws connect")
    }

    pub async fn try_connect(url: &str) -> Option<Self> {
        let (ws, _resp) = connect_async(url).await.ok()?;
        Some(TestClient { ws })
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_owned().into()))
            .await
            .expect("ws send");
    }

    pub async fn send_binary(&mut self, bytes: Vec<u8>) {
        self.ws.send(Message::Binary(bytes.into())).await.expect("ws send");
    }

    pub async fn send_json(&mut self, value: Value) {
        self.send_text(&value.to_string()).await;
    }

    /// Next outbound event, skipping control frames. Panics after a few
    /// seconds without one.
    pub async fn next_event(&mut self) -> Value {
        self.try_next_event(EVENT_WAIT)
            .await
            .expect("expected an event from the bridge")
    }

    /// Next outbound event within `wait`, or `None`.
    pub async fn try_next_event(&mut self, wait: Duration) -> Option<Value> {
        let read = async {
            while let Some(msg) = self.ws.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        return Some(serde_json::from_str(text.as_str()).expect("event is JSON"));
                    }
                    Ok(Message::Close(_)) | Err(_) => return None,
                    Ok(_) => continue,
                }
            }
            None
        };
        tokio::time::timeout(wait, read).await.ok().flatten()
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }

    /// Closes from the client side and reports whether the bridge answered
    /// with its own Close frame.
    pub async fn close_handshake(mut self) -> bool {
        if self.ws.close(None).await.is_err() {
            return false;
        }
        let reply = async {
            while let Some(msg) = self.ws.next().await {
                match msg {
                    Ok(Message::Close(_)) => return true,
                    Ok(_) => continue,
                    Err(_) => return false,
                }
            }
            false
        };
        tokio::time::timeout(EVENT_WAIT, reply).await.unwrap_or(false)
    }
}
