use axum::{
    Router,
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use axum_server::tls_rustls::RustlsConfig;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_graceful::ShutdownGuard;
use tracing::{debug, error, info, warn};

use crate::bridge_logic::config::Config;
use crate::bridge_logic::error::BridgeError;
use crate::bridge_logic::model::{PROCESSING_FAILED, ServerEvent};
use crate::bridge_logic::relay::relay_message;
use crate::bridge_logic::state::AppState;

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

/// How long a finished connection may spend completing its close handshake.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// A bound (plain) or ready-to-bind (TLS) client listener.
pub enum Listener {
    Plain(TcpListener),
    Tls { addr: SocketAddr, tls: RustlsConfig },
}

/// Prepares the client listener so that startup problems (port in use,
/// unreadable certificates) surface before the server task is spawned.
pub async fn bind(config: &Config) -> Result<Listener, BridgeError> {
    match &config.tls {
        Some(paths) => {
            let tls = RustlsConfig::from_pem_file(&paths.cert_path, &paths.key_path)
                .await
                .map_err(BridgeError::Tls)?;
            Ok(Listener::Tls {
                addr: config.listen_addr,
                tls,
            })
        }
        None => Ok(Listener::Plain(TcpListener::bind(config.listen_addr).await?)),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serves the bridge until `shutdown` resolves, then stops accepting.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

pub async fn run(listener: Listener, state: AppState, guard: ShutdownGuard) -> std::io::Result<()> {
    let signal_guard = guard.clone();
    let stop_accepting = async move {
        signal_guard.cancelled().await;
        info!("Downstream server shutting down, no longer accepting connections.");
    };

    match listener {
        Listener::Plain(listener) => {
            info!("Bridge listening on ws://{}", listener.local_addr()?);
            serve(listener, state, stop_accepting).await
        }
        Listener::Tls { addr, tls } => {
            info!("Bridge listening on wss://{}", addr);
            let handle = axum_server::Handle::new();
            let signal_handle = handle.clone();
            tokio::spawn(async move {
                stop_accepting.await;
                signal_handle.graceful_shutdown(None);
            });

            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(router(state).into_make_service_with_connect_info::<SocketAddr>())
                .await
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn handle_socket(socket: WebSocket, state: AppState, addr: SocketAddr) {
    // Held until the connection ends so graceful shutdown waits for it.
    let _shutdown_guard = state.shutdown_guard();

    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    state.add_client(client_id, addr).await;
    info!(client_id, %addr, "Client connected");

    let (mut sink, mut stream) = socket.split();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ServerEvent>();
    let (close_tx, mut close_rx) = oneshot::channel::<()>();

    // Single writer: relay tasks only ever push into the channel.
    let mut writer = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = &mut close_rx => break,
                event = event_rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            let json_str = match serde_json::to_string(&event) {
                Ok(s) => s,
                Err(e) => {
                    error!(client_id, error = %e, "Failed to serialize event");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(json_str.into())).await {
                debug!(client_id, error = %e, "Send failed, client gone");
                return;
            }
        }
        // Flushes the close reply queued for the peer's Close frame.
        if let Err(e) = sink.close().await {
            debug!(client_id, error = %e, "Close handshake not completed");
        }
    });

    let _ = event_tx.send(ServerEvent::connected());
    let gateway = state.gateway();

    while let Some(msg) = stream.next().await {
        let raw = match msg {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(e) => {
                    warn!(client_id, error = %e, "Binary frame is not UTF-8");
                    let _ = event_tx.send(ServerEvent::error(PROCESSING_FAILED));
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(client_id, error = %e, "WebSocket error");
                break;
            }
        };

        // No per-connection queue: overlapping messages run concurrently.
        let gateway = Arc::clone(&gateway);
        let events = event_tx.clone();
        tokio::spawn(async move {
            let outcome = relay_message(client_id, &raw, &gateway, &events).await;
            debug!(client_id, ?outcome, "Relay cycle finished");
        });
    }

    state.remove_client(client_id).await;
    let _ = close_tx.send(());
    if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    info!(client_id, %addr, "Client disconnected");
}
