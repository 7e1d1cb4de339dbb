use lib_common::utils::clock::now_millis;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_graceful::{ShutdownGuard, WeakShutdownGuard};

use crate::bridge_logic::upstream::GatewayClient;

/// What the registry remembers about an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub addr: SocketAddr,
    /// Milliseconds since the Unix epoch.
    pub connected_at: i64,
}

#[derive(Clone)]
pub struct AppState {
    // Map of client_id -> connection details, for open connections only
    clients: Arc<Mutex<HashMap<usize, ClientInfo>>>,
    // Shared by every relay cycle of every connection
    gateway: Arc<GatewayClient>,
    // Connections upgrade this so shutdown waits for them to close
    shutdown: WeakShutdownGuard,
}

impl AppState {
    pub fn new(gateway: GatewayClient, shutdown: WeakShutdownGuard) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            gateway: Arc::new(gateway),
            shutdown,
        }
    }

    pub fn gateway(&self) -> Arc<GatewayClient> {
        Arc::clone(&self.gateway)
    }

    /// A guard that keeps graceful shutdown waiting while it is alive.
    pub fn shutdown_guard(&self) -> ShutdownGuard {
        self.shutdown.clone().upgrade()
    }

    pub async fn add_client(&self, client_id: usize, addr: SocketAddr) {
        let mut clients = self.clients.lock().await;
        clients.insert(
            client_id,
            ClientInfo {
                addr,
                connected_at: now_millis(),
            },
        );
    }

    pub async fn remove_client(&self, client_id: usize) -> Option<ClientInfo> {
        let mut clients = self.clients.lock().await;
        clients.remove(&client_id)
    }

    pub async fn client_count(&self) -> usize {
        self.clients.lock().await.len()
    }
}
