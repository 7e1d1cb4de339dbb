//! # Gateway Bridge Server
//!
//! WebSocket front door for an HTTP chat gateway. Every text message a
//! client sends is forwarded to the configured gateway endpoint and the
//! gateway's reply is pushed back to that same client, bracketed by typing
//! indicators.
//!
//! ## Lifecycle:
//! 1. Load `.env`, then layered configuration (defaults, JSON file, env/CLI).
//! 2. Initialise `tracing` (console + rolling JSON file).
//! 3. Bind the client listener (plain WS, or WSS when TLS paths are set).
//! 4. Serve until SIGINT/SIGTERM, then stop accepting and wait for open
//!    connections to close, bounded by the shutdown limit.

use anyhow::Result;
use tokio_graceful::Shutdown;
use tracing::{error, info, warn};

use servers::bridge_logic::{config, downstream, logger, state::AppState, upstream::GatewayClient};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config()?;
    let _log_guard = logger::setup_logging(&config.log_dir, &config.log_level)?;

    info!(
        listen = %config.listen_addr,
        gateway = %config.gateway.base_url,
        path = %config.gateway.path,
        method = %config.gateway.method,
        timeout_ms = config.gateway.request_timeout.as_millis() as u64,
        tls = config.tls.is_some(),
        "Gateway bridge starting"
    );
    if config.gateway.token.is_none() {
        warn!("No gateway token configured; requests are sent without an Authorization header.");
    }

    if config.tls.is_some() {
        // Rustls 0.23+ requires an explicit crypto provider.
        rustls::crypto::ring::default_provider()
            .install_default()
            .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;
    }

    let gateway = GatewayClient::new(config.gateway.clone())?;
    let listener = downstream::bind(&config).await?;

    let shutdown = Shutdown::default();
    let app_state = AppState::new(gateway, shutdown.guard_weak());

    shutdown.spawn_task_fn(move |guard| async move {
        if let Err(e) = downstream::run(listener, app_state, guard).await {
            error!(error = %e, "Downstream server failed");
            // Nothing left to serve; don't sit waiting for a signal.
            std::process::exit(1);
        }
    });

    match shutdown.shutdown_with_limit(config.shutdown_timeout).await {
        Ok(elapsed) => {
            info!(
                "shutdown: gracefully {}s after shutdown signal received",
                elapsed.as_secs_f64()
            );
        }
        Err(e) => {
            warn!("shutdown: forcefully due to timeout: {}", e);
        }
    }

    info!("Bridge server closed.");
    Ok(())
}
