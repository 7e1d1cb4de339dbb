use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while assembling the bridge at startup.
///
/// Everything that can go wrong once connections are being served is
/// degraded into a client-visible reply instead, so this type never crosses
/// a connection boundary.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Invalid gateway URL '{url}': {reason}")]
    InvalidGatewayUrl { url: String, reason: String },

    #[error("Invalid gateway method '{0}'")]
    InvalidGatewayMethod(String),

    #[error("Request timeout must be greater than zero")]
    ZeroRequestTimeout,

    #[error("TLS requires both a certificate and a key path (got cert: {cert:?}, key: {key:?})")]
    IncompleteTls {
        cert: Option<PathBuf>,
        key: Option<PathBuf>,
    },

    #[error("Failed to load TLS material: {0}")]
    Tls(#[source] std::io::Error),

    #[error("Invalid listen address '{0}'")]
    InvalidListenAddress(String),

    #[error("I/O error occurred: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single upstream gateway call.
///
/// Never surfaced to clients: [`crate::bridge_logic::upstream::GatewayClient`]
/// maps every variant to a fixed fallback reply.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] anyhow::Error),

    #[error("gateway answered with HTTP {status}: {body}")]
    Status { status: u16, body: String },
}
