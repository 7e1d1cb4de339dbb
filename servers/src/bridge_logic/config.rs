use clap::Parser;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bridge_logic::error::BridgeError;

const DEFAULT_CONFIG_FILE: &str = "server_bridge.conf";

/// One configuration layer. Every field is optional so that defaults, the
/// JSON config file and the command line (which includes environment
/// variables) can be stacked on top of each other.
#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[command(about = "WebSocket to HTTP gateway bridge", version)]
#[serde(rename_all = "camelCase")]
pub struct ConfigArgs {
    #[arg(long, env = "BRIDGE_HOST", help = "Address to listen on for client connections.")]
    pub host: Option<String>,

    #[arg(long, env = "BRIDGE_PORT", help = "Port to listen on for client connections.")]
    pub port: Option<u16>,

    #[arg(long, env = "BRIDGE_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[arg(long, env = "BRIDGE_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[arg(long, env = "BRIDGE_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[arg(long, env = "GATEWAY_URL", help = "Base URL of the upstream gateway; any path prefix is kept in front of the gateway path.")]
    pub gateway_url: Option<String>,

    #[arg(long, env = "GATEWAY_PATH", help = "Path of the gateway endpoint that answers messages.")]
    pub gateway_path: Option<String>,

    #[arg(long, env = "GATEWAY_METHOD", help = "HTTP method used for the gateway call.")]
    pub gateway_method: Option<String>,

    #[arg(long, env = "GATEWAY_TOKEN", help = "Bearer token sent to the gateway.")]
    pub gateway_token: Option<String>,

    #[arg(long, env = "GATEWAY_SESSION_KEY", help = "Session key forwarded with every message.")]
    pub session_key: Option<String>,

    #[arg(long, env = "GATEWAY_TIMEOUT_MS", help = "Deadline in milliseconds for one gateway call.")]
    pub request_timeout_ms: Option<u64>,

    #[arg(long, env = "BRIDGE_SHUTDOWN_TIMEOUT_SECS", help = "Seconds to wait for open connections on shutdown.")]
    pub shutdown_timeout_secs: Option<u64>,

    #[arg(long, env = "TLS_CERT_PATH", help = "Path to the TLS certificate file.")]
    pub tls_cert_path: Option<PathBuf>,

    #[arg(long, env = "TLS_KEY_PATH", help = "Path to the TLS private key file.")]
    pub tls_key_path: Option<PathBuf>,
}

impl ConfigArgs {
    /// Built-in defaults, the bottom layer.
    pub fn defaults() -> Self {
        ConfigArgs {
            host: Some("0.0.0.0".to_string()),
            port: Some(3737),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            gateway_url: Some("http://localhost:18789".to_string()),
            gateway_path: Some("/api/message".to_string()),
            gateway_method: Some("POST".to_string()),
            session_key: Some("bridge".to_string()),
            request_timeout_ms: Some(30_000),
            shutdown_timeout_secs: Some(10),
            ..Default::default()
        }
    }

    // 'other' overrides 'self' for Some values
    pub fn merge(self, other: ConfigArgs) -> ConfigArgs {
        ConfigArgs {
            host: other.host.or(self.host),
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            gateway_url: other.gateway_url.or(self.gateway_url),
            gateway_path: other.gateway_path.or(self.gateway_path),
            gateway_method: other.gateway_method.or(self.gateway_method),
            gateway_token: other.gateway_token.or(self.gateway_token),
            session_key: other.session_key.or(self.session_key),
            request_timeout_ms: other.request_timeout_ms.or(self.request_timeout_ms),
            shutdown_timeout_secs: other.shutdown_timeout_secs.or(self.shutdown_timeout_secs),
            tls_cert_path: other.tls_cert_path.or(self.tls_cert_path),
            tls_key_path: other.tls_key_path.or(self.tls_key_path),
        }
    }

    /// Validates the stacked layers into the immutable [`Config`].
    pub fn resolve(self) -> Result<Config, BridgeError> {
        let defaults = ConfigArgs::defaults();

        let host = self.host.or(defaults.host).unwrap_or_default();
        let ip: IpAddr = host
            .parse()
            .map_err(|_| BridgeError::InvalidListenAddress(host.clone()))?;
        let port = self.port.or(defaults.port).unwrap_or_default();

        let base_url = self.gateway_url.or(defaults.gateway_url).unwrap_or_default();
        Url::parse(&base_url).map_err(|e| BridgeError::InvalidGatewayUrl {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;

        let method_name = self
            .gateway_method
            .or(defaults.gateway_method)
            .unwrap_or_default()
            .to_uppercase();
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| BridgeError::InvalidGatewayMethod(method_name.clone()))?;

        let request_timeout_ms = self
            .request_timeout_ms
            .or(defaults.request_timeout_ms)
            .unwrap_or_default();
        if request_timeout_ms == 0 {
            return Err(BridgeError::ZeroRequestTimeout);
        }

        let tls = match (self.tls_cert_path, self.tls_key_path) {
            (Some(cert_path), Some(key_path)) => Some(TlsPaths { cert_path, key_path }),
            (None, None) => None,
            (cert, key) => return Err(BridgeError::IncompleteTls { cert, key }),
        };

        Ok(Config {
            listen_addr: SocketAddr::new(ip, port),
            log_dir: self.log_dir.or(defaults.log_dir).unwrap_or_default(),
            log_level: self.log_level.or(defaults.log_level).unwrap_or_default(),
            gateway: GatewayConfig {
                base_url,
                path: self.gateway_path.or(defaults.gateway_path).unwrap_or_default(),
                method,
                token: self.gateway_token.filter(|t| !t.trim().is_empty()),
                session_key: self.session_key.or(defaults.session_key).unwrap_or_default(),
                request_timeout: Duration::from_millis(request_timeout_ms),
            },
            shutdown_timeout: Duration::from_secs(
                self.shutdown_timeout_secs
                    .or(defaults.shutdown_timeout_secs)
                    .unwrap_or_default(),
            ),
            tls,
        })
    }
}

/// Everything the upstream call needs. Fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub path: String,
    pub method: Method,
    pub token: Option<String>,
    pub session_key: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Resolved, immutable bridge configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub gateway: GatewayConfig,
    pub shutdown_timeout: Duration,
    pub tls: Option<TlsPaths>,
}

/// Reads one JSON config layer. A missing, unreadable or malformed file
/// yields `None` so the remaining layers still apply.
pub fn read_config_file(path: &Path) -> Option<ConfigArgs> {
    if !path.exists() {
        return None;
    }

    let config_str = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            // Logging is not initialised yet at this point.
            eprintln!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<ConfigArgs>(&config_str) {
        Ok(file_config) => Some(file_config),
        Err(e) => {
            eprintln!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// Builds the process configuration: defaults, then the config file, then
/// environment variables and CLI arguments.
pub fn load_config() -> Result<Config, BridgeError> {
    let cli_args = ConfigArgs::parse();

    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut layered = ConfigArgs::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        layered = layered.merge(file_config);
    }

    layered.merge(cli_args).resolve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_resolve() {
        let config = ConfigArgs::defaults().resolve().unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:3737".parse().unwrap());
        assert_eq!(config.gateway.base_url, "http://localhost:18789");
        assert_eq!(config.gateway.path, "/api/message");
        assert_eq!(config.gateway.method, Method::POST);
        assert_eq!(config.gateway.token, None);
        assert_eq!(config.gateway.request_timeout, Duration::from_secs(30));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert!(config.tls.is_none());
    }

    #[test]
    fn later_layers_win() {
        let file = ConfigArgs {
            port: Some(4000),
            gateway_token: Some("from-file".into()),
            ..Default::default()
        };
        let cli = ConfigArgs::parse_from(["server_bridge", "--gateway-token", "from-cli", "--gateway-method", "put"]);

        let config = ConfigArgs::defaults().merge(file).merge(cli).resolve().unwrap();

        assert_eq!(config.listen_addr.port(), 4000);
        assert_eq!(config.gateway.token.as_deref(), Some("from-cli"));
        assert_eq!(config.gateway.method, Method::PUT);
    }

    #[test]
    fn blank_token_means_no_token() {
        let args = ConfigArgs {
            gateway_token: Some("  ".into()),
            ..ConfigArgs::defaults()
        };
        assert_eq!(args.resolve().unwrap().gateway.token, None);
    }

    #[test]
    fn rejects_bad_values() {
        let bad_url = ConfigArgs {
            gateway_url: Some("localhost without scheme".into()),
            ..ConfigArgs::defaults()
        };
        assert!(matches!(bad_url.resolve(), Err(BridgeError::InvalidGatewayUrl { .. })));

        let zero_timeout = ConfigArgs {
            request_timeout_ms: Some(0),
            ..ConfigArgs::defaults()
        };
        assert!(matches!(zero_timeout.resolve(), Err(BridgeError::ZeroRequestTimeout)));

        let bad_host = ConfigArgs {
            host: Some("not-an-ip".into()),
            ..ConfigArgs::defaults()
        };
        assert!(matches!(bad_host.resolve(), Err(BridgeError::InvalidListenAddress(_))));

        let half_tls = ConfigArgs {
            tls_cert_path: Some(PathBuf::from("fullchain.pem")),
            ..ConfigArgs::defaults()
        };
        assert!(matches!(half_tls.resolve(), Err(BridgeError::IncompleteTls { .. })));
    }

    #[test]
    fn reads_camel_case_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 9100, "gatewayUrl": "http://10.0.0.5:18789", "requestTimeoutMs": 5000}}"#).unwrap();

        let layer = read_config_file(file.path()).unwrap();
        let config = ConfigArgs::defaults().merge(layer).resolve().unwrap();

        assert_eq!(config.listen_addr.port(), 9100);
        assert_eq!(config.gateway.base_url, "http://10.0.0.5:18789");
        assert_eq!(config.gateway.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn malformed_or_missing_file_is_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(read_config_file(file.path()).is_none());

        let dir = tempfile::tempdir().unwrap();
        assert!(read_config_file(&dir.path().join("absent.conf")).is_none());
    }
}
