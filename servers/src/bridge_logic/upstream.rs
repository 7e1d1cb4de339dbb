use lib_common::retrieve::ky_http::ApiClient;
use lib_common::utils::text::{clean_output, preview};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::bridge_logic::config::GatewayConfig;
use crate::bridge_logic::error::{BridgeError, GatewayError};
use crate::bridge_logic::model::{GatewayReply, GatewayRequest};

pub const GATEWAY_ERROR_REPLY: &str = "Error communicating with gateway";
pub const TIMEOUT_REPLY: &str = "Request timed out";
pub const EMPTY_REPLY: &str = "No response";

/// Client for the single upstream gateway endpoint.
///
/// [`GatewayClient::send`] never fails: transport faults, bad statuses and
/// timeouts all resolve to a fixed reply string.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    api: ApiClient,
    config: GatewayConfig,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self, BridgeError> {
        let api = ApiClient::new(&config.base_url, config.token.clone()).map_err(|e| {
            BridgeError::InvalidGatewayUrl {
                url: config.base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { api, config })
    }

    /// Forwards `text` and returns the cleaned reply.
    ///
    /// The call races the configured deadline. If the deadline wins, the
    /// request future is dropped, which aborts the HTTP exchange, and
    /// [`TIMEOUT_REPLY`] is returned.
    pub async fn send(&self, text: &str) -> String {
        match timeout(self.config.request_timeout, self.call(text)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(error = %e, "Gateway call failed");
                GATEWAY_ERROR_REPLY.to_string()
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.request_timeout.as_millis() as u64,
                    "Gateway call timed out"
                );
                TIMEOUT_REPLY.to_string()
            }
        }
    }

    async fn call(&self, text: &str) -> Result<String, GatewayError> {
        let body = GatewayRequest {
            message: text,
            session_key: &self.config.session_key,
        };

        let res = self
            .api
            .request(self.config.method.clone(), &self.config.path, None, Some(body))
            .await?;

        if !res.success {
            return Err(GatewayError::Status {
                status: res.status,
                body: preview(&res.body, 200).to_string(),
            });
        }

        debug!(status = res.status, bytes = res.body.len(), "Gateway replied");
        Ok(reply_text(&res.body))
    }
}

/// Extracts the reply from a gateway body: `reply`, then `message`, then
/// the raw body. The result is cleaned of terminal escapes; an empty result
/// becomes [`EMPTY_REPLY`].
pub fn reply_text(body: &str) -> String {
    let raw = serde_json::from_str::<GatewayReply>(body)
        .ok()
        .and_then(GatewayReply::into_text)
        .unwrap_or_else(|| body.to_string());

    let cleaned = clean_output(&raw);
    if cleaned.is_empty() {
        EMPTY_REPLY.to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, routing::post};
    use reqwest::Method;
    use std::time::Duration;

    fn gateway_config(base_url: String, request_timeout: Duration) -> GatewayConfig {
        GatewayConfig {
            base_url,
            path: "/api/message".to_string(),
            method: Method::POST,
            token: Some("token".to_string()),
            session_key: "bridge".to_string(),
            request_timeout,
        }
    }

    #[test]
    fn reply_field_wins() {
        assert_eq!(reply_text(r#"{"reply":"hello","message":"other"}"#), "hello");
        assert_eq!(reply_text(r#"{"message":"fallback"}"#), "fallback");
    }

    #[test]
    fn unrecognised_body_passes_through() {
        assert_eq!(reply_text("ok"), "ok");
        assert_eq!(reply_text(r#"{"status":"done"}"#), r#"{"status":"done"}"#);
    }

    #[test]
    fn reply_is_cleaned() {
        assert_eq!(reply_text("{\"reply\":\"\\u001b[32mgreen\\u001b[0m \\n\"}"), "green");
        assert_eq!(reply_text("  \x1b[1mbold raw\x1b[0m\n"), "bold raw");
    }

    #[test]
    fn empty_reply_becomes_placeholder() {
        assert_eq!(reply_text(""), EMPTY_REPLY);
        assert_eq!(reply_text("   \n"), EMPTY_REPLY);
        assert_eq!(reply_text(r#"{"reply":"  "}"#), EMPTY_REPLY);
    }

    #[tokio::test]
    async fn unreachable_gateway_yields_fallback() {
        // Grab a free port, then close it so nothing is listening there.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = GatewayClient::new(gateway_config(format!("http://{}", addr), Duration::from_secs(5))).unwrap();
        assert_eq!(client.send("hi").await, GATEWAY_ERROR_REPLY);
    }

    #[tokio::test]
    async fn slow_gateway_times_out() {
        let app = Router::new().route(
            "/api/message",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                r#"{"reply":"too late"}"#
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = GatewayClient::new(gateway_config(format!("http://{}", addr), Duration::from_millis(100))).unwrap();
        assert_eq!(client.send("hi").await, TIMEOUT_REPLY);
    }

    #[tokio::test]
    async fn error_status_yields_fallback() {
        let app = Router::new().route(
            "/api/message",
            post(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, r#"{"reply":"nope"}"#) }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = GatewayClient::new(gateway_config(format!("http://{}", addr), Duration::from_secs(5))).unwrap();
        assert_eq!(client.send("hi").await, GATEWAY_ERROR_REPLY);
    }
}
