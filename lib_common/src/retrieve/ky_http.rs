//! # HTTP Retrieval Utilities
//!
//! This module provides an asynchronous API client wrapper around `reqwest`.
//! It joins request paths onto a fixed base URL, injects a static bearer
//! token, serializes JSON bodies and captures the response body verbatim.
//!
//! The client deliberately performs no retries: every `request` call maps to
//! exactly one HTTP exchange.

use reqwest::{
    header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE},
    Method, Url,
};
use serde::{de::DeserializeOwned, Serialize};

/// A standardized container for API responses.
///
/// The body is kept as text because upstream services do not always honour
/// their declared content type; use [`ApiResponse::json`] to attempt a typed
/// view of it.
#[derive(Debug)]
pub struct ApiResponse {
    /// The raw response body.
    pub body: String,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
}

impl ApiResponse {
    /// Attempts to deserialize the body as JSON into `T`.
    ///
    /// Returns `None` when the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_str(&self.body).ok()
    }
}

/// A flexible asynchronous HTTP client.
///
/// Handles base URLs and authentication tokens so call sites only deal with
/// relative paths and payloads.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// The underlying `reqwest` client (connection pool).
    inner: reqwest::Client,
    /// The base URL to which all paths are joined. Its path always ends in `/`.
    base_url: Url,
    /// An optional Bearer token used for authorization.
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a new `ApiClient` instance.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL for the API (e.g., "http://localhost:18789").
    /// * `auth_token` - An optional token sent as `Authorization: Bearer <token>`.
    ///
    /// # Errors
    /// Returns an error if `base_url` is not a valid absolute URL.
    pub fn new(base_url: &str, auth_token: Option<String>) -> anyhow::Result<Self> {
        let mut url = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("Invalid base URL '{}' (must be absolute): {}", base_url, e))?;
        if !url.path().ends_with('/') {
            let dir = format!("{}/", url.path());
            url.set_path(&dir);
        }

        Ok(Self {
            inner: reqwest::Client::new(),
            base_url: url,
            auth_token,
        })
    }

    /// Performs a generic HTTP request and captures the response.
    ///
    /// A non-2xx status is not an error here: it is reported through
    /// [`ApiResponse::success`] together with the body the server sent.
    ///
    /// # Arguments
    /// * `method` - The HTTP verb (GET, POST, etc.).
    /// * `path` - The path appended to the base URL. A leading `/` does not
    ///   discard the base URL's own path prefix.
    /// * `headers` - Optional additional headers for this specific request.
    /// * `body` - Optional serializable object to send as the JSON body.
    ///
    /// # Errors
    /// Returns an `anyhow::Error` if URL joining, serialization, network
    /// execution or reading the body fails.
    pub async fn request<B>(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> anyhow::Result<ApiResponse>
    where
        B: Serialize,
    {
        let full_url = self.base_url.join(path.trim_start_matches('/'))?;
        let mut req = self.inner.request(method, full_url);

        if let Some(h) = headers {
            req = req.headers(h);
        }

        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(b) = body {
            let json_body = serde_json::to_string(&b)?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let body = response.text().await?;

        Ok(ApiResponse {
            body,
            status: status.as_u16(),
            success: status.is_success(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap as AxumHeaders, http::StatusCode, routing::post, Router};
    use serde_json::{json, Value};
    use std::net::SocketAddr;

    async fn spawn_echo_server() -> SocketAddr {
        async fn echo(headers: AxumHeaders, body: String) -> String {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            json!({ "auth": auth, "body": body }).to_string()
        }

        async fn broken() -> (StatusCode, &'static str) {
            (StatusCode::BAD_GATEWAY, "upstream down")
        }

        let app = Router::new()
            .route("/api/echo", post(echo))
            .route("/prefix/api/echo", post(echo))
            .route("/api/broken", post(broken));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[test]
    fn rejects_relative_base_url() {
        assert!(ApiClient::new("not a url", None).is_err());
    }

    #[tokio::test]
    async fn sends_bearer_token_and_json_body() {
        let addr = spawn_echo_server().await;
        let api = ApiClient::new(&format!("http://{}", addr), Some("secret".into())).unwrap();

        let res = api
            .request(Method::POST, "/api/echo", None, Some(json!({ "message": "hi" })))
            .await
            .unwrap();

        assert!(res.success);
        assert_eq!(res.status, 200);
        let echoed: Value = res.json().unwrap();
        assert_eq!(echoed["auth"], "Bearer secret");
        let sent: Value = serde_json::from_str(echoed["body"].as_str().unwrap()).unwrap();
        assert_eq!(sent, json!({ "message": "hi" }));
    }

    #[tokio::test]
    async fn keeps_path_prefix_of_base_url() {
        let addr = spawn_echo_server().await;

        for base in [format!("http://{}/prefix", addr), format!("http://{}/prefix/", addr)] {
            let api = ApiClient::new(&base, None).unwrap();
            let res = api
                .request::<Value>(Method::POST, "/api/echo", None, None)
                .await
                .unwrap();
            assert_eq!(res.status, 200, "base {base}");
        }
    }

    #[tokio::test]
    async fn omits_authorization_without_token() {
        let addr = spawn_echo_server().await;
        let api = ApiClient::new(&format!("http://{}", addr), None).unwrap();

        let res = api
            .request::<Value>(Method::POST, "/api/echo", None, None)
            .await
            .unwrap();

        let echoed: Value = res.json().unwrap();
        assert_eq!(echoed["auth"], "");
    }

    #[tokio::test]
    async fn keeps_body_of_failed_status() {
        let addr = spawn_echo_server().await;
        let api = ApiClient::new(&format!("http://{}", addr), None).unwrap();

        let res = api
            .request::<Value>(Method::POST, "/api/broken", None, None)
            .await
            .unwrap();

        assert!(!res.success);
        assert_eq!(res.status, 502);
        assert_eq!(res.body, "upstream down");
        assert!(res.json::<Value>().is_none());
    }
}
