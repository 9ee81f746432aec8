//! HTTP transport seam between the broker client and the backend.

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// HTTP method of a broker request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A request against the broker backend, relative to its base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl BrokerRequest {
    /// A `GET` request.
    #[must_use]
    pub fn get(path: &str) -> Self {
        Self {
            method: Method::Get,
            path: path.to_string(),
            query: Vec::new(),
            body: None,
        }
    }

    /// A `POST` request with a JSON body.
    #[must_use]
    pub fn post(path: &str, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.to_string(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Append a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

/// Any HTTP response, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

impl TransportResponse {
    #[must_use]
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// No HTTP response was obtained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e.0)
    }
}

/// Sends broker requests.
///
/// Implementations return `Ok` for every HTTP response, including 4xx/5xx,
/// and `Err` only when no response arrived. Status classification belongs to
/// [`BrokerClient`](crate::client::BrokerClient).
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    async fn send(&self, request: BrokerRequest) -> std::result::Result<TransportResponse, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Create a transport for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Url::parse(base_url).map_err(|e| Error::Config(format!("backend.base_url: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create a transport from the backend section of the config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL is invalid.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Self::new(&config.base_url, config.timeout())
    }

    /// Use a custom HTTP client (for connection pool reuse).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    fn url_for(&self, request: &BrokerRequest) -> std::result::Result<Url, TransportError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, request.path))
            .map_err(|e| TransportError(format!("invalid request url: {e}")))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }
}

#[async_trait]
impl BrokerTransport for ReqwestTransport {
    async fn send(&self, request: BrokerRequest) -> std::result::Result<TransportResponse, TransportError> {
        let url = self.url_for(&request)?;
        let builder = match request.method {
            Method::Get => self.http.get(url),
            Method::Post => self.http.post(url),
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError(e.to_string()))?;

        Ok(TransportResponse::new(status, parse_body(&text)))
    }
}

/// Parse a response body, keeping non-JSON text as a string.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_builders() {
        let request = BrokerRequest::get("/broker/status")
            .with_query("config_id", "c1")
            .with_query("user_id", "u1");
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.query.len(), 2);
        assert!(request.body.is_none());

        let request = BrokerRequest::post("/broker/disconnect", json!({"config_id": "c1"}));
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.body.unwrap()["config_id"], "c1");
    }

    #[test]
    fn url_joins_base_path_and_query() {
        let transport =
            ReqwestTransport::new("http://localhost:8000/api/modules/auth/", Duration::from_secs(1))
                .unwrap();
        let request = BrokerRequest::get("/broker/status")
            .with_query("config_id", "c 1")
            .with_query("user_id", "EBW183");
        let url = transport.url_for(&request).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/modules/auth/broker/status?config_id=c+1&user_id=EBW183"
        );
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        let err = ReqwestTransport::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn body_parsing() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body(r#"{"success":true}"#), json!({"success": true}));
        assert_eq!(parse_body("Bad Gateway"), json!("Bad Gateway"));
    }

    #[test]
    fn transport_error_converts_to_transient() {
        let err: Error = TransportError("connection refused".to_string()).into();
        assert!(err.is_transient());
    }
}
