//! HTTP transport abstraction.
//!
//! The binding layer talks to the network through the [`Transport`] trait
//! rather than an ambient global, so callers inject the implementation they
//! want: [`ReqwestTransport`] in production, a canned transport in tests.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{FloodgateError, Result};

/// Options for a single outgoing request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// HTTP method name
    pub method: String,
    /// Request headers
    pub headers: HashMap<String, String>,
    /// Optional request body
    pub body: Option<Bytes>,
    /// Cancellation signal, honored between retry attempts
    pub cancel: Option<watch::Receiver<bool>>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: "GET".to_string(),
            headers: HashMap::new(),
            body: None,
            cancel: None,
        }
    }
}

impl RequestOptions {
    /// Options for the given method with no headers or body.
    pub fn method(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            ..Self::default()
        }
    }
}

/// A materialized HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Whether the status is in the 2xx range.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Parsed `Retry-After` header, seconds form only.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// The network-call collaborator: `(url, options)` to a response.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one HTTP request.
    async fn send(&self, url: &str, options: &RequestOptions) -> Result<HttpResponse>;
}

/// Production [`Transport`] over a [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Transport with a fresh client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport reusing an existing client (connection pools, TLS config).
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, url: &str, options: &RequestOptions) -> Result<HttpResponse> {
        let method = reqwest::Method::from_bytes(options.method.as_bytes())
            .map_err(|_| FloodgateError::Config(format!("invalid HTTP method '{}'", options.method)))?;

        let mut request = self.client.request(method, url);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(ref body) = options.body {
            request = request.body(body.clone());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with_header(name: &str, value: &str) -> HttpResponse {
        let mut headers = HashMap::new();
        headers.insert(name.to_string(), value.to_string());
        HttpResponse {
            status: 429,
            headers,
            body: Bytes::new(),
        }
    }

    #[test]
    fn test_ok_range() {
        let mut response = response_with_header("x", "y");
        response.status = 200;
        assert!(response.ok());
        response.status = 204;
        assert!(response.ok());
        response.status = 301;
        assert!(!response.ok());
        response.status = 429;
        assert!(!response.ok());
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = response_with_header("Retry-After", "30");
        assert_eq!(response.header("retry-after"), Some("30"));
        assert_eq!(response.header("RETRY-AFTER"), Some("30"));
        assert_eq!(response.header("content-type"), None);
    }

    #[test]
    fn test_retry_after_parses_seconds() {
        assert_eq!(
            response_with_header("retry-after", "30").retry_after(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            response_with_header("retry-after", " 5 ").retry_after(),
            Some(Duration::from_secs(5))
        );
        // HTTP-date form is not understood; the caller falls back to backoff.
        assert_eq!(
            response_with_header("retry-after", "Wed, 21 Oct 2026 07:28:00 GMT").retry_after(),
            None
        );
    }

    #[test]
    fn test_json_body() {
        let response = HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from_static(b"{\"count\": 3}"),
        };
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["count"], 3);
    }

    #[test]
    fn test_default_request_options() {
        let options = RequestOptions::default();
        assert_eq!(options.method, "GET");
        assert!(options.headers.is_empty());
        assert!(options.body.is_none());
    }
}
