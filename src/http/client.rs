//! Rate-limited HTTP client binding.
//!
//! [`InterceptedClient`] is the drop-in request entry point: API-shaped URLs
//! are routed through the rate limiter, everything else passes straight to
//! the transport. Terminal rate limiting is surfaced as a synthesized 429
//! response instead of an error, so status-branching callers need no special
//! cases.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::error::{FloodgateError, Result};
use crate::ratelimit::{RateLimiter, RetryOptions};

use super::classify::{extract_endpoint, is_api_request};
use super::transport::{HttpResponse, ReqwestTransport, RequestOptions, Transport};

/// HTTP client wrapper that applies rate limiting to API requests.
///
/// The client owns its limiter and transport explicitly; there is no global
/// installation step. Dropping the client is the teardown.
pub struct InterceptedClient {
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
    retry_options: RetryOptions,
}

impl InterceptedClient {
    /// Client over a fresh [`ReqwestTransport`].
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self::with_transport(limiter, Arc::new(ReqwestTransport::new()))
    }

    /// Client over an injected transport.
    pub fn with_transport(limiter: Arc<RateLimiter>, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            limiter,
            retry_options: RetryOptions::default(),
        }
    }

    /// Override the retry options applied to API requests.
    pub fn with_retry_options(mut self, retry_options: RetryOptions) -> Self {
        self.retry_options = retry_options;
        self
    }

    /// The shared limiter, for stats polling and resets.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Perform a request, rate limiting it when the URL is API-shaped.
    ///
    /// All HTTP methods are subject to limiting. A request that exhausts its
    /// retry budget resolves to a synthesized 429 response carrying a JSON
    /// body `{error, waitTime, retryAfter}` and a `Retry-After` header;
    /// every other failure propagates as an error.
    pub async fn fetch(&self, url: &str, options: &RequestOptions) -> Result<HttpResponse> {
        if !is_api_request(url) {
            return self.transport.send(url, options).await;
        }

        let endpoint = extract_endpoint(url);
        debug!(url, endpoint, "Routing API request through rate limiter");

        let mut retry_options = self.retry_options.clone();
        if let Some(cancel) = options.cancel.clone() {
            retry_options = retry_options.cancel_signal(cancel);
        }

        let transport = &self.transport;
        let result = self
            .limiter
            .execute_with_retry(
                &endpoint,
                || async move {
                    let response = transport.send(url, options).await?;
                    // Normalize a 429 response into the throttled error so
                    // the retry driver handles both signaling shapes alike.
                    if response.status == 429 {
                        return Err(FloodgateError::UpstreamThrottled {
                            retry_after: response.retry_after(),
                        });
                    }
                    Ok(response)
                },
                &retry_options,
            )
            .await;

        match result {
            Err(FloodgateError::RateLimited {
                wait, retry_after, ..
            }) => Ok(synthesized_429(wait, retry_after)),
            other => other,
        }
    }
}

/// Build a local 429 response mimicking a server-issued one.
fn synthesized_429(wait: Duration, retry_after: DateTime<Utc>) -> HttpResponse {
    let body = serde_json::json!({
        "error": "Too many requests. Please try again later.",
        "waitTime": wait.as_secs(),
        "retryAfter": retry_after.to_rfc3339(),
    });

    let mut headers = HashMap::new();
    headers.insert("content-type".to_string(), "application/json".to_string());
    headers.insert("retry-after".to_string(), wait.as_secs().to_string());
    headers.insert("x-ratelimit-remaining".to_string(), "0".to_string());

    HttpResponse {
        status: 429,
        headers,
        body: Bytes::from(body.to_string()),
    }
}
