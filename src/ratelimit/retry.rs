//! Retry driver with bounded backoff.
//!
//! Drives a caller-supplied async action through repeated attempts when
//! capacity is exhausted. Two distinct timing laws coexist deliberately:
//! local denial waits the exact time until the window frees a slot, while a
//! server-signaled 429 backs off exponentially (1s, 2s, 4s) unless the
//! server sent a `Retry-After` hint.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{FloodgateError, Result};

use super::limiter::{Admission, RateLimiter};

/// Default retry budget per top-level call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// First exponential backoff step for server-signaled 429s.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
/// Exponential backoff multiplier.
pub const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;

/// Callback invoked after each wait with the attempt number and the delay
/// that was just served.
pub type RetryCallback = Arc<dyn Fn(u32, Duration) + Send + Sync>;

/// Options controlling [`RateLimiter::execute_with_retry`].
#[derive(Clone, Default)]
pub struct RetryOptions {
    max_retries: Option<u32>,
    base_delay: Option<Duration>,
    backoff_multiplier: Option<u32>,
    on_retry: Option<RetryCallback>,
    cancel: Option<watch::Receiver<bool>>,
}

impl RetryOptions {
    /// Options with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Retry budget (default 3).
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// First backoff step for server 429s (default 1s).
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = Some(base_delay);
        self
    }

    /// Backoff multiplier for server 429s (default 2).
    pub fn backoff_multiplier(mut self, multiplier: u32) -> Self {
        self.backoff_multiplier = Some(multiplier);
        self
    }

    /// Observe retries as they happen.
    pub fn on_retry(mut self, callback: RetryCallback) -> Self {
        self.on_retry = Some(callback);
        self
    }

    /// Cancellation signal; flipping the channel to `true` stops the loop at
    /// its next check.
    pub fn cancel_signal(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn budget(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    fn backoff_delay(&self, retry_count: u32) -> Duration {
        let base = self.base_delay.unwrap_or(DEFAULT_BASE_DELAY);
        let multiplier = self.backoff_multiplier.unwrap_or(DEFAULT_BACKOFF_MULTIPLIER);
        base.saturating_mul(multiplier.saturating_pow(retry_count))
    }

    fn notify(&self, attempt: u32, delay: Duration) {
        if let Some(ref callback) = self.on_retry {
            callback(attempt, delay);
        }
    }
}

impl RateLimiter {
    /// Run `action` for `endpoint`, waiting and retrying on exhaustion.
    ///
    /// Each admitted attempt is recorded against the endpoint's bucket
    /// before the action runs. Local denial waits the exact window time; an
    /// action failing with [`FloodgateError::UpstreamThrottled`] waits the
    /// server's `Retry-After` when present, else the exponential backoff.
    /// Once the retry budget is spent the call fails with
    /// [`FloodgateError::RateLimited`]. Cancellation is honored at the loop
    /// top and before each wait, never mid-attempt. Any other action error
    /// propagates immediately, unmodified.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        endpoint: &str,
        mut action: F,
        options: &RetryOptions,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_retries = options.budget();
        let mut retry_count: u32 = 0;

        loop {
            if options.cancelled() {
                return Err(FloodgateError::Cancelled);
            }

            match self.check_and_record(endpoint) {
                Admission::Denied { wait, retry_after } => {
                    if retry_count >= max_retries {
                        warn!(
                            endpoint,
                            retries = retry_count,
                            wait_secs = wait.as_secs(),
                            "Retries exhausted while rate limited"
                        );
                        return Err(FloodgateError::RateLimited {
                            endpoint: endpoint.to_string(),
                            wait,
                            retry_after,
                        });
                    }
                    if options.cancelled() {
                        return Err(FloodgateError::Cancelled);
                    }
                    debug!(
                        endpoint,
                        delay_ms = wait.as_millis() as u64,
                        attempt = retry_count + 1,
                        "Locally rate limited, waiting"
                    );
                    tokio::time::sleep(wait).await;
                    retry_count += 1;
                    options.notify(retry_count, wait);
                }
                Admission::Allowed { .. } => match action().await {
                    Ok(value) => return Ok(value),
                    Err(FloodgateError::UpstreamThrottled { retry_after }) => {
                        let delay = retry_after.unwrap_or_else(|| options.backoff_delay(retry_count));
                        if retry_count >= max_retries {
                            warn!(
                                endpoint,
                                retries = retry_count,
                                "Retries exhausted after server 429s"
                            );
                            let now = self.now();
                            return Err(FloodgateError::RateLimited {
                                endpoint: endpoint.to_string(),
                                wait: delay,
                                retry_after: now
                                    + chrono::Duration::milliseconds(delay.as_millis() as i64),
                            });
                        }
                        if options.cancelled() {
                            return Err(FloodgateError::Cancelled);
                        }
                        debug!(
                            endpoint,
                            delay_ms = delay.as_millis() as u64,
                            attempt = retry_count + 1,
                            "Server reported 429, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        retry_count += 1;
                        options.notify(retry_count, delay);
                    }
                    Err(other) => return Err(other),
                },
            }
        }
    }
}

/// A rate-limited rendition of an arbitrary async call.
///
/// Adapter for calls that never pass through the HTTP binding (RPC-style
/// helpers, batched jobs) but still want quota and retry semantics under a
/// chosen endpoint label.
pub struct RateLimitedCall<F> {
    limiter: Arc<RateLimiter>,
    endpoint: String,
    options: RetryOptions,
    action: F,
}

impl<F, Fut, T> RateLimitedCall<F>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    /// Wrap `action` so every call runs through `limiter` under `endpoint`.
    pub fn new(limiter: Arc<RateLimiter>, endpoint: impl Into<String>, action: F) -> Self {
        Self {
            limiter,
            endpoint: endpoint.into(),
            options: RetryOptions::default(),
            action,
        }
    }

    /// Override the retry options.
    pub fn with_options(mut self, options: RetryOptions) -> Self {
        self.options = options;
        self
    }

    /// Run the wrapped action with quota and retry applied.
    pub async fn call(&self) -> Result<T> {
        self.limiter
            .execute_with_retry(&self.endpoint, &self.action, &self.options)
            .await
    }
}
