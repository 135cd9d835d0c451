//! Core sliding-window rate limiter.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::QuotaConfig;

use super::clock::{Clock, SystemClock};
use super::ledger::RequestLedger;

/// Outcome of an admission check.
///
/// Checking never consumes quota; recording is a separate step, so a pure
/// "check without consuming" call is possible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The request may proceed; `remaining` slots stay free in the window.
    Allowed {
        /// Free slots left once this request is recorded
        remaining: u64,
    },
    /// The window is at capacity.
    Denied {
        /// Whole seconds (rounded up) until the oldest entry expires
        wait: Duration,
        /// Absolute time at which a slot frees up
        retry_after: DateTime<Utc>,
    },
}

impl Admission {
    /// Whether the request was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// On-demand usage snapshot for one quota bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointStats {
    /// Admissions currently inside the window
    pub used: u64,
    /// Configured limit for the bucket
    pub limit: u64,
    /// Free slots left in the window
    pub remaining: u64,
    /// When the oldest in-window admission expires (now, if none)
    pub reset_at: DateTime<Utc>,
}

/// Sliding-window admission controller keyed by logical endpoint.
///
/// Endpoints resolve to a quota bucket through the [`QuotaConfig`] pattern
/// table; each bucket owns a ledger of admission timestamps. The ledger map
/// uses per-key locking, so checks on different buckets never contend and a
/// combined check-and-record is atomic per bucket.
///
/// This struct is thread-safe and is meant to be shared behind an [`Arc`].
pub struct RateLimiter {
    /// Quota table resolved per endpoint
    config: QuotaConfig,
    /// Admission ledgers indexed by resolved pattern key
    ledgers: DashMap<String, RequestLedger>,
    /// Time source
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter with the built-in quota table.
    pub fn new() -> Self {
        Self::with_config(QuotaConfig::default())
    }

    /// Create a rate limiter with a custom quota table.
    pub fn with_config(config: QuotaConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a rate limiter with a custom quota table and time source.
    pub fn with_clock(config: QuotaConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            ledgers: DashMap::new(),
            clock,
        }
    }

    /// The quota table in effect.
    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Check whether a request for `endpoint` may proceed right now.
    ///
    /// Prunes the bucket's ledger as a side effect, whether or not the
    /// request is admitted. Does not consume quota; pair with
    /// [`record_request`](Self::record_request) before performing the
    /// attempt.
    pub fn check_limit(&self, endpoint: &str) -> Admission {
        let (key, quota) = self.config.resolve(endpoint);
        let now = self.clock.now();

        trace!(endpoint, key, "Checking rate limit");

        let mut entry = self.ledgers.entry(key.to_string()).or_default();
        let ledger = entry.value_mut();
        ledger.prune(now.timestamp_millis() - quota.window_ms as i64);

        self.decide(key, ledger, quota.limit, quota.window_ms, now)
    }

    /// Record an admitted request for `endpoint`.
    ///
    /// Must be called exactly once per admitted attempt, immediately before
    /// performing it, so rapid sequential checks see the attempt reflected.
    pub fn record_request(&self, endpoint: &str) {
        let (key, _) = self.config.resolve(endpoint);
        let now_ms = self.clock.now_ms();

        let mut entry = self.ledgers.entry(key.to_string()).or_default();
        entry.value_mut().record(now_ms);

        debug!(endpoint, key, "Recorded request");
    }

    /// Check and, when admitted, record in one step.
    ///
    /// Holds the bucket lock across both operations, closing the
    /// check-then-act race two concurrent callers would otherwise hit on a
    /// multi-threaded runtime.
    pub(crate) fn check_and_record(&self, endpoint: &str) -> Admission {
        let (key, quota) = self.config.resolve(endpoint);
        let now = self.clock.now();

        let mut entry = self.ledgers.entry(key.to_string()).or_default();
        let ledger = entry.value_mut();
        ledger.prune(now.timestamp_millis() - quota.window_ms as i64);

        let decision = self.decide(key, ledger, quota.limit, quota.window_ms, now);
        if decision.is_allowed() {
            ledger.record(now.timestamp_millis());
        }
        decision
    }

    fn decide(
        &self,
        key: &str,
        ledger: &RequestLedger,
        limit: u64,
        window_ms: u64,
        now: DateTime<Utc>,
    ) -> Admission {
        let len = ledger.len() as u64;
        if len >= limit {
            if let Some(oldest) = ledger.oldest() {
                let wait_ms = oldest + window_ms as i64 - now.timestamp_millis();
                let wait_secs = (wait_ms.max(0) as u64).div_ceil(1000);
                debug!(key, wait_secs, "Rate limit exceeded");
                return Admission::Denied {
                    wait: Duration::from_secs(wait_secs),
                    retry_after: now + chrono::Duration::seconds(wait_secs as i64),
                };
            }
        }
        // The admitted request counts against the quota it reports, so the
        // last free slot reads as remaining 0.
        Admission::Allowed {
            remaining: limit.saturating_sub(len + 1),
        }
    }

    /// Usage snapshot for every configured bucket.
    ///
    /// Applies the same window filter as [`check_limit`](Self::check_limit)
    /// without mutating any ledger.
    pub fn stats(&self) -> HashMap<String, EndpointStats> {
        let now = self.clock.now();
        let now_ms = now.timestamp_millis();

        self.config
            .entries()
            .map(|(key, quota)| {
                let cutoff = now_ms - quota.window_ms as i64;
                let (used, oldest) = match self.ledgers.get(key) {
                    Some(ledger) => (
                        ledger.len_after(cutoff) as u64,
                        ledger.oldest_after(cutoff),
                    ),
                    None => (0, None),
                };
                let reset_at = match oldest {
                    Some(ts) => {
                        now + chrono::Duration::milliseconds(ts + quota.window_ms as i64 - now_ms)
                    }
                    None => now,
                };
                let stats = EndpointStats {
                    used,
                    limit: quota.limit,
                    remaining: quota.limit.saturating_sub(used),
                    reset_at,
                };
                (key.to_string(), stats)
            })
            .collect()
    }

    /// Whether `endpoint` is currently at capacity. Read-only.
    pub fn is_blocked(&self, endpoint: &str) -> bool {
        let (key, quota) = self.config.resolve(endpoint);
        let cutoff = self.clock.now_ms() - quota.window_ms as i64;

        match self.ledgers.get(key) {
            Some(ledger) => ledger.len_after(cutoff) as u64 >= quota.limit,
            None => false,
        }
    }

    /// Time until `endpoint` frees a slot; zero when not blocked. Read-only.
    pub fn remaining_time(&self, endpoint: &str) -> Duration {
        let (key, quota) = self.config.resolve(endpoint);
        let now_ms = self.clock.now_ms();
        let cutoff = now_ms - quota.window_ms as i64;

        if let Some(ledger) = self.ledgers.get(key) {
            if ledger.len_after(cutoff) as u64 >= quota.limit {
                if let Some(oldest) = ledger.oldest_after(cutoff) {
                    let wait_ms = (oldest + quota.window_ms as i64 - now_ms).max(0);
                    return Duration::from_millis(wait_ms as u64);
                }
            }
        }
        Duration::ZERO
    }

    /// Clear the ledger backing `endpoint`, restoring its full quota.
    pub fn reset(&self, endpoint: &str) {
        let (key, _) = self.config.resolve(endpoint);
        self.ledgers.remove(key);
        debug!(endpoint, key, "Reset rate limit state");
    }

    /// Clear all ledgers.
    pub fn reset_all(&self) {
        self.ledgers.clear();
        debug!("Reset all rate limit state");
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Quota, QuotaRule};
    use crate::ratelimit::clock::ManualClock;

    fn manual_limiter() -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::with_clock(QuotaConfig::default(), clock.clone());
        (clock, limiter)
    }

    #[test]
    fn test_admits_up_to_limit_then_denies() {
        let (_clock, limiter) = manual_limiter();

        for _ in 0..5 {
            assert!(limiter.check_limit("auth/login").is_allowed());
            limiter.record_request("auth/login");
        }

        match limiter.check_limit("auth/login") {
            Admission::Denied { wait, .. } => assert!(wait.as_secs() > 0),
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn test_window_expiry_restores_quota() {
        let (clock, limiter) = manual_limiter();

        for _ in 0..5 {
            limiter.record_request("auth/login");
        }
        assert!(!limiter.check_limit("auth/login").is_allowed());

        clock.advance(Duration::from_millis(300_001));
        assert!(limiter.check_limit("auth/login").is_allowed());

        limiter.record_request("auth/login");
        let stats = limiter.stats();
        assert_eq!(stats["auth/login"].used, 1);
        assert_eq!(stats["auth/login"].remaining, 4);
    }

    #[test]
    fn test_endpoints_are_independent() {
        let (_clock, limiter) = manual_limiter();

        for _ in 0..5 {
            limiter.record_request("auth/login");
        }
        assert!(!limiter.check_limit("auth/login").is_allowed());
        assert!(limiter.check_limit("test_codes").is_allowed());
        assert!(limiter.check_limit("reports").is_allowed());
    }

    #[test]
    fn test_exact_wait_time_law() {
        let (clock, limiter) = manual_limiter();

        let oldest_ms = clock.now_ms();
        for _ in 0..5 {
            limiter.record_request("auth/login");
        }
        clock.advance(Duration::from_millis(120_000));

        match limiter.check_limit("auth/login") {
            Admission::Denied { wait, .. } => {
                // now + wait must land on oldest + window, within 1s rounding.
                let predicted = clock.now_ms() + wait.as_millis() as i64;
                let target = oldest_ms + 300_000;
                assert!((predicted - target).abs() <= 1000);
            }
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[test]
    fn test_auth_login_scenario() {
        let (clock, limiter) = manual_limiter();

        // Five check/record pairs consume the whole window, reporting
        // remaining 4, 3, 2, 1, 0 as each admitted request counts itself.
        for i in 0..5u64 {
            match limiter.check_limit("auth/login") {
                Admission::Allowed { remaining } => assert_eq!(remaining, 4 - i),
                other => panic!("expected admission, got {:?}", other),
            }
            limiter.record_request("auth/login");
            assert_eq!(limiter.stats()["auth/login"].remaining, 4 - i);
        }

        // Sixth call is denied for the full window.
        match limiter.check_limit("auth/login") {
            Admission::Denied { wait, retry_after } => {
                assert!((wait.as_secs() as i64 - 300).abs() <= 1);
                assert!(retry_after > clock.now());
            }
            other => panic!("expected denial, got {:?}", other),
        }

        // Past the window the quota is whole again.
        clock.advance(Duration::from_millis(300_001));
        match limiter.check_limit("auth/login") {
            Admission::Allowed { remaining } => assert_eq!(remaining, 4),
            other => panic!("expected admission, got {:?}", other),
        }
        limiter.record_request("auth/login");
        assert_eq!(limiter.stats()["auth/login"].remaining, 4);
    }

    #[test]
    fn test_reports_stats_scenario() {
        let (_clock, limiter) = manual_limiter();

        for _ in 0..10 {
            assert!(limiter.check_limit("reports").is_allowed());
            limiter.record_request("reports");
        }

        let stats = limiter.stats();
        let reports = &stats["reports"];
        assert_eq!(reports.used, 10);
        assert_eq!(reports.limit, 10);
        assert_eq!(reports.remaining, 0);

        // Every other configured bucket is untouched.
        for (key, quota) in limiter.config().entries() {
            if key == "reports" {
                continue;
            }
            assert_eq!(stats[key].used, 0, "bucket {} should be untouched", key);
            assert_eq!(stats[key].remaining, quota.limit);
        }
    }

    #[test]
    fn test_stats_does_not_mutate() {
        let (clock, limiter) = manual_limiter();

        limiter.record_request("reports");
        clock.advance(Duration::from_millis(120_000));

        // The entry has expired; stats must not count it but also must not
        // prune it away (check_limit owns pruning).
        assert_eq!(limiter.stats()["reports"].used, 0);
        assert_eq!(limiter.stats()["reports"].used, 0);
    }

    #[test]
    fn test_reset_single_endpoint() {
        let (_clock, limiter) = manual_limiter();

        for _ in 0..5 {
            limiter.record_request("auth/login");
        }
        for _ in 0..3 {
            limiter.record_request("auth/reset-password");
        }
        limiter.reset("auth/login");

        // The full quota is back: the next check admits with only its own
        // request counted.
        assert_eq!(limiter.stats()["auth/login"].remaining, 5);
        match limiter.check_limit("auth/login") {
            Admission::Allowed { remaining } => assert_eq!(remaining, 4),
            other => panic!("expected admission, got {:?}", other),
        }
        // The sibling endpoint keeps its exhausted state.
        assert!(!limiter.check_limit("auth/reset-password").is_allowed());
    }

    #[test]
    fn test_reset_all() {
        let (_clock, limiter) = manual_limiter();

        for _ in 0..5 {
            limiter.record_request("auth/login");
        }
        for _ in 0..10 {
            limiter.record_request("reports");
        }
        limiter.reset_all();

        assert!(limiter.check_limit("auth/login").is_allowed());
        assert!(limiter.check_limit("reports").is_allowed());
        assert_eq!(limiter.stats()["auth/login"].used, 0);
    }

    #[test]
    fn test_is_blocked_and_remaining_time() {
        let (clock, limiter) = manual_limiter();

        assert!(!limiter.is_blocked("auth/mfa/verify"));
        assert_eq!(limiter.remaining_time("auth/mfa/verify"), Duration::ZERO);

        for _ in 0..5 {
            limiter.record_request("auth/mfa/verify");
        }
        assert!(limiter.is_blocked("auth/mfa/verify"));

        let remaining = limiter.remaining_time("auth/mfa/verify");
        assert_eq!(remaining, Duration::from_millis(60_000));

        clock.advance(Duration::from_millis(45_000));
        assert_eq!(
            limiter.remaining_time("auth/mfa/verify"),
            Duration::from_millis(15_000)
        );
    }

    #[test]
    fn test_shared_bucket_for_matching_endpoints() {
        let (_clock, limiter) = manual_limiter();

        // Both paths resolve to the test_codes pattern and share its ledger.
        for _ in 0..20 {
            limiter.record_request("test_codes/validate");
        }
        assert!(!limiter.check_limit("admin/test_codes").is_allowed());
    }

    #[test]
    fn test_check_and_record_consumes_on_admit() {
        let config = QuotaConfig {
            rules: vec![QuotaRule {
                pattern: "tight".to_string(),
                quota: Quota { limit: 1, window_ms: 60_000 },
            }],
            ..QuotaConfig::default()
        };
        let limiter = RateLimiter::with_clock(config, Arc::new(ManualClock::default()));

        assert!(limiter.check_and_record("tight").is_allowed());
        assert!(!limiter.check_and_record("tight").is_allowed());
    }
}
