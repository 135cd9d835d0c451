//! Endpoint quota configuration.
//!
//! Maps endpoint patterns to request quotas. Patterns are matched as
//! substrings of the endpoint key, in declaration order, with a mandatory
//! catch-all default tried last. Substring (not prefix) semantics are part
//! of the contract: a pattern matches anywhere inside the endpoint.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{FloodgateError, Result};

/// Key under which the catch-all quota is reported.
pub const DEFAULT_KEY: &str = "default";

/// A request quota: at most `limit` admissions per sliding `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    /// Maximum admitted requests within the window
    pub limit: u64,
    /// Sliding window length in milliseconds
    pub window_ms: u64,
}

impl Quota {
    /// The window as a [`Duration`].
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// A quota bound to an endpoint pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRule {
    /// Substring matched against the endpoint key
    pub pattern: String,
    /// The quota applied when the pattern matches
    #[serde(flatten)]
    pub quota: Quota,
}

/// An ordered quota table with a catch-all default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Pattern rules, matched first-wins in declaration order
    #[serde(default)]
    pub rules: Vec<QuotaRule>,
    /// Quota applied when no pattern matches
    #[serde(default = "default_quota")]
    pub default: Quota,
}

fn default_quota() -> Quota {
    Quota {
        limit: 60,
        window_ms: 60_000,
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        let rule = |pattern: &str, limit: u64, window_ms: u64| QuotaRule {
            pattern: pattern.to_string(),
            quota: Quota { limit, window_ms },
        };
        Self {
            rules: vec![
                rule("auth/login", 5, 300_000),
                rule("auth/reset-password", 3, 300_000),
                rule("auth/mfa/verify", 5, 60_000),
                rule("test_codes", 20, 60_000),
                rule("test_results", 30, 60_000),
                rule("reports", 10, 60_000),
            ],
            default: default_quota(),
        }
    }
}

impl QuotaConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading quota configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: QuotaConfig = serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("failed to parse quota config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every quota is enforceable.
    pub fn validate(&self) -> Result<()> {
        for (key, quota) in self.entries() {
            if quota.limit == 0 {
                return Err(FloodgateError::Config(format!(
                    "quota for '{}' has a zero limit",
                    key
                )));
            }
            if quota.window_ms == 0 {
                return Err(FloodgateError::Config(format!(
                    "quota for '{}' has a zero window",
                    key
                )));
            }
        }
        Ok(())
    }

    /// Resolve the quota for an endpoint key.
    ///
    /// Returns the first declared rule whose pattern is a substring of
    /// `endpoint`, or the default entry when none matches. The returned key
    /// is the pattern text (or [`DEFAULT_KEY`]) and doubles as the ledger
    /// key, so all endpoints matching one pattern share a quota bucket.
    pub fn resolve(&self, endpoint: &str) -> (&str, Quota) {
        for rule in &self.rules {
            if endpoint.contains(&rule.pattern) {
                return (&rule.pattern, rule.quota);
            }
        }
        (DEFAULT_KEY, self.default)
    }

    /// Iterate all configured entries in declaration order, default last.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Quota)> {
        self.rules
            .iter()
            .map(|r| (r.pattern.as_str(), r.quota))
            .chain(std::iter::once((DEFAULT_KEY, self.default)))
    }
}
