//! Per-endpoint admission ledger.

/// Ordered admission timestamps (epoch milliseconds) for one quota bucket.
///
/// Timestamps are appended in non-decreasing order and pruned lazily: every
/// admission check drops entries that have fallen out of the window. The
/// ledger itself never expires; an empty vector costs nothing beyond the map
/// entry.
#[derive(Debug, Clone, Default)]
pub struct RequestLedger {
    timestamps: Vec<i64>,
}

impl RequestLedger {
    /// Drop every entry at or before `cutoff_ms`.
    ///
    /// The comparison is strict: an entry exactly `window_ms` old no longer
    /// counts against the quota.
    pub fn prune(&mut self, cutoff_ms: i64) {
        self.timestamps.retain(|&ts| ts > cutoff_ms);
    }

    /// Record an admission at `now_ms`.
    pub fn record(&mut self, now_ms: i64) {
        self.timestamps.push(now_ms);
    }

    /// Number of recorded entries (callers prune first).
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the ledger holds no entries.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Oldest recorded entry, if any.
    pub fn oldest(&self) -> Option<i64> {
        self.timestamps.first().copied()
    }

    /// Count of entries strictly newer than `cutoff_ms`, without mutating.
    pub fn len_after(&self, cutoff_ms: i64) -> usize {
        self.timestamps.iter().filter(|&&ts| ts > cutoff_ms).count()
    }

    /// Oldest entry strictly newer than `cutoff_ms`, without mutating.
    ///
    /// Relies on insertion order being non-decreasing.
    pub fn oldest_after(&self, cutoff_ms: i64) -> Option<i64> {
        self.timestamps.iter().copied().find(|&ts| ts > cutoff_ms)
    }
}
