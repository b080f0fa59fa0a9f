//! Per-direction aggregation of completed transactions.

use txnstat_core::models::{GlobalSummary, KNOWN_DIRECTIONS};

// ── GlobalStat ────────────────────────────────────────────────────────────────

/// Byte and elapsed-time totals accumulated across completed transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalStat {
    pub direction: String,
    pub bytes: u64,
    pub diff: i64,
    pub count: u64,
}

impl GlobalStat {
    pub fn new(direction: impl Into<String>) -> Self {
        Self {
            direction: direction.into(),
            ..Default::default()
        }
    }

    /// Add one completed transaction's totals.
    pub fn add(&mut self, bytes: u64, diff: i64) {
        self.bytes = self.bytes.saturating_add(bytes);
        self.diff = self.diff.saturating_add(diff);
        self.count += 1;
    }

    /// Averages over everything folded so far.
    ///
    /// With `count == 0` every ratio is `0/0` and comes out as NaN.
    pub fn summarize(&self) -> GlobalSummary {
        let bytes = self.bytes as f64;
        let diff = self.diff as f64;
        let count = self.count as f64;
        GlobalSummary {
            direction: self.direction.clone(),
            throughput: bytes / diff,
            latency: diff / count,
            bytes: bytes / count,
            count: self.count,
        }
    }
}

// ── GlobalAggregator ──────────────────────────────────────────────────────────

/// One [`GlobalStat`] bucket per direction, kept in registration order.
#[derive(Debug, Clone)]
pub struct GlobalAggregator {
    buckets: Vec<GlobalStat>,
    dynamic: bool,
}

impl GlobalAggregator {
    /// Pre-register the `up` and `down` buckets.
    ///
    /// With `dynamic` set, any other direction gets a bucket on first fold;
    /// otherwise folds into unknown directions are dropped.
    pub fn new(dynamic: bool) -> Self {
        Self {
            buckets: KNOWN_DIRECTIONS.iter().map(|d| GlobalStat::new(*d)).collect(),
            dynamic,
        }
    }

    /// Fold one completed transaction into its direction bucket.
    ///
    /// Returns `false` when the direction has no bucket and none was created.
    pub fn fold(&mut self, direction: &str, bytes: u64, diff: i64) -> bool {
        let idx = match self.buckets.iter().position(|b| b.direction == direction) {
            Some(idx) => idx,
            None if self.dynamic => {
                self.buckets.push(GlobalStat::new(direction));
                self.buckets.len() - 1
            }
            None => return false,
        };
        self.buckets[idx].add(bytes, diff);
        true
    }

    /// Current averages for `direction`.
    pub fn summarize(&self, direction: &str) -> Option<GlobalSummary> {
        self.get(direction).map(GlobalStat::summarize)
    }

    pub fn get(&self, direction: &str) -> Option<&GlobalStat> {
        self.buckets.iter().find(|b| b.direction == direction)
    }

    /// Registered direction labels in registration order.
    pub fn directions(&self) -> impl Iterator<Item = &str> {
        self.buckets.iter().map(|b| b.direction.as_str())
    }
}

impl Default for GlobalAggregator {
    fn default() -> Self {
        Self::new(false)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
