use serde::{Deserialize, Serialize};

/// Direction label for upload traffic.
pub const DIRECTION_UP: &str = "up";
/// Direction label for download traffic.
pub const DIRECTION_DOWN: &str = "down";

/// Directions that always have a global bucket, in emission order.
pub const KNOWN_DIRECTIONS: [&str; 2] = [DIRECTION_UP, DIRECTION_DOWN];

/// An open transaction tracked by the session ledger.
///
/// `end` is not stored here: a transaction that has seen its end event is
/// turned into a [`CompletedTransaction`] and leaves the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque session identifier correlating the events.
    pub session: String,
    /// Timestamp of the begin event.
    pub begin: i64,
    /// Cumulative byte count over all directional events so far.
    pub bytes: u64,
    /// Label of the most recent directional event, if any.
    pub direction: Option<String>,
}

impl Transaction {
    /// Open a fresh transaction with no bytes and no direction.
    pub fn new(session: impl Into<String>, begin: i64) -> Self {
        Self {
            session: session.into(),
            begin,
            bytes: 0,
            direction: None,
        }
    }

    /// Record one directional event.
    pub fn add_directional(&mut self, direction: &str, delta_bytes: u64) {
        self.bytes = self.bytes.saturating_add(delta_bytes);
        if self.direction.as_deref() != Some(direction) {
            self.direction = Some(direction.to_string());
        }
    }

    /// Close the transaction at `end`.
    pub fn complete(self, end: i64) -> CompletedTransaction {
        CompletedTransaction {
            session: self.session,
            begin: self.begin,
            end,
            bytes: self.bytes,
            direction: self.direction,
        }
    }
}

/// Read-only snapshot of a transaction that received its end event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedTransaction {
    pub session: String,
    pub begin: i64,
    pub end: i64,
    pub bytes: u64,
    pub direction: Option<String>,
}

impl CompletedTransaction {
    /// Elapsed time between begin and end, in input timestamp units.
    pub fn latency(&self) -> i64 {
        self.end.saturating_sub(self.begin)
    }

    /// Bytes per timestamp unit.
    ///
    /// A zero latency is not special-cased: the result is `+Inf` when bytes
    /// were transferred and `NaN` when none were.
    pub fn throughput(&self) -> f64 {
        self.bytes as f64 / self.latency() as f64
    }

    /// Direction label for output, empty when no directional event was seen.
    pub fn counter(&self) -> &str {
        self.direction.as_deref().unwrap_or("")
    }
}

/// Averages for one direction bucket, computed fresh from its totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSummary {
    pub direction: String,
    /// Total bytes over total elapsed time.
    pub throughput: f64,
    /// Mean elapsed time per transaction.
    pub latency: f64,
    /// Mean bytes per transaction.
    pub bytes: f64,
    pub count: u64,
}
