//! Line decoding for txnstat.
//!
//! Turns one raw input line into a typed [`LogRecord`]. Lines may carry a
//! non-JSON prefix (a syslog header, a container name) before the object;
//! everything before the first `{` is dropped.

use serde_json::Value;
use txnstat_core::error::{CollectError, Result};
use txnstat_core::models::{DIRECTION_DOWN, DIRECTION_UP};

// ── EventKind ─────────────────────────────────────────────────────────────────

/// The message kinds the collector reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A session opened.
    Begin,
    /// Bytes moved in the named direction.
    Directional(String),
    /// A session closed.
    End,
    /// Any other message; ignored by the driver.
    Other,
}

impl EventKind {
    /// Classify a `msg` value.
    ///
    /// Accepts `begin` / `end` / `directional-<dir>` as well as the
    /// `transaction begin` / `transaction end` / `transaction up|down` names
    /// written by older services.
    pub fn from_msg(msg: &str) -> Self {
        match msg {
            "begin" | "transaction begin" => EventKind::Begin,
            "end" | "transaction end" => EventKind::End,
            "transaction up" => EventKind::Directional(DIRECTION_UP.to_string()),
            "transaction down" => EventKind::Directional(DIRECTION_DOWN.to_string()),
            other => match other.strip_prefix("directional-") {
                Some(dir) if !dir.is_empty() => EventKind::Directional(dir.to_string()),
                _ => EventKind::Other,
            },
        }
    }
}

// ── LogRecord ─────────────────────────────────────────────────────────────────

/// A decoded input record that carries every field the collector needs.
#[derive(Debug)]
pub struct LogRecord {
    pub ts: i64,
    pub kind: EventKind,
    pub session: String,
    /// Byte delta of a directional event; 0 for other kinds or when absent.
    pub bytes: u64,
    /// Non-fatal numeric conversion problems found while decoding. The
    /// affected value was replaced with 0.
    pub issues: Vec<CollectError>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Drop everything before the first `{`.
///
/// Lines without a `{` are returned unchanged so that the decode error
/// reports the full text.
pub fn strip_prefix(line: &str) -> &str {
    match line.find('{') {
        Some(idx) => &line[idx..],
        None => line,
    }
}

/// Decode the first JSON value on `line`.
///
/// Anything following the first complete value is ignored.
pub fn decode_line(line: &str) -> Result<Value> {
    let mut stream = serde_json::Deserializer::from_str(line).into_iter::<Value>();
    let decoded = match stream.next() {
        Some(result) => result,
        // No value at all: the strict parser reports why.
        None => serde_json::from_str::<Value>(line),
    };
    decoded.map_err(|source| CollectError::Decode {
        line: line.to_string(),
        source,
    })
}

/// Validate a decoded value into a [`LogRecord`].
///
/// Returns [`CollectError::Schema`] when `ts`, `msg`, `fields` or
/// `fields.session` is absent or has the wrong JSON type.
pub fn parse_record(value: &Value) -> Result<LogRecord> {
    let ts_value = value.get("ts").filter(|v| v.is_number());
    let msg = value.get("msg").and_then(Value::as_str);
    let fields = value.get("fields").filter(|v| v.is_object());

    let ts_value = ts_value.ok_or(CollectError::Schema("ts"))?;
    let msg = msg.ok_or(CollectError::Schema("msg"))?;
    let fields = fields.ok_or(CollectError::Schema("fields"))?;
    let session = fields
        .get("session")
        .and_then(Value::as_str)
        .ok_or(CollectError::Schema("fields.session"))?;

    let mut issues = Vec::new();
    let ts = convert_i64("ts", ts_value, &mut issues);
    let kind = EventKind::from_msg(msg);

    let bytes = match (&kind, fields.get("bytes")) {
        (EventKind::Directional(_), Some(raw)) => convert_u64("bytes", raw, &mut issues),
        _ => 0,
    };

    Ok(LogRecord {
        ts,
        kind,
        session: session.to_string(),
        bytes,
        issues,
    })
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn convert_i64(field: &'static str, raw: &Value, issues: &mut Vec<CollectError>) -> i64 {
    raw.as_i64().unwrap_or_else(|| {
        issues.push(CollectError::NumericConversion {
            field,
            value: raw.to_string(),
        });
        0
    })
}

fn convert_u64(field: &'static str, raw: &Value, issues: &mut Vec<CollectError>) -> u64 {
    raw.as_u64().unwrap_or_else(|| {
        issues.push(CollectError::NumericConversion {
            field,
            value: raw.to_string(),
        });
        0
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
