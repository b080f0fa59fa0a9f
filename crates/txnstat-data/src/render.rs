//! Metric output.
//!
//! Every metric is written as exactly one line. In full mode the line is a
//! JSON log record in the same `{"ts","msg","fields"}` envelope that txnstat
//! reads, so output can be piped back into other log tooling. In selected mode
//! the line is a flat `{"key"=value,...}` row restricted to the configured keys,
//! which lines up as a table when several records are printed.

use std::io::{self, Write};

use serde_json::{Map, Value};
use txnstat_core::fields::{select_fields, FieldValue, NamedParam};
use txnstat_core::settings::CommandConfig;

/// Key under which the metric name is exposed in selected mode.
pub const MSG_KEY: &str = "msg";

/// How metric records are laid out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderMode {
    /// Structured JSON record carrying every field.
    Full,
    /// Only the listed keys, in this order.
    Selected(Vec<String>),
}

impl RenderMode {
    pub fn from_config(config: &CommandConfig) -> Self {
        if config.is_selected_mode() {
            RenderMode::Selected(config.selected.clone())
        } else {
            RenderMode::Full
        }
    }
}

// ── MetricRenderer ────────────────────────────────────────────────────────────

/// Writes metric records to an output sink.
pub struct MetricRenderer<W: Write> {
    out: W,
    mode: RenderMode,
}

impl<W: Write> MetricRenderer<W> {
    pub fn new(out: W, mode: RenderMode) -> Self {
        Self { out, mode }
    }

    /// Write one metric record.
    pub fn render(&mut self, name: &str, params: &[NamedParam]) -> io::Result<()> {
        let line = match &self.mode {
            RenderMode::Full => full_record(name, params, now_secs()).to_string(),
            RenderMode::Selected(keys) => selected_line(name, params, keys),
        };
        writeln!(self.out, "{}", line)
    }

    /// Write an input line verbatim.
    pub fn echo(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.out, "{}", line)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

// ── Layouts ───────────────────────────────────────────────────────────────────

/// Build the full-mode JSON record for a metric.
pub fn full_record(name: &str, params: &[NamedParam], ts: f64) -> Value {
    let fields: Map<String, Value> = params
        .iter()
        .map(|p| (p.key.clone(), p.value.to_json()))
        .collect();

    let mut record = Map::new();
    record.insert("level".to_string(), Value::from("info"));
    record.insert("ts".to_string(), Value::from(ts));
    record.insert(MSG_KEY.to_string(), Value::from(name));
    record.insert("fields".to_string(), Value::Object(fields));
    Value::Object(record)
}

/// Build the selected-mode row for a metric.
///
/// The metric name is appended as a `msg` parameter before projection so it
/// can be placed anywhere in the row.
pub fn selected_line<K: AsRef<str>>(name: &str, params: &[NamedParam], keys: &[K]) -> String {
    let mut all = params.to_vec();
    all.push(NamedParam::string(MSG_KEY, name));

    let cells: Vec<String> = select_fields(&all, keys)
        .into_iter()
        .map(|p| format!("{}={}", quote(&p.key), render_value(&p.value)))
        .collect();
    format!("{{{}}}", cells.join(","))
}

fn render_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Str(s) => quote(s),
        other => other.to_string(),
    }
}

fn quote(s: &str) -> String {
    Value::from(s).to_string()
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
