//! The collector: reads lines, dispatches events, emits metrics.
//!
//! [`Collector`] is the single context object for a run. It owns the command
//! configuration, the session ledger, the global aggregator and the output
//! renderer, and is driven one line at a time. Per-line problems are logged
//! and counted; only I/O failures are returned to the caller.

use std::io::{BufRead, ErrorKind, Write};

use tracing::{debug, error, info, trace, warn};
use txnstat_core::error::{CollectError, Result};
use txnstat_core::fields::NamedParam;
use txnstat_core::models::{CompletedTransaction, GlobalSummary};
use txnstat_core::settings::CommandConfig;

use crate::aggregator::GlobalAggregator;
use crate::ledger::SessionLedger;
use crate::reader::{decode_line, parse_record, strip_prefix, EventKind, LogRecord};
use crate::render::{MetricRenderer, RenderMode};

/// Metric name of a per-transaction record.
pub const TXN_METRIC: &str = "txn";
/// Metric name of a per-direction global summary.
pub const GSTAT_METRIC: &str = "gstat";

// ── RunStats ──────────────────────────────────────────────────────────────────

/// Line and event counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Input lines read, including blank and undecodable ones.
    pub lines: u64,
    /// Lines that decoded as JSON.
    pub decoded: u64,
    /// Decoded records skipped for schema reasons or unknown message names.
    pub ignored: u64,
    /// Lines that failed to decode.
    pub decode_errors: u64,
    /// Numeric fields replaced with 0.
    pub conversion_errors: u64,
    /// Directional or end events with no open transaction.
    pub missing_begin: u64,
    /// Open transactions discarded by a repeated begin.
    pub replaced: u64,
    /// Transactions that reached their end event.
    pub completed: u64,
    /// Transactions dropped because their end came before their begin.
    pub reversed: u64,
}

// ── Collector ─────────────────────────────────────────────────────────────────

pub struct Collector<W: Write> {
    config: CommandConfig,
    ledger: SessionLedger,
    aggregator: GlobalAggregator,
    renderer: MetricRenderer<W>,
    stats: RunStats,
}

impl<W: Write> Collector<W> {
    /// Build a collector writing metrics to `out`.
    pub fn new(config: CommandConfig, out: W) -> Self {
        let renderer = MetricRenderer::new(out, RenderMode::from_config(&config));
        Self {
            aggregator: GlobalAggregator::new(config.dynamic),
            ledger: SessionLedger::new(),
            renderer,
            stats: RunStats::default(),
            config,
        }
    }

    // ── Public API ────────────────────────────────────────────────────────────

    /// Process every line of `input`, then emit the global summaries.
    ///
    /// Lines that are not valid UTF-8 are skipped. Any other read error, and
    /// any write error, aborts the run.
    pub fn run<R: BufRead>(&mut self, input: R) -> Result<RunStats> {
        for line in input.lines() {
            match line {
                Ok(line) => self.process_line(&line)?,
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    self.stats.lines += 1;
                    self.stats.decode_errors += 1;
                    error!("Skipping unreadable input line: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.finish()?;
        Ok(self.stats.clone())
    }

    /// Decode and dispatch one raw input line.
    pub fn process_line(&mut self, raw: &str) -> Result<()> {
        self.stats.lines += 1;

        let line = strip_prefix(raw);
        if line.is_empty() {
            return Ok(());
        }

        let value = match decode_line(line) {
            Ok(value) => value,
            Err(e) => {
                self.stats.decode_errors += 1;
                error!("parse fail: {} (line: {})", e, line);
                return Ok(());
            }
        };
        self.stats.decoded += 1;

        if self.config.echo {
            self.renderer.echo(line)?;
        }

        match parse_record(&value) {
            Ok(record) => self.handle_record(record),
            Err(e) => {
                self.stats.ignored += 1;
                trace!("Ignoring record: {}", e);
                Ok(())
            }
        }
    }

    /// Apply one decoded record to the ledger and aggregator.
    pub fn handle_record(&mut self, record: LogRecord) -> Result<()> {
        for issue in &record.issues {
            self.stats.conversion_errors += 1;
            error!("session {}: {}; using 0", record.session, issue);
        }

        let ts = self.config.normalize_ts(record.ts);
        let session = record.session.as_str();

        match &record.kind {
            EventKind::Begin => {
                if let Some(prev) = self.ledger.on_begin(session, ts) {
                    self.stats.replaced += 1;
                    warn!(
                        "Session {} began again at {}; discarding transaction begun at {} ({} bytes)",
                        session,
                        ts,
                        prev.begin,
                        prev.bytes
                    );
                }
            }
            EventKind::Directional(direction) => {
                if let Err(e) = self
                    .ledger
                    .on_directional(session, direction, record.bytes, ts)
                {
                    self.report_dropped(&e);
                }
            }
            EventKind::End => match self.ledger.on_end(session, ts) {
                Ok(done) => self.complete(done)?,
                Err(e) => self.report_dropped(&e),
            },
            EventKind::Other => {
                self.stats.ignored += 1;
            }
        }
        Ok(())
    }

    /// Emit the global summaries (when enabled) and flush the output.
    pub fn finish(&mut self) -> Result<()> {
        if self.config.gstat {
            let summaries: Vec<GlobalSummary> = self
                .aggregator
                .directions()
                .filter_map(|d| self.aggregator.summarize(d))
                .collect();
            for summary in &summaries {
                self.renderer.render(GSTAT_METRIC, &gstat_params(summary))?;
            }
        }
        self.renderer.flush()?;

        if !self.ledger.is_empty() {
            info!(
                "{} transaction(s) still open at end of input: {}",
                self.ledger.len(),
                self.ledger.open_sessions().join(", ")
            );
        }
        debug!("Run finished: {:?}", self.stats);
        Ok(())
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    pub fn aggregator(&self) -> &GlobalAggregator {
        &self.aggregator
    }

    /// Consume the collector and hand back the output sink.
    pub fn into_output(self) -> W {
        self.renderer.into_inner()
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    fn complete(&mut self, done: CompletedTransaction) -> Result<()> {
        if done.end < done.begin {
            self.stats.reversed += 1;
            warn!(
                "Session {} ended at {} before it began at {}; transaction dropped",
                done.session, done.end, done.begin
            );
            return Ok(());
        }
        self.stats.completed += 1;

        if self.config.stat {
            self.renderer.render(TXN_METRIC, &txn_params(&done))?;
        }

        match done.direction.as_deref() {
            Some(direction) => {
                if !self.aggregator.fold(direction, done.bytes, done.latency()) {
                    warn!(
                        "Session {}: no global bucket for direction {:?}; not aggregated",
                        done.session, direction
                    );
                }
            }
            None => debug!(
                "Session {} ended without directional events; not aggregated",
                done.session
            ),
        }
        Ok(())
    }

    fn report_dropped(&mut self, err: &CollectError) {
        self.stats.missing_begin += 1;
        warn!("{}; event dropped", err);
    }
}

// ── Metric parameters ─────────────────────────────────────────────────────────

fn txn_params(done: &CompletedTransaction) -> Vec<NamedParam> {
    vec![
        NamedParam::float("throughput", done.throughput()),
        NamedParam::string("session", done.session.as_str()),
        NamedParam::string("counter", done.counter()),
        NamedParam::int("bytes", saturating_i64(done.bytes)),
        NamedParam::int("latency", done.latency()),
        NamedParam::int("begin", done.begin),
        NamedParam::int("end", done.end),
    ]
}

fn gstat_params(summary: &GlobalSummary) -> Vec<NamedParam> {
    vec![
        NamedParam::string("counter", summary.direction.as_str()),
        NamedParam::float("throughput", summary.throughput),
        NamedParam::float("latency", summary.latency),
        NamedParam::float("bytes", summary.bytes),
        NamedParam::int("count", saturating_i64(summary.count)),
    ]
}

fn saturating_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::io::Cursor;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn event(ts: i64, msg: &str, session: &str) -> String {
        json!({"ts": ts, "msg": msg, "fields": {"session": session}}).to_string()
    }

    fn bytes_event(ts: i64, msg: &str, session: &str, bytes: u64) -> String {
        json!({"ts": ts, "msg": msg, "fields": {"session": session, "bytes": bytes}}).to_string()
    }

    fn config(raw: &str) -> CommandConfig {
        CommandConfig::from_json(raw).unwrap()
    }

    /// Run `lines` through a collector and return it with its output.
    fn run_lines(cfg: CommandConfig, lines: &[String]) -> (RunStats, GlobalAggregator, String) {
        let mut collector = Collector::new(cfg, Vec::new());
        let input = lines.join("\n");
        let stats = collector.run(Cursor::new(input)).unwrap();
        let agg = collector.aggregator().clone();
        let out = String::from_utf8(collector.into_output()).unwrap();
        (stats, agg, out)
    }

    fn json_lines(out: &str) -> Vec<Value> {
        out.lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn single_up_transaction() -> Vec<String> {
        vec![
            event(0, "begin", "s1"),
            bytes_event(0, "directional-up", "s1", 100),
            event(10, "end", "s1"),
        ]
    }

    // ── Scenarios ─────────────────────────────────────────────────────────────

    #[test]
    fn test_single_transaction_record_and_bucket() {
        let cfg = config(r#"{"stat":true,"gstat":false}"#);
        let (stats, agg, out) = run_lines(cfg, &single_up_transaction());

        let records = json_lines(&out);
        assert_eq!(records.len(), 1);
        let fields = &records[0]["fields"];
        assert_eq!(records[0]["msg"], "txn");
        assert_eq!(fields["session"], "s1");
        assert_eq!(fields["counter"], "up");
        assert_eq!(fields["bytes"], 100);
        assert_eq!(fields["latency"], 10);
        assert_eq!(fields["throughput"], 10.0);

        let up = agg.get("up").unwrap();
        assert_eq!((up.count, up.bytes, up.diff), (1, 100, 10));
        assert_eq!(agg.get("down").unwrap().count, 0);
        assert_eq!(stats.completed, 1);
    }

    #[test]
    fn test_end_for_unknown_session_has_no_effect() {
        let cfg = config(r#"{"stat":true,"gstat":false}"#);
        let (stats, agg, out) = run_lines(cfg, &[event(10, "end", "ghost")]);
        assert!(out.is_empty());
        assert_eq!(stats.missing_begin, 1);
        assert_eq!(stats.completed, 0);
        assert_eq!(agg.get("up").unwrap().count, 0);
        assert_eq!(agg.get("down").unwrap().count, 0);
    }

    #[test]
    fn test_directional_for_unknown_session_creates_nothing() {
        let mut collector = Collector::new(CommandConfig::default(), Vec::new());
        collector
            .process_line(&bytes_event(1, "directional-up", "ghost", 5))
            .unwrap();
        assert!(collector.ledger().is_empty());
        assert_eq!(collector.stats().missing_begin, 1);
    }

    #[test]
    fn test_two_transactions_global_summary() {
        let lines = vec![
            event(0, "begin", "a"),
            bytes_event(1, "directional-up", "a", 100),
            event(10, "end", "a"),
            event(20, "begin", "b"),
            bytes_event(21, "directional-up", "b", 50),
            event(25, "end", "b"),
        ];
        let (_, _, out) = run_lines(CommandConfig::default(), &lines);

        let records = json_lines(&out);
        assert_eq!(records.len(), 2, "one gstat per registered direction");
        assert_eq!(records[0]["msg"], "gstat");
        let up = &records[0]["fields"];
        assert_eq!(up["counter"], "up");
        assert_eq!(up["throughput"], 10.0);
        assert_eq!(up["latency"], 7.5);
        assert_eq!(up["bytes"], 75.0);
        assert_eq!(up["count"], 2);

        let down = &records[1]["fields"];
        assert_eq!(down["counter"], "down");
        assert_eq!(down["throughput"], "NaN");
        assert_eq!(down["count"], 0);
    }

    #[test]
    fn test_bytes_accumulate_across_directional_events() {
        let lines = vec![
            event(0, "begin", "s1"),
            bytes_event(1, "directional-down", "s1", 30),
            bytes_event(2, "directional-down", "s1", 40),
            bytes_event(3, "directional-down", "s1", 30),
            event(5, "end", "s1"),
        ];
        let (_, agg, _) = run_lines(CommandConfig::default(), &lines);
        let down = agg.get("down").unwrap();
        assert_eq!((down.count, down.bytes, down.diff), (1, 100, 5));
    }

    #[test]
    fn test_fold_goes_to_last_direction_only() {
        let lines = vec![
            event(0, "begin", "s1"),
            bytes_event(1, "directional-up", "s1", 10),
            bytes_event(2, "directional-down", "s1", 20),
            event(4, "end", "s1"),
        ];
        let (_, agg, _) = run_lines(CommandConfig::default(), &lines);
        assert_eq!(agg.get("up").unwrap().count, 0);
        let down = agg.get("down").unwrap();
        assert_eq!((down.count, down.bytes), (1, 30));
    }

    #[test]
    fn test_zero_latency_transaction_throughput_is_inf() {
        let lines = vec![
            event(7, "begin", "s1"),
            bytes_event(7, "directional-up", "s1", 100),
            event(7, "end", "s1"),
        ];
        let cfg = config(r#"{"stat":true,"gstat":false,"selected":["throughput","latency"]}"#);
        let (_, _, out) = run_lines(cfg, &lines);
        assert_eq!(out, "{\"throughput\"=+Inf,\"latency\"=0}\n");
    }

    #[test]
    fn test_transaction_without_direction_is_not_folded() {
        let lines = vec![event(0, "begin", "s1"), event(3, "end", "s1")];
        let (stats, agg, out) = run_lines(config(r#"{"stat":true,"gstat":false}"#), &lines);
        assert_eq!(stats.completed, 1);
        assert_eq!(agg.get("up").unwrap().count, 0);
        assert_eq!(agg.get("down").unwrap().count, 0);
        let records = json_lines(&out);
        assert_eq!(records[0]["fields"]["counter"], "");
        assert_eq!(records[0]["fields"]["throughput"], 0.0);
    }

    #[test]
    fn test_repeated_begin_replaces_transaction() {
        let lines = vec![
            event(0, "begin", "s1"),
            bytes_event(1, "directional-up", "s1", 999),
            event(10, "begin", "s1"),
            bytes_event(11, "directional-up", "s1", 10),
            event(15, "end", "s1"),
        ];
        let (stats, agg, _) = run_lines(CommandConfig::default(), &lines);
        assert_eq!(stats.replaced, 1);
        let up = agg.get("up").unwrap();
        assert_eq!((up.count, up.bytes, up.diff), (1, 10, 5));
    }

    #[test]
    fn test_end_before_begin_is_dropped() {
        let lines = vec![
            event(0, "begin", "a"),
            bytes_event(1, "directional-up", "a", 100),
            event(10, "end", "a"),
            event(50, "begin", "b"),
            bytes_event(51, "directional-up", "b", 10),
            event(20, "end", "b"),
        ];
        let cfg = config(r#"{"stat":true,"gstat":false,"selected":["session"]}"#);
        let (stats, agg, out) = run_lines(cfg, &lines);

        assert_eq!(out, "{\"session\"=\"a\"}\n");
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.reversed, 1);
        let up = agg.get("up").unwrap();
        assert_eq!((up.count, up.bytes, up.diff), (1, 100, 10));
        let summary = agg.summarize("up").unwrap();
        assert_eq!(summary.throughput, 10.0);
        assert_eq!(summary.latency, 10.0);
    }

    #[test]
    fn test_stat_rows_precede_global_rows() {
        let lines = vec![
            event(0, "begin", "a"),
            event(1, "begin", "b"),
            bytes_event(2, "directional-down", "b", 20),
            bytes_event(3, "directional-up", "a", 30),
            event(4, "end", "b"),
            event(6, "end", "a"),
        ];
        let cfg = config(r#"{"stat":true,"selected":["msg","session","counter","count"]}"#);
        let (_, _, out) = run_lines(cfg, &lines);
        let rows: Vec<&str> = out.lines().collect();
        assert_eq!(
            rows,
            vec![
                r#"{"msg"="txn","session"="b","counter"="down"}"#,
                r#"{"msg"="txn","session"="a","counter"="up"}"#,
                r#"{"msg"="gstat","counter"="up","count"=1}"#,
                r#"{"msg"="gstat","counter"="down","count"=1}"#,
            ]
        );
    }

    // ── Input handling ────────────────────────────────────────────────────────

    #[test]
    fn test_whitespace_only_line_is_decode_error() {
        let lines = vec!["   ".to_string(), String::new(), "\t".to_string()];
        let (stats, _, out) = run_lines(config(r#"{"gstat":false}"#), &lines);
        assert_eq!(stats.lines, 3);
        assert_eq!(stats.decode_errors, 2);
        assert_eq!(stats.decoded, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_prefixed_lines_and_noise() {
        let lines = vec![
            format!("web-1 | {}", event(0, "begin", "s1")),
            "not json at all".to_string(),
            String::new(),
            json!({"ts": 3, "msg": "request served", "fields": {"session": "s1"}}).to_string(),
            json!({"level": "info", "msg": "no fields here"}).to_string(),
            format!("web-1 | {}", bytes_event(4, "directional-up", "s1", 40)),
            event(8, "end", "s1"),
        ];
        let (stats, agg, _) = run_lines(CommandConfig::default(), &lines);
        assert_eq!(stats.lines, 7);
        assert_eq!(stats.decode_errors, 1);
        assert_eq!(stats.decoded, 5);
        assert_eq!(stats.ignored, 2);
        assert_eq!(agg.get("up").unwrap().bytes, 40);
    }

    #[test]
    fn test_numeric_conversion_treated_as_zero() {
        let lines = vec![
            event(0, "begin", "s1"),
            json!({"ts": 2, "msg": "directional-up", "fields": {"session": "s1", "bytes": "lots"}})
                .to_string(),
            event(4, "end", "s1"),
        ];
        let (stats, agg, _) = run_lines(CommandConfig::default(), &lines);
        assert_eq!(stats.conversion_errors, 1);
        let up = agg.get("up").unwrap();
        assert_eq!((up.count, up.bytes), (1, 0));
    }

    #[test]
    fn test_transaction_names_are_accepted() {
        let lines = vec![
            event(0, "transaction begin", "s1"),
            bytes_event(1, "transaction down", "s1", 64),
            event(8, "transaction end", "s1"),
        ];
        let (_, agg, _) = run_lines(CommandConfig::default(), &lines);
        let down = agg.get("down").unwrap();
        assert_eq!((down.count, down.bytes, down.diff), (1, 64, 8));
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let mut input = Vec::new();
        input.extend_from_slice(event(0, "begin", "s1").as_bytes());
        input.extend_from_slice(b"\n\xff\xfe garbage\n");
        input.extend_from_slice(bytes_event(1, "directional-up", "s1", 5).as_bytes());
        input.push(b'\n');
        input.extend_from_slice(event(2, "end", "s1").as_bytes());

        let mut collector = Collector::new(config(r#"{"gstat":false}"#), Vec::new());
        let stats = collector.run(Cursor::new(input)).unwrap();
        assert_eq!(stats.decode_errors, 1);
        assert_eq!(stats.completed, 1);
    }

    // ── Configuration effects ─────────────────────────────────────────────────

    #[test]
    fn test_echo_writes_input_before_metrics() {
        let cfg = config(r#"{"echo":true,"stat":true,"gstat":false,"selected":["msg"]}"#);
        let (_, _, out) = run_lines(cfg, &single_up_transaction());
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], single_up_transaction()[0]);
        assert_eq!(lines[2], single_up_transaction()[2]);
        assert_eq!(lines[3], r#"{"msg"="txn"}"#);
    }

    #[test]
    fn test_echo_strips_prefix() {
        let line = format!("prefix {}", event(0, "begin", "s1"));
        let (_, _, out) = run_lines(config(r#"{"echo":true,"gstat":false}"#), &[line]);
        assert_eq!(out.trim_end(), event(0, "begin", "s1"));
    }

    #[test]
    fn test_gstat_disabled_emits_nothing() {
        let (_, _, out) = run_lines(config(r#"{"gstat":false}"#), &single_up_transaction());
        assert!(out.is_empty());
    }

    #[test]
    fn test_selected_mode_gstat_rows() {
        let cfg = config(r#"{"selected":["msg","counter","count"]}"#);
        let (_, _, out) = run_lines(cfg, &single_up_transaction());
        let rows: Vec<&str> = out.lines().collect();
        assert_eq!(
            rows,
            vec![
                r#"{"msg"="gstat","counter"="up","count"=1}"#,
                r#"{"msg"="gstat","counter"="down","count"=0}"#,
            ]
        );
    }

    #[test]
    fn test_ts_divisor_normalises_timestamps() {
        let lines = vec![
            event(1_000_000, "begin", "s1"),
            bytes_event(1_000_500, "directional-up", "s1", 100),
            event(1_010_999, "end", "s1"),
        ];
        let (_, agg, _) = run_lines(config(r#"{"ts_divisor":1000}"#), &lines);
        assert_eq!(agg.get("up").unwrap().diff, 10);
    }

    #[test]
    fn test_dynamic_directions() {
        let lines = vec![
            event(0, "begin", "s1"),
            bytes_event(1, "directional-sideways", "s1", 8),
            event(2, "end", "s1"),
        ];
        let (_, fixed, _) = run_lines(CommandConfig::default(), &lines);
        assert!(fixed.get("sideways").is_none());

        let cfg = config(r#"{"dynamic":true,"selected":["counter"]}"#);
        let (_, dynamic, out) = run_lines(cfg, &lines);
        assert_eq!(dynamic.get("sideways").unwrap().count, 1);
        assert_eq!(out.lines().last(), Some(r#"{"counter"="sideways"}"#));
    }

    #[test]
    fn test_run_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in single_up_transaction() {
            writeln!(file, "{}", line).unwrap();
        }
        let reader = std::io::BufReader::new(std::fs::File::open(file.path()).unwrap());

        let cfg = config(r#"{"selected":["counter","throughput"]}"#);
        let mut collector = Collector::new(cfg, Vec::new());
        let stats = collector.run(reader).unwrap();
        assert_eq!(stats.completed, 1);
        let out = String::from_utf8(collector.into_output()).unwrap();
        assert_eq!(out.lines().next(), Some(r#"{"counter"="up","throughput"=10.000000}"#));
    }

    #[test]
    fn test_write_failure_is_returned() {
        struct FailingSink;
        impl std::io::Write for FailingSink {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut collector = Collector::new(CommandConfig::default(), FailingSink);
        let err = collector
            .run(Cursor::new(single_up_transaction().join("\n")))
            .unwrap_err();
        assert!(matches!(err, CollectError::Io(_)));
    }
}
