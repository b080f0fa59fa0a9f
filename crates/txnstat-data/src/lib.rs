//! Stream processing for txnstat.
//!
//! Decodes structured log lines, correlates begin/directional/end events into
//! transactions, aggregates them per traffic direction and renders the
//! resulting metrics.

pub mod aggregator;
pub mod driver;
pub mod ledger;
pub mod reader;
pub mod render;

pub use driver::{Collector, RunStats};
pub use txnstat_core as core;
