use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::{CollectError, Result};

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Per-session and global throughput statistics from transaction logs on stdin
#[derive(Parser, Debug, Clone)]
#[command(
    name = "txnstat",
    about = "Per-session and global throughput statistics from transaction logs on stdin",
    version
)]
pub struct Settings {
    /// JSON command config, e.g. '{"stat":true,"selected":["msg","counter"]}'
    #[arg(long, default_value = "{}")]
    pub command: String,

    /// Logging level for diagnostics written to stderr
    #[arg(long, default_value = "WARNING", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR"])]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Settings {
    /// Decode the `--command` JSON into a [`CommandConfig`].
    pub fn command_config(&self) -> Result<CommandConfig> {
        CommandConfig::from_json(&self.command)
    }

    /// Effective log level, with `--debug` taking precedence.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "DEBUG"
        } else {
            &self.log_level
        }
    }
}

// ── CommandConfig ──────────────────────────────────────────────────────────────

/// Options selecting what the collector emits.
///
/// Keys missing from the JSON object keep their defaults and unknown keys are
/// ignored. A key present with the wrong type is a configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Echo every decoded input line to the output.
    pub echo: bool,
    /// Emit one summary per direction at end of input.
    pub gstat: bool,
    /// Emit one record per completed transaction.
    pub stat: bool,
    /// When non-empty, emit only these keys, in this order.
    pub selected: Vec<String>,
    /// Divide every input timestamp by this before use (1 disables).
    pub ts_divisor: u64,
    /// Create a global bucket for any direction label seen, not just up/down.
    pub dynamic: bool,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            echo: false,
            gstat: true,
            stat: false,
            selected: Vec::new(),
            ts_divisor: 1,
            dynamic: false,
        }
    }
}

impl CommandConfig {
    /// Parse a command object.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(CollectError::Config)
    }

    /// `true` when output is restricted to the `selected` keys.
    pub fn is_selected_mode(&self) -> bool {
        !self.selected.is_empty()
    }

    /// Apply timestamp unit normalisation.
    pub fn normalize_ts(&self, ts: i64) -> i64 {
        match self.ts_divisor {
            0 | 1 => ts,
            div => ts / i64::try_from(div).unwrap_or(i64::MAX),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
