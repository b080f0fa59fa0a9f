use thiserror::Error;

/// All errors produced while collecting transaction statistics.
///
/// Only [`CollectError::Config`] and [`CollectError::Io`] are fatal. Every
/// other variant is local to one input line: the driver logs it and moves on.
#[derive(Error, Debug)]
pub enum CollectError {
    /// The `--command` configuration object could not be decoded.
    #[error("Configuration error: {0}")]
    Config(#[source] serde_json::Error),

    /// An input line is not valid JSON.
    #[error("Failed to parse JSON: {source}")]
    Decode {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    /// A decoded record lacks a required field or has it with the wrong type.
    #[error("Record is missing required field: {0}")]
    Schema(&'static str),

    /// A directional or end event referenced a session with no open transaction.
    #[error("No open transaction for session {session}")]
    MissingBegin { session: String },

    /// A numeric field is present but not representable as an integer.
    #[error("Invalid numeric value for {field}: {value}")]
    NumericConversion { field: &'static str, value: String },

    /// Pass-through for reading input or writing output.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the txnstat crates.
pub type Result<T> = std::result::Result<T, CollectError>;
