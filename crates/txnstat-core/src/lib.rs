//! Shared types for txnstat: the transaction data model, typed metric fields,
//! command configuration and the error taxonomy.

pub mod error;
pub mod fields;
pub mod models;
pub mod settings;

pub use error::{CollectError, Result};
