//! Session ledger: correlates begin, directional and end events by session.

use std::collections::HashMap;

use txnstat_core::error::{CollectError, Result};
use txnstat_core::models::{CompletedTransaction, Transaction};

/// Open transactions keyed by session identifier.
///
/// The ledger is the only owner of live [`Transaction`]s. A transaction leaves
/// the ledger on its end event as a [`CompletedTransaction`] snapshot.
#[derive(Debug, Default)]
pub struct SessionLedger {
    open: HashMap<String, Transaction>,
}

impl SessionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a transaction for `session` at `ts`.
    ///
    /// A transaction already open under the same session is replaced and
    /// returned so the caller can report it.
    pub fn on_begin(&mut self, session: &str, ts: i64) -> Option<Transaction> {
        self.open
            .insert(session.to_string(), Transaction::new(session, ts))
    }

    /// Add `delta_bytes` moving in `direction` to the open transaction.
    pub fn on_directional(
        &mut self,
        session: &str,
        direction: &str,
        delta_bytes: u64,
        _ts: i64,
    ) -> Result<()> {
        let txn = self
            .open
            .get_mut(session)
            .ok_or_else(|| CollectError::MissingBegin {
                session: session.to_string(),
            })?;
        txn.add_directional(direction, delta_bytes);
        Ok(())
    }

    /// Close the transaction for `session` at `ts` and remove it.
    pub fn on_end(&mut self, session: &str, ts: i64) -> Result<CompletedTransaction> {
        self.open
            .remove(session)
            .map(|txn| txn.complete(ts))
            .ok_or_else(|| CollectError::MissingBegin {
                session: session.to_string(),
            })
    }

    /// Look up an open transaction.
    pub fn get(&self, session: &str) -> Option<&Transaction> {
        self.open.get(session)
    }

    /// Sessions that have begun but not ended, sorted.
    pub fn open_sessions(&self) -> Vec<&str> {
        let mut sessions: Vec<&str> = self.open.keys().map(String::as_str).collect();
        sessions.sort_unstable();
        sessions
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
