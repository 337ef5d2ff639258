//! SQLite-backed ledger storage.

pub mod rows;
pub mod schema;
pub mod store;

pub use store::LedgerStore;

use chrono::{DateTime, Utc};

use crate::error::LedgerError;

/// Timestamps are persisted as RFC 3339 UTC strings.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::corrupt(format!("invalid timestamp {s:?}: {e}")))
}
