//! Domain records surfaced by the ledger store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Depth of the per-user usage history ring. Older timestamps drop off.
pub const HISTORY_DEPTH: usize = 10;

/// A registered card token and its accounting state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Opaque card token presented at a unit.
    pub card_id: String,

    /// Usage permission. Admin-controlled; a disallowed card is rejected
    /// before any accounting happens.
    pub allowed: bool,

    /// Remaining dispensing allotment. Never negative.
    pub stock: i64,

    /// Usage count since the last external reset.
    pub today: i64,

    /// Lifetime usage count.
    pub total: i64,

    /// When the card was registered.
    pub registered_at: DateTime<Utc>,

    /// Most-recent-first ring of the last usage timestamps,
    /// at most [`HISTORY_DEPTH`] entries.
    pub history: Vec<DateTime<Utc>>,
}

/// A remote dispensing unit known to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitRecord {
    /// Unique unit name.
    pub name: String,

    /// Unit-local inventory, maintained by external dispensing logic.
    pub stock: i64,

    /// Whether the unit is currently considered online.
    pub online: bool,

    /// Admin-controlled enable flag.
    pub available: bool,

    /// Last heartbeat instant, if the unit has ever been seen.
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// One append-only audit log entry. Immutable once written; insertion order
/// is chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub at: DateTime<Utc>,
    pub txt: String,
}

/// Audit line for a recorded usage. The card token is embedded so the entry
/// doubles as the analytics source for per-card exports.
pub(crate) fn usage_audit_line(card_id: &str) -> String {
    format!("usage recorded ({card_id})")
}

/// Audit line tagged with the originating unit, `[name] message`.
pub(crate) fn unit_audit_line(unit_name: &str, message: &str) -> String {
    format!("[{unit_name}] {message}")
}

/// Tag prefix used to find audit entries from a given unit.
pub(crate) fn unit_audit_tag(unit_name: &str) -> String {
    format!("[{unit_name}]")
}
