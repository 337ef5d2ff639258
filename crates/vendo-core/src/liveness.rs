//! Fleet liveness tracking.
//!
//! Units announce themselves with periodic heartbeats. Online state expires
//! lazily: the sweep runs on every read of the unit list rather than on a
//! background timer, so no caller ever observes a unit online more than
//! [`HEARTBEAT_TIMEOUT_SECONDS`] past its last heartbeat.

use chrono::{DateTime, Duration, Utc};

use crate::error::LedgerResult;
use crate::model::{unit_audit_line, UnitRecord};
use crate::storage::store::HeartbeatAck;
use crate::storage::LedgerStore;

/// Units heartbeat every 30 seconds; 65 seconds allows one missed beat
/// plus delivery margin before a unit is taken offline.
pub const HEARTBEAT_TIMEOUT_SECONDS: i64 = 65;

/// Expected heartbeat interval on the unit side.
pub const HEARTBEAT_INTERVAL_SECONDS: u64 = 30;

/// Outcome of an accepted heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// First contact: the unit was provisioned with the presented credential.
    Registered,
    /// Known unit, credential matched, last-seen refreshed.
    Accepted,
}

impl HeartbeatOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Accepted => "accepted",
        }
    }
}

/// Process a heartbeat from a unit.
///
/// Trust on first use: an unknown name is provisioned with the presented
/// credential; later heartbeats must match it or fail with
/// [`crate::LedgerError::Unauthorized`] and no state change.
pub fn heartbeat(
    store: &LedgerStore,
    name: &str,
    password: &str,
    now: DateTime<Utc>,
) -> LedgerResult<HeartbeatOutcome> {
    let ack: HeartbeatAck = store.heartbeat(name, password, now)?;
    if ack.was_new {
        Ok(HeartbeatOutcome::Registered)
    } else {
        Ok(HeartbeatOutcome::Accepted)
    }
}

/// List all units with the expiry sweep applied first.
///
/// This is the only sanctioned way to observe online state; it upholds the
/// invariant that a unit past the timeout is never reported online.
pub fn list_units(store: &LedgerStore, now: DateTime<Utc>) -> LedgerResult<Vec<UnitRecord>> {
    store.sweep_expired(now, Duration::seconds(HEARTBEAT_TIMEOUT_SECONDS))?;
    store.list_units()
}

/// Append a log message forwarded by a unit, tagged `[name] message`.
pub fn append_unit_log(
    store: &LedgerStore,
    unit_name: &str,
    message: &str,
    now: DateTime<Utc>,
) -> LedgerResult<i64> {
    store.append_audit(&unit_audit_line(unit_name, message), now)
}
