//! Ledger core for a fleet of unattended dispensing units.
//!
//! This crate is the single source of truth behind the coordinator server:
//!
//! - SQLite-backed ledger store for card-token users, units and the
//!   append-only audit log
//! - Usage authorization and atomic accounting (conditional stock decrement,
//!   double-spend safe)
//! - Liveness tracking for the unit fleet (trust-on-first-use heartbeat
//!   provisioning, timeout-based online state)
//!
//! It performs no network I/O. Wall-clock instants are passed in by callers
//! so every state transition is testable at a fixed point in time.

pub mod accounting;
pub mod error;
pub mod liveness;
pub mod model;
pub mod storage;

pub use error::{LedgerError, LedgerResult};
pub use model::{AuditEntry, UnitRecord, UserRecord, HISTORY_DEPTH};
pub use storage::LedgerStore;
