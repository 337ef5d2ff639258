//! LedgerStore: SQLite-backed fleet and accounting state.
//!
//! Provides atomic, double-spend safe usage accounting with:
//! - Conditional stock decrement (at most one success per unit of stock)
//! - UNIQUE-constraint registration (one row per card token, ever)
//! - Trust-on-first-use heartbeat provisioning for units
//! - Audit entries committed in the same transaction as the state they record

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::rows::{AuditRow, UnitRow, UserRow};
use super::schema::{migrate, LEDGER_SCHEMA};
use super::{format_ts, parse_ts};
use crate::error::{LedgerError, LedgerResult};
use crate::model::{
    unit_audit_tag, usage_audit_line, AuditEntry, UnitRecord, UserRecord, HISTORY_DEPTH,
};

/// Heartbeat acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatAck {
    pub unit_name: String,
    pub last_seen: DateTime<Utc>,
    /// True if this heartbeat auto-registered a previously unknown unit.
    pub was_new: bool,
}

/// SQLite-backed ledger store.
#[derive(Clone)]
pub struct LedgerStore {
    conn: Arc<Mutex<Connection>>,
}

impl LedgerStore {
    /// Open a file-backed store.
    pub fn open(path: &Path) -> LedgerResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn memory() -> LedgerResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_connection(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_connection(conn: &Connection) -> LedgerResult<()> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        // WAL mode for file-backed DBs (no-op for in-memory)
        let _ = conn.execute("PRAGMA journal_mode = WAL", []);
        conn.execute_batch(LEDGER_SCHEMA)?;
        migrate(conn)?;
        Ok(())
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Register a card token. Exactly one row per token, ever: the UNIQUE
    /// constraint resolves concurrent attempts so that one caller gets the
    /// row and all others get `AlreadyRegistered`.
    pub fn register_user(&self, card_id: &str, now: DateTime<Utc>) -> LedgerResult<UserRecord> {
        if card_id.is_empty() {
            return Err(LedgerError::invalid_input("card_id must not be empty"));
        }

        let conn = self.conn.lock().unwrap();
        conn.execute("BEGIN IMMEDIATE", [])?;
        let result = register_user_inner(&conn, card_id, now);
        finish_tx(&conn, &result)?;
        result
    }

    /// Fetch a user record by card token.
    pub fn get_user(&self, card_id: &str) -> LedgerResult<Option<UserRecord>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<UserRow> = conn
            .query_row(
                "SELECT card_id, allowed, stock, today, total, registered_at, history
                 FROM users WHERE card_id = ?1",
                [card_id],
                user_row,
            )
            .optional()?;
        row.map(user_record).transpose()
    }

    /// All users, oldest registration first.
    pub fn list_users(&self) -> LedgerResult<Vec<UserRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT card_id, allowed, stock, today, total, registered_at, history
             FROM users ORDER BY registered_at ASC, card_id ASC",
        )?;
        let rows = stmt
            .query_map([], user_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(user_record).collect()
    }

    /// Consume one unit of stock for a card token.
    ///
    /// Applies `stock -= 1, total += 1, today += 1`, shifts the usage
    /// history ring and appends the usage audit entry as a single
    /// transaction: either all of it commits or none of it does.
    pub fn record_usage(&self, card_id: &str, now: DateTime<Utc>) -> LedgerResult<UserRecord> {
        let conn = self.conn.lock().unwrap();

        // BEGIN IMMEDIATE acquires the write lock up front
        conn.execute("BEGIN IMMEDIATE", [])?;
        let result = record_usage_inner(&conn, card_id, now);
        finish_tx(&conn, &result)?;
        result
    }

    // =========================================================================
    // Units
    // =========================================================================

    /// Process a unit heartbeat.
    ///
    /// Trust on first use: the first heartbeat from an unknown name
    /// provisions the unit with the presented credential; every later
    /// heartbeat must match it. Provisioning and credential check happen in
    /// one transaction so two concurrent first contacts cannot both create
    /// the unit.
    pub fn heartbeat(
        &self,
        name: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> LedgerResult<HeartbeatAck> {
        if name.is_empty() || password.is_empty() {
            return Err(LedgerError::invalid_input(
                "unit name and password are required",
            ));
        }

        let conn = self.conn.lock().unwrap();
        conn.execute("BEGIN IMMEDIATE", [])?;
        let result = heartbeat_inner(&conn, name, password, now);
        finish_tx(&conn, &result)?;
        result
    }

    /// Mark every online unit not heard from within `timeout` as offline,
    /// appending an audit entry per expired unit. Returns the names taken
    /// offline.
    pub fn sweep_expired(
        &self,
        now: DateTime<Utc>,
        timeout: Duration,
    ) -> LedgerResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        conn.execute("BEGIN IMMEDIATE", [])?;
        let result = sweep_expired_inner(&conn, now, timeout);
        finish_tx(&conn, &result)?;
        result
    }

    /// Fetch a unit record by name. The credential is not surfaced.
    pub fn get_unit(&self, name: &str) -> LedgerResult<Option<UnitRecord>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<UnitRow> = conn
            .query_row(
                "SELECT name, password, stock, online, available, last_seen
                 FROM units WHERE name = ?1",
                [name],
                unit_row,
            )
            .optional()?;
        row.map(unit_record).transpose()
    }

    /// All units, by name. Callers observing online state go through
    /// [`crate::liveness::list_units`], which sweeps first.
    pub fn list_units(&self) -> LedgerResult<Vec<UnitRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT name, password, stock, online, available, last_seen
             FROM units ORDER BY name ASC",
        )?;
        let rows = stmt
            .query_map([], unit_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(unit_record).collect()
    }

    // =========================================================================
    // Audit log
    // =========================================================================

    /// Append one audit entry. Returns its id.
    pub fn append_audit(&self, txt: &str, now: DateTime<Utc>) -> LedgerResult<i64> {
        let conn = self.conn.lock().unwrap();
        append_audit_inner(&conn, txt, now)
    }

    /// Most recent audit entries, newest first.
    pub fn recent_audit(&self, limit: u32) -> LedgerResult<Vec<AuditEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, at, txt FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map([limit], audit_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(audit_entry).collect()
    }

    /// Audit entries tagged with a unit name (`[name] ...`), newest first.
    pub fn unit_audit(&self, unit_name: &str, limit: u32) -> LedgerResult<Vec<AuditEntry>> {
        let pattern = format!("%{}%", unit_audit_tag(unit_name));
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, at, txt FROM audit_log WHERE txt LIKE ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![pattern, limit], audit_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(audit_entry).collect()
    }

    /// Total audit entry count (for testing).
    pub fn count_audit(&self) -> LedgerResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
        Ok(count)
    }

    /// User row count (for testing).
    pub fn count_users(&self) -> LedgerResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Force a unit's `last_seen` to an arbitrary instant (for testing the
    /// expiry sweep without waiting).
    #[doc(hidden)]
    pub fn set_unit_last_seen(&self, name: &str, last_seen: DateTime<Utc>) -> LedgerResult<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE units SET last_seen = ?1 WHERE name = ?2",
            params![format_ts(last_seen), name],
        )?;
        if n == 0 {
            return Err(LedgerError::UnitNotFound {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Toggle a user's usage permission (admin edit path).
    pub fn set_user_allowed(&self, card_id: &str, allowed: bool) -> LedgerResult<()> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE users SET allowed = ?1 WHERE card_id = ?2",
            params![allowed as i64, card_id],
        )?;
        if n == 0 {
            return Err(LedgerError::UserNotFound {
                card_id: card_id.to_string(),
            });
        }
        Ok(())
    }

    /// Overwrite a user's stock (admin edit path).
    pub fn set_user_stock(&self, card_id: &str, stock: i64) -> LedgerResult<()> {
        if stock < 0 {
            return Err(LedgerError::invalid_input("stock must not be negative"));
        }
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE users SET stock = ?1 WHERE card_id = ?2",
            params![stock, card_id],
        )?;
        if n == 0 {
            return Err(LedgerError::UserNotFound {
                card_id: card_id.to_string(),
            });
        }
        Ok(())
    }
}

fn finish_tx<T>(conn: &Connection, result: &LedgerResult<T>) -> LedgerResult<()> {
    match result {
        Ok(_) => {
            conn.execute("COMMIT", [])?;
        }
        Err(_) => {
            let _ = conn.execute("ROLLBACK", []);
        }
    }
    Ok(())
}

fn register_user_inner(
    conn: &Connection,
    card_id: &str,
    now: DateTime<Utc>,
) -> LedgerResult<UserRecord> {
    // Atomic INSERT, not SELECT-then-INSERT: the UNIQUE constraint is the
    // arbiter under concurrent registration.
    let insert = conn.execute(
        "INSERT INTO users (card_id, registered_at) VALUES (?1, ?2)",
        params![card_id, format_ts(now)],
    );
    if let Err(e) = insert {
        if e.to_string().contains("UNIQUE constraint failed") {
            return Err(LedgerError::AlreadyRegistered {
                card_id: card_id.to_string(),
            });
        }
        return Err(e.into());
    }

    append_audit_inner(conn, &format!("card registered ({card_id})"), now)?;

    let row = conn.query_row(
        "SELECT card_id, allowed, stock, today, total, registered_at, history
         FROM users WHERE card_id = ?1",
        [card_id],
        user_row,
    )?;
    user_record(row)
}

fn record_usage_inner(
    conn: &Connection,
    card_id: &str,
    now: DateTime<Utc>,
) -> LedgerResult<UserRecord> {
    let row: Option<(i64, String)> = conn
        .query_row(
            "SELECT stock, history FROM users WHERE card_id = ?1",
            [card_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (stock, history_json) = match row {
        Some(r) => r,
        None => {
            return Err(LedgerError::UserNotFound {
                card_id: card_id.to_string(),
            });
        }
    };

    if stock <= 0 {
        return Err(LedgerError::Exhausted {
            card_id: card_id.to_string(),
        });
    }

    // Ring shift: newest first, oldest entry drops off past HISTORY_DEPTH.
    let mut history: Vec<String> = serde_json::from_str(&history_json)
        .map_err(|e| LedgerError::corrupt(format!("history for {card_id}: {e}")))?;
    history.insert(0, format_ts(now));
    history.truncate(HISTORY_DEPTH);
    let history_json = serde_json::to_string(&history)
        .map_err(|e| LedgerError::corrupt(format!("history for {card_id}: {e}")))?;

    // The stock > 0 guard keeps the decrement conditional: if a concurrent
    // usage consumed the last unit between read and write, zero rows match
    // and this caller loses the race instead of driving stock negative.
    let updated = conn.execute(
        "UPDATE users
         SET stock = stock - 1, total = total + 1, today = today + 1, history = ?2
         WHERE card_id = ?1 AND stock > 0",
        params![card_id, history_json],
    )?;
    if updated == 0 {
        return Err(LedgerError::Exhausted {
            card_id: card_id.to_string(),
        });
    }

    append_audit_inner(conn, &usage_audit_line(card_id), now)?;

    let row = conn.query_row(
        "SELECT card_id, allowed, stock, today, total, registered_at, history
         FROM users WHERE card_id = ?1",
        [card_id],
        user_row,
    )?;
    user_record(row)
}

fn heartbeat_inner(
    conn: &Connection,
    name: &str,
    password: &str,
    now: DateTime<Utc>,
) -> LedgerResult<HeartbeatAck> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT password FROM units WHERE name = ?1",
            [name],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        None => {
            conn.execute(
                "INSERT INTO units (name, password, stock, online, available, last_seen)
                 VALUES (?1, ?2, 0, 1, 1, ?3)",
                params![name, password, format_ts(now)],
            )?;
            append_audit_inner(conn, &format!("unit auto-registered: {name}"), now)?;
            Ok(HeartbeatAck {
                unit_name: name.to_string(),
                last_seen: now,
                was_new: true,
            })
        }
        Some(stored) if stored != password => Err(LedgerError::Unauthorized {
            name: name.to_string(),
        }),
        Some(_) => {
            conn.execute(
                "UPDATE units SET online = 1, last_seen = ?1 WHERE name = ?2",
                params![format_ts(now), name],
            )?;
            Ok(HeartbeatAck {
                unit_name: name.to_string(),
                last_seen: now,
                was_new: false,
            })
        }
    }
}

fn sweep_expired_inner(
    conn: &Connection,
    now: DateTime<Utc>,
    timeout: Duration,
) -> LedgerResult<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT name, last_seen FROM units WHERE online = 1")?;
    let online = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut expired = Vec::new();
    for (name, last_seen) in online {
        let Some(last_seen) = last_seen else { continue };
        let last_seen = match parse_ts(&last_seen) {
            Ok(ts) => ts,
            Err(e) => {
                // Skip rather than fail the whole sweep on one bad row
                warn!(unit = %name, error = %e, "unparseable last_seen, skipping");
                continue;
            }
        };
        if now - last_seen > timeout {
            conn.execute("UPDATE units SET online = 0 WHERE name = ?1", [&name])?;
            append_audit_inner(conn, &format!("unit heartbeat timeout: {name}"), now)?;
            expired.push(name);
        }
    }
    Ok(expired)
}

fn append_audit_inner(conn: &Connection, txt: &str, now: DateTime<Utc>) -> LedgerResult<i64> {
    conn.execute(
        "INSERT INTO audit_log (at, txt) VALUES (?1, ?2)",
        params![format_ts(now), txt],
    )?;
    Ok(conn.last_insert_rowid())
}

// =========================================================================
// Row mapping
// =========================================================================

fn user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        card_id: row.get(0)?,
        allowed: row.get(1)?,
        stock: row.get(2)?,
        today: row.get(3)?,
        total: row.get(4)?,
        registered_at: row.get(5)?,
        history: row.get(6)?,
    })
}

fn user_record(row: UserRow) -> LedgerResult<UserRecord> {
    let history: Vec<String> = serde_json::from_str(&row.history)
        .map_err(|e| LedgerError::corrupt(format!("history for {}: {e}", row.card_id)))?;
    Ok(UserRecord {
        registered_at: parse_ts(&row.registered_at)?,
        history: history
            .iter()
            .map(|s| parse_ts(s))
            .collect::<Result<Vec<_>, _>>()?,
        card_id: row.card_id,
        allowed: row.allowed != 0,
        stock: row.stock,
        today: row.today,
        total: row.total,
    })
}

fn unit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UnitRow> {
    Ok(UnitRow {
        name: row.get(0)?,
        password: row.get(1)?,
        stock: row.get(2)?,
        online: row.get(3)?,
        available: row.get(4)?,
        last_seen: row.get(5)?,
    })
}

fn unit_record(row: UnitRow) -> LedgerResult<UnitRecord> {
    Ok(UnitRecord {
        last_seen: row.last_seen.as_deref().map(parse_ts).transpose()?,
        name: row.name,
        stock: row.stock,
        online: row.online != 0,
        available: row.available != 0,
    })
}

fn audit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRow> {
    Ok(AuditRow {
        id: row.get(0)?,
        at: row.get(1)?,
        txt: row.get(2)?,
    })
}

fn audit_entry(row: AuditRow) -> LedgerResult<AuditEntry> {
    Ok(AuditEntry {
        id: row.id,
        at: parse_ts(&row.at)?,
        txt: row.txt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn store_with_user(card_id: &str) -> LedgerStore {
        let store = LedgerStore::memory().unwrap();
        store.register_user(card_id, t0()).unwrap();
        store
    }

    // === A) Schema bootstrap ===

    #[test]
    fn test_store_bootstraps_schema() {
        let store = LedgerStore::memory().unwrap();
        let conn = store.conn.lock().unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"units".to_string()));
        assert!(tables.contains(&"audit_log".to_string()));
    }

    #[test]
    fn test_open_is_reusable_on_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.sqlite3");
        {
            let store = LedgerStore::open(&path).unwrap();
            store.register_user("card-a", t0()).unwrap();
        }
        let store = LedgerStore::open(&path).unwrap();
        let user = store.get_user("card-a").unwrap().unwrap();
        assert_eq!(user.stock, 2);
    }

    // === B) Registration ===

    #[test]
    fn test_register_creates_user_with_defaults() {
        let store = LedgerStore::memory().unwrap();
        let user = store.register_user("card-a", t0()).unwrap();

        assert_eq!(user.card_id, "card-a");
        assert!(user.allowed);
        assert_eq!(user.stock, 2);
        assert_eq!(user.today, 0);
        assert_eq!(user.total, 0);
        assert!(user.history.is_empty());
        assert_eq!(store.count_audit().unwrap(), 1);
    }

    #[test]
    fn test_register_twice_is_rejected_with_one_row() {
        let store = store_with_user("card-a");

        let err = store.register_user("card-a", t0()).unwrap_err();
        assert_eq!(
            err,
            LedgerError::AlreadyRegistered {
                card_id: "card-a".to_string()
            }
        );
        assert_eq!(store.count_users().unwrap(), 1);
        // The failed attempt leaves no audit entry behind
        assert_eq!(store.count_audit().unwrap(), 1);
    }

    #[test]
    fn test_register_rejects_empty_card_id() {
        let store = LedgerStore::memory().unwrap();
        assert!(matches!(
            store.register_user("", t0()),
            Err(LedgerError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_concurrent_registration_creates_exactly_one_row() {
        let store = LedgerStore::memory().unwrap();
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    store.register_user("card-a", t0())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(created, 1);
        assert_eq!(store.count_users().unwrap(), 1);
    }

    // === C) Usage accounting ===

    #[test]
    fn test_record_usage_decrements_and_audits_once() {
        let store = store_with_user("card-a");
        store.set_user_stock("card-a", 3).unwrap();
        let audit_before = store.count_audit().unwrap();

        let user = store.record_usage("card-a", t0()).unwrap();

        assert_eq!(user.stock, 2);
        assert_eq!(user.today, 1);
        assert_eq!(user.total, 1);
        assert_eq!(user.history, vec![t0()]);
        assert_eq!(store.count_audit().unwrap(), audit_before + 1);
        let entry = &store.recent_audit(1).unwrap()[0];
        assert!(entry.txt.contains("card-a"));
    }

    #[test]
    fn test_record_usage_unknown_card_is_not_found() {
        let store = LedgerStore::memory().unwrap();
        assert_eq!(
            store.record_usage("nope", t0()).unwrap_err(),
            LedgerError::UserNotFound {
                card_id: "nope".to_string()
            }
        );
    }

    #[test]
    fn test_record_usage_at_zero_stock_is_exhausted() {
        let store = store_with_user("card-a");
        store.set_user_stock("card-a", 0).unwrap();
        let audit_before = store.count_audit().unwrap();

        let err = store.record_usage("card-a", t0()).unwrap_err();
        assert_eq!(
            err,
            LedgerError::Exhausted {
                card_id: "card-a".to_string()
            }
        );
        // Failed usage writes nothing, not even an audit entry
        assert_eq!(store.count_audit().unwrap(), audit_before);
    }

    #[test]
    fn test_stock_never_goes_negative() {
        let store = store_with_user("card-a");
        store.set_user_stock("card-a", 2).unwrap();

        let mut successes = 0;
        for i in 0..5 {
            let now = t0() + Duration::seconds(i);
            if store.record_usage("card-a", now).is_ok() {
                successes += 1;
            }
        }

        assert_eq!(successes, 2);
        assert_eq!(store.get_user("card-a").unwrap().unwrap().stock, 0);
    }

    #[test]
    fn test_concurrent_usage_with_one_stock_has_one_winner() {
        let store = store_with_user("card-a");
        store.set_user_stock("card-a", 1).unwrap();
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    store.record_usage("card-a", t0())
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        let exhausted = results
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::Exhausted { .. })))
            .count();

        assert_eq!(winners, 1);
        assert_eq!(exhausted, 1);
        assert_eq!(store.get_user("card-a").unwrap().unwrap().stock, 0);
    }

    #[test]
    fn test_history_ring_caps_at_depth_and_drops_oldest() {
        let store = store_with_user("card-a");
        store.set_user_stock("card-a", 11).unwrap();

        let first = t0();
        for i in 0..11 {
            let now = t0() + Duration::minutes(i);
            store.record_usage("card-a", now).unwrap();
        }

        let user = store.get_user("card-a").unwrap().unwrap();
        assert_eq!(user.history.len(), HISTORY_DEPTH);
        // Newest first, the very first usage fell off the ring
        assert_eq!(user.history[0], t0() + Duration::minutes(10));
        assert!(!user.history.contains(&first));
    }

    // === D) Heartbeats and liveness ===

    #[test]
    fn test_first_heartbeat_auto_registers_online() {
        let store = LedgerStore::memory().unwrap();

        let ack = store.heartbeat("raspi-01", "p", t0()).unwrap();
        assert!(ack.was_new);

        let unit = store.get_unit("raspi-01").unwrap().unwrap();
        assert!(unit.online);
        assert!(unit.available);
        assert_eq!(unit.stock, 0);
        assert_eq!(unit.last_seen, Some(t0()));
        assert_eq!(store.count_audit().unwrap(), 1);
    }

    #[test]
    fn test_heartbeat_wrong_password_rejected_without_state_change() {
        let store = LedgerStore::memory().unwrap();
        store.heartbeat("raspi-01", "p", t0()).unwrap();

        let later = t0() + Duration::seconds(30);
        let err = store.heartbeat("raspi-01", "wrong", later).unwrap_err();
        assert_eq!(
            err,
            LedgerError::Unauthorized {
                name: "raspi-01".to_string()
            }
        );

        let unit = store.get_unit("raspi-01").unwrap().unwrap();
        assert_eq!(unit.last_seen, Some(t0()));
    }

    #[test]
    fn test_heartbeat_matching_password_refreshes_last_seen() {
        let store = LedgerStore::memory().unwrap();
        store.heartbeat("raspi-01", "p", t0()).unwrap();

        let later = t0() + Duration::seconds(30);
        let ack = store.heartbeat("raspi-01", "p", later).unwrap();
        assert!(!ack.was_new);
        assert_eq!(
            store.get_unit("raspi-01").unwrap().unwrap().last_seen,
            Some(later)
        );
    }

    #[test]
    fn test_heartbeat_requires_name_and_password() {
        let store = LedgerStore::memory().unwrap();
        assert!(matches!(
            store.heartbeat("", "p", t0()),
            Err(LedgerError::InvalidInput { .. })
        ));
        assert!(matches!(
            store.heartbeat("raspi-01", "", t0()),
            Err(LedgerError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_sweep_expires_stale_units_only() {
        let store = LedgerStore::memory().unwrap();
        store.heartbeat("stale", "p", t0()).unwrap();
        store.heartbeat("fresh", "p", t0()).unwrap();

        let now = t0() + Duration::seconds(70);
        store.set_unit_last_seen("fresh", now - Duration::seconds(10)).unwrap();

        let expired = store.sweep_expired(now, Duration::seconds(65)).unwrap();
        assert_eq!(expired, vec!["stale".to_string()]);

        assert!(!store.get_unit("stale").unwrap().unwrap().online);
        assert!(store.get_unit("fresh").unwrap().unwrap().online);

        // Audit entry names the expired unit
        let entry = &store.recent_audit(1).unwrap()[0];
        assert!(entry.txt.contains("stale"));
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let store = LedgerStore::memory().unwrap();
        store.heartbeat("stale", "p", t0()).unwrap();

        let now = t0() + Duration::seconds(120);
        let timeout = Duration::seconds(65);
        assert_eq!(store.sweep_expired(now, timeout).unwrap().len(), 1);
        assert_eq!(store.sweep_expired(now, timeout).unwrap().len(), 0);
    }

    // === E) Audit log ===

    #[test]
    fn test_audit_is_append_only_and_ordered() {
        let store = LedgerStore::memory().unwrap();
        store.append_audit("one", t0()).unwrap();
        store.append_audit("two", t0() + Duration::seconds(1)).unwrap();

        let recent = store.recent_audit(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].txt, "two");
        assert_eq!(recent[1].txt, "one");
        assert!(recent[0].id > recent[1].id);
    }

    #[test]
    fn test_unit_audit_filters_by_tag() {
        let store = LedgerStore::memory().unwrap();
        store.append_audit("[raspi-01] dispense complete", t0()).unwrap();
        store.append_audit("[raspi-02] dispense complete", t0()).unwrap();
        store.append_audit("card registered (card-a)", t0()).unwrap();

        let logs = store.unit_audit("raspi-01", 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].txt.starts_with("[raspi-01]"));
    }
}
