//! SQLite schema for the ledger store.
//!
//! Tables:
//! - `users`: card tokens and their accounting state
//! - `units`: dispensing units and their liveness state
//! - `audit_log`: append-only, immutable audit trail

use std::collections::HashSet;

use rusqlite::Connection;

use crate::error::LedgerResult;

/// DDL for the ledger tables.
///
/// Schema version: 2 (v1 lacked `units.last_seen`).
pub const LEDGER_SCHEMA: &str = r#"
-- Card tokens (one row per registered card)
CREATE TABLE IF NOT EXISTS users (
    card_id       TEXT PRIMARY KEY,
    allowed       INTEGER NOT NULL DEFAULT 1,
    stock         INTEGER NOT NULL DEFAULT 2,
    today         INTEGER NOT NULL DEFAULT 0,
    total         INTEGER NOT NULL DEFAULT 0,
    registered_at TEXT NOT NULL,
    history       TEXT NOT NULL DEFAULT '[]'
);

-- Dispensing units (auto-registered on first heartbeat)
CREATE TABLE IF NOT EXISTS units (
    name      TEXT PRIMARY KEY,
    password  TEXT NOT NULL,
    stock     INTEGER NOT NULL DEFAULT 0,
    online    INTEGER NOT NULL DEFAULT 0,
    available INTEGER NOT NULL DEFAULT 1,
    last_seen TEXT
);

-- Audit trail (append-only, immutable; insertion order = chronological order)
CREATE TABLE IF NOT EXISTS audit_log (
    id  INTEGER PRIMARY KEY AUTOINCREMENT,
    at  TEXT NOT NULL,
    txt TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_units_online ON units(online);
"#;

/// Apply additive migrations for databases created before the current
/// schema version.
pub(crate) fn migrate(conn: &Connection) -> LedgerResult<()> {
    let cols = get_columns(conn, "units")?;
    add_column_if_missing(conn, &cols, "units", "last_seen", "TEXT")?;
    Ok(())
}

pub(crate) fn get_columns(conn: &Connection, table: &str) -> LedgerResult<HashSet<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut out = HashSet::new();
    for r in rows {
        out.insert(r?);
    }
    Ok(out)
}

pub(crate) fn add_column_if_missing(
    conn: &Connection,
    cols: &HashSet<String>,
    table: &str,
    col: &str,
    ty: &str,
) -> LedgerResult<()> {
    if !cols.contains(col) {
        let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, col, ty);
        conn.execute(&sql, [])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_is_valid_sql() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(LEDGER_SCHEMA).unwrap();
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(LEDGER_SCHEMA).unwrap();
        conn.execute_batch(LEDGER_SCHEMA).unwrap();
    }

    #[test]
    fn test_migrate_adds_last_seen_to_v1_units() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE units (
                name TEXT PRIMARY KEY,
                password TEXT NOT NULL,
                stock INTEGER NOT NULL DEFAULT 0,
                online INTEGER NOT NULL DEFAULT 0,
                available INTEGER NOT NULL DEFAULT 1
            )",
        )
        .unwrap();

        migrate(&conn).unwrap();
        assert!(get_columns(&conn, "units").unwrap().contains("last_seen"));

        // Second run is a no-op
        migrate(&conn).unwrap();
    }
}
