use rusqlite::Connection;

/// One row per `(account_id, usage_date)`; the primary key is what makes the
/// conditional increment well defined.
pub const USAGE_LEDGER_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS usage_ledger (
    account_id TEXT NOT NULL,
    usage_date TEXT NOT NULL,
    units_consumed INTEGER NOT NULL DEFAULT 0 CHECK (units_consumed >= 0),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (account_id, usage_date)
);
"#;

/// Unsettled reservations. `admitted_at` is unix milliseconds.
pub const USAGE_RESERVATIONS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS usage_reservations (
    reservation_id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL,
    usage_date TEXT NOT NULL,
    admitted_at INTEGER NOT NULL
);
"#;

pub const USAGE_LEDGER_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_usage_ledger_date ON usage_ledger(usage_date);
CREATE INDEX IF NOT EXISTS idx_usage_reservations_admitted ON usage_reservations(admitted_at);
"#;

pub fn init_database(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(USAGE_LEDGER_TABLE_SCHEMA)?;
    conn.execute_batch(USAGE_RESERVATIONS_TABLE_SCHEMA)?;
    conn.execute_batch(USAGE_LEDGER_INDEXES)?;
    Ok(())
}
