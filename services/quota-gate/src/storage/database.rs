use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use super::error::StorageError;
use super::ledger::{
    ConsumerTotal, ReservationRecord, ReserveOutcome, UsageLedger, UsageLedgerEntry,
};
use super::schema::init_database;
use super::LEDGER_DB_FILENAME;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed ledger. Several processes may open the same file; the
/// conditional increment is a single `UPDATE` so SQLite's write lock is the
/// only serialization point between them.
pub struct SqliteLedger {
    db_path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(LEDGER_DB_FILENAME);
        let conn = Connection::open(&db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        init_database(&conn)?;

        info!(path = %db_path.display(), "opened usage ledger");

        Ok(Self {
            db_path,
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("connection poisoned".into()))
    }
}

impl UsageLedger for SqliteLedger {
    fn read_or_initialize(
        &self,
        account_id: &str,
        usage_date: NaiveDate,
    ) -> Result<u64, StorageError> {
        let conn = self.connection()?;
        ensure_row(&conn, account_id, usage_date)?;
        current_units(&conn, account_id, usage_date)
    }

    fn try_reserve(
        &self,
        account_id: &str,
        usage_date: NaiveDate,
        ceiling: u32,
    ) -> Result<ReserveOutcome, StorageError> {
        let conn = self.connection()?;
        ensure_row(&conn, account_id, usage_date)?;

        let now = Utc::now().to_rfc3339();
        let after: Option<i64> = conn
            .query_row(
                r#"
                UPDATE usage_ledger
                SET units_consumed = units_consumed + 1,
                    updated_at = ?4
                WHERE account_id = ?1 AND usage_date = ?2 AND units_consumed < ?3
                RETURNING units_consumed
                "#,
                params![account_id, usage_date, i64::from(ceiling), now],
                |row| row.get(0),
            )
            .optional()?;

        match after {
            Some(after) => {
                let units_before = to_units(after - 1)?;
                debug!(account_id, %usage_date, units_before, ceiling, "reserved usage unit");
                Ok(ReserveOutcome::Reserved { units_before })
            }
            None => {
                let units_consumed = current_units(&conn, account_id, usage_date)?;
                Ok(ReserveOutcome::CeilingReached { units_consumed })
            }
        }
    }

    fn release(&self, account_id: &str, usage_date: NaiveDate) -> Result<bool, StorageError> {
        let conn = self.connection()?;
        decrement(&conn, account_id, usage_date)
    }

    fn record_reservation(&self, record: &ReservationRecord) -> Result<(), StorageError> {
        let conn = self.connection()?;
        conn.execute(
            r#"
            INSERT INTO usage_reservations (reservation_id, account_id, usage_date, admitted_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                record.reservation_id.to_string(),
                record.account_id,
                record.usage_date,
                record.admitted_at.timestamp_millis()
            ],
        )?;
        Ok(())
    }

    fn settle_reservation(
        &self,
        reservation_id: &Uuid,
    ) -> Result<Option<ReservationRecord>, StorageError> {
        let conn = self.connection()?;
        take_reservation(&conn, reservation_id)
    }

    fn release_reservation(
        &self,
        reservation_id: &Uuid,
    ) -> Result<Option<ReservationRecord>, StorageError> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let record = take_reservation(&tx, reservation_id)?;
        if let Some(record) = &record {
            decrement(&tx, &record.account_id, record.usage_date)?;
        }

        tx.commit()?;
        Ok(record)
    }

    fn purge_reservations(&self, admitted_before: DateTime<Utc>) -> Result<usize, StorageError> {
        let conn = self.connection()?;
        let purged = conn.execute(
            "DELETE FROM usage_reservations WHERE admitted_at < ?1",
            params![admitted_before.timestamp_millis()],
        )?;
        Ok(purged)
    }

    fn pending_reservations(&self) -> Result<usize, StorageError> {
        let conn = self.connection()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM usage_reservations", [], |row| row.get(0))?;
        usize::try_from(count)
            .map_err(|_| StorageError::CorruptRow(format!("negative reservation count {count}")))
    }

    fn day_entries(&self, usage_date: NaiveDate) -> Result<Vec<UsageLedgerEntry>, StorageError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT account_id, usage_date, units_consumed
            FROM usage_ledger
            WHERE usage_date = ?1
            ORDER BY account_id
            "#,
        )?;

        let rows = stmt.query_map(params![usage_date], read_entry)?;
        collect_entries(rows)
    }

    fn account_history(&self, account_id: &str) -> Result<Vec<UsageLedgerEntry>, StorageError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT account_id, usage_date, units_consumed
            FROM usage_ledger
            WHERE account_id = ?1
            ORDER BY usage_date DESC
            "#,
        )?;

        let rows = stmt.query_map(params![account_id], read_entry)?;
        collect_entries(rows)
    }

    fn top_consumers(
        &self,
        since: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<ConsumerTotal>, StorageError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT account_id,
                   SUM(units_consumed) AS total,
                   SUM(CASE WHEN units_consumed > 0 THEN 1 ELSE 0 END) AS active_days
            FROM usage_ledger
            WHERE ?1 IS NULL OR usage_date >= ?1
            GROUP BY account_id
            HAVING total > 0
            ORDER BY total DESC, account_id ASC
            LIMIT ?2
            "#,
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![since, limit], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut totals = Vec::new();
        for row in rows {
            let (account_id, total, active_days) = row?;
            totals.push(ConsumerTotal {
                account_id,
                units_consumed: to_units(total)?,
                active_days: to_units(active_days)?,
            });
        }
        Ok(totals)
    }
}

fn ensure_row(
    conn: &Connection,
    account_id: &str,
    usage_date: NaiveDate,
) -> Result<(), StorageError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        r#"
        INSERT INTO usage_ledger (account_id, usage_date, units_consumed, created_at, updated_at)
        VALUES (?1, ?2, 0, ?3, ?3)
        ON CONFLICT(account_id, usage_date) DO NOTHING
        "#,
        params![account_id, usage_date, now],
    )?;
    Ok(())
}

fn decrement(
    conn: &Connection,
    account_id: &str,
    usage_date: NaiveDate,
) -> Result<bool, StorageError> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        r#"
        UPDATE usage_ledger
        SET units_consumed = units_consumed - 1,
            updated_at = ?3
        WHERE account_id = ?1 AND usage_date = ?2 AND units_consumed > 0
        "#,
        params![account_id, usage_date, now],
    )?;

    Ok(changed > 0)
}

fn take_reservation(
    conn: &Connection,
    reservation_id: &Uuid,
) -> Result<Option<ReservationRecord>, StorageError> {
    let row = conn
        .query_row(
            r#"
            DELETE FROM usage_reservations
            WHERE reservation_id = ?1
            RETURNING account_id, usage_date, admitted_at
            "#,
            params![reservation_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, NaiveDate>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()?;

    let Some((account_id, usage_date, admitted_at)) = row else {
        return Ok(None);
    };
    let admitted_at = DateTime::<Utc>::from_timestamp_millis(admitted_at).ok_or_else(|| {
        StorageError::CorruptRow(format!("reservation admitted_at {admitted_at} out of range"))
    })?;

    Ok(Some(ReservationRecord {
        reservation_id: *reservation_id,
        account_id,
        usage_date,
        admitted_at,
    }))
}

fn current_units(
    conn: &Connection,
    account_id: &str,
    usage_date: NaiveDate,
) -> Result<u64, StorageError> {
    let units = conn
        .query_row(
            r#"
            SELECT units_consumed
            FROM usage_ledger
            WHERE account_id = ?1 AND usage_date = ?2
            "#,
            params![account_id, usage_date],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    to_units(units.unwrap_or(0))
}

type RawEntry = (String, NaiveDate, i64);

fn read_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn collect_entries(
    rows: impl Iterator<Item = rusqlite::Result<RawEntry>>,
) -> Result<Vec<UsageLedgerEntry>, StorageError> {
    let mut entries = Vec::new();
    for row in rows {
        let (account_id, usage_date, units) = row?;
        entries.push(UsageLedgerEntry {
            account_id,
            usage_date,
            units_consumed: to_units(units)?,
        });
    }
    Ok(entries)
}

fn to_units(value: i64) -> Result<u64, StorageError> {
    u64::try_from(value).map_err(|_| StorageError::CorruptRow(format!("negative counter {value}")))
}
