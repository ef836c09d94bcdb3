use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use dashmap::DashMap;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::info;

use super::error::AccountLookupError;
use super::Account;

/// Read-only access to account membership state.
pub trait AccountDirectory: Send + Sync {
    fn lookup(&self, account_id: &str) -> Result<Option<Account>, AccountLookupError>;
}

#[derive(Debug, Default)]
pub struct InMemoryAccountDirectory {
    accounts: DashMap<String, Account>,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, account: Account) {
        self.accounts.insert(account.account_id.clone(), account);
    }

    pub fn remove(&self, account_id: &str) -> Option<Account> {
        self.accounts.remove(account_id).map(|(_, account)| account)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl AccountDirectory for InMemoryAccountDirectory {
    fn lookup(&self, account_id: &str) -> Result<Option<Account>, AccountLookupError> {
        Ok(self.accounts.get(account_id).map(|entry| entry.clone()))
    }
}

/// Reads the billing database's `accounts` table. The connection is opened
/// read-only; this service never writes account state.
pub struct SqliteAccountDirectory {
    db_path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteAccountDirectory {
    pub fn open(db_path: &Path) -> Result<Self, AccountLookupError> {
        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;
        info!(path = %db_path.display(), "opened account directory");

        Ok(Self {
            db_path: db_path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }
}

impl AccountDirectory for SqliteAccountDirectory {
    fn lookup(&self, account_id: &str) -> Result<Option<Account>, AccountLookupError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AccountLookupError::Unavailable("connection poisoned".into()))?;

        let mut stmt = conn.prepare_cached(
            r#"
            SELECT membership_expires_at
            FROM accounts
            WHERE account_id = ?1
            "#,
        )?;

        let row = stmt
            .query_row(params![account_id], |row| row.get::<_, Option<String>>(0))
            .optional()?;

        let Some(raw_expiry) = row else {
            return Ok(None);
        };

        let membership_expires_at = match raw_expiry {
            Some(value) => Some(parse_expiry(account_id, &value)?),
            None => None,
        };

        Ok(Some(Account {
            account_id: account_id.to_string(),
            membership_expires_at,
        }))
    }
}

/// Accepts RFC 3339 as well as SQLite's `CURRENT_TIMESTAMP` layout (UTC).
fn parse_expiry(account_id: &str, value: &str) -> Result<DateTime<Utc>, AccountLookupError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    Err(AccountLookupError::MalformedExpiry {
        account_id: account_id.to_string(),
        value: value.to_string(),
    })
}
