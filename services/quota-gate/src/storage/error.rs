use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt ledger row: {0}")]
    CorruptRow(String),
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
}
