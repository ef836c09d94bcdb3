use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccountLookupError {
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),
    #[error("malformed membership expiry for account {account_id}: {value}")]
    MalformedExpiry { account_id: String, value: String },
    #[error("account directory unavailable: {0}")]
    Unavailable(String),
}
