use thiserror::Error;

use crate::storage::StorageError;

/// Reasons an admission can fail. None of these leave the gate; they are
/// folded into a [`QuotaDecision`](super::QuotaDecision) and logged.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("daily quota reached for account {account_id}: {used}/{ceiling}")]
    QuotaExceeded {
        account_id: String,
        used: u64,
        ceiling: u32,
    },
    #[error("usage ledger unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),
    #[error("invalid account state for {account_id}: {reason}")]
    InvalidAccountState { account_id: String, reason: String },
}
