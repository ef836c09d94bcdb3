pub mod directory;
pub mod error;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use directory::{AccountDirectory, InMemoryAccountDirectory, SqliteAccountDirectory};
pub use error::AccountLookupError;

/// Membership view of an account owned by the billing subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub membership_expires_at: Option<DateTime<Utc>>,
}

impl Account {
    pub fn free(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            membership_expires_at: None,
        }
    }

    pub fn member_until(account_id: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            account_id: account_id.into(),
            membership_expires_at: Some(expires_at),
        }
    }
}
