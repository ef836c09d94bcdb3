pub mod database;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod schema;

pub use database::SqliteLedger;
pub use error::StorageError;
pub use ledger::{ConsumerTotal, ReservationRecord, ReserveOutcome, UsageLedger, UsageLedgerEntry};
pub use memory::MemoryLedger;

pub const LEDGER_DB_FILENAME: &str = "usage_ledger.db";
