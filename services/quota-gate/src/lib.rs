pub mod accounts;
pub mod api;
pub mod clock;
pub mod config;
pub mod gate;
pub mod policy;
pub mod reporting;
pub mod storage;

pub use accounts::{Account, AccountDirectory, InMemoryAccountDirectory, SqliteAccountDirectory};
pub use api::{create_router, ApiState};
pub use clock::{Clock, ManualClock, SystemClock, UsageCalendar};
pub use config::{GateConfig, LedgerBackend};
pub use gate::{AdmissionError, AdmissionGate, QuotaDecision, QuotaStatus, Reservation};
pub use policy::{OperationClass, ResolvedTier, TierCeilings, TierPolicy, TierPolicyResolver};
pub use reporting::UsageReporter;
pub use storage::{MemoryLedger, ReserveOutcome, SqliteLedger, StorageError, UsageLedger};
