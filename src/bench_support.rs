use std::sync::Arc;

use chrono::{TimeZone, Utc};
use quota_gate::{
    AdmissionGate, InMemoryAccountDirectory, ManualClock, MemoryLedger, SqliteLedger, UsageLedger,
};
use tempfile::TempDir;

pub use quota_gate;

pub struct GateBenchFixture {
    pub gate: Arc<AdmissionGate>,
    pub ledger: Arc<dyn UsageLedger>,
    pub clock: Arc<ManualClock>,
    pub temp_dir: Option<TempDir>,
}

impl GateBenchFixture {
    pub fn memory() -> Self {
        Self::with_ledger(Arc::new(MemoryLedger::new()), None)
    }

    pub fn sqlite() -> Self {
        let temp_dir = TempDir::new().expect("tempdir");
        let ledger = SqliteLedger::open(temp_dir.path()).expect("open sqlite ledger");
        Self::with_ledger(Arc::new(ledger), Some(temp_dir))
    }

    fn with_ledger(ledger: Arc<dyn UsageLedger>, temp_dir: Option<TempDir>) -> Self {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0)
                .single()
                .expect("valid fixture timestamp"),
        ));
        let gate = AdmissionGate::new(
            Arc::clone(&ledger),
            Arc::new(InMemoryAccountDirectory::new()),
            clock.clone(),
        );

        Self {
            gate: Arc::new(gate),
            ledger,
            clock,
            temp_dir,
        }
    }
}

pub fn bench_account_id(index: usize) -> String {
    format!("bench-account-{index:06}")
}
