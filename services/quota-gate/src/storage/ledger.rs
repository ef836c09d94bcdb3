use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::StorageError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLedgerEntry {
    pub account_id: String,
    pub usage_date: NaiveDate,
    pub units_consumed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved { units_before: u64 },
    CeilingReached { units_consumed: u64 },
}

impl ReserveOutcome {
    pub fn is_reserved(&self) -> bool {
        matches!(self, ReserveOutcome::Reserved { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerTotal {
    pub account_id: String,
    pub units_consumed: u64,
    pub active_days: u64,
}

/// An admitted unit whose request has not been settled yet. Kept in the
/// shared store so any instance can release it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub reservation_id: Uuid,
    pub account_id: String,
    pub usage_date: NaiveDate,
    pub admitted_at: DateTime<Utc>,
}

/// Per-account, per-day usage counter. Implementations must make
/// `try_reserve` indivisible with respect to concurrent callers on the same
/// key; every other method may use ordinary read-committed semantics.
pub trait UsageLedger: Send + Sync {
    /// Returns the counter for the key, creating a zero row when absent.
    fn read_or_initialize(&self, account_id: &str, usage_date: NaiveDate)
        -> Result<u64, StorageError>;

    /// Increments by one iff the current value is below `ceiling`.
    fn try_reserve(
        &self,
        account_id: &str,
        usage_date: NaiveDate,
        ceiling: u32,
    ) -> Result<ReserveOutcome, StorageError>;

    /// Decrements by one, never below zero. Returns whether a unit was returned.
    fn release(&self, account_id: &str, usage_date: NaiveDate) -> Result<bool, StorageError>;

    /// Stores the handle of a unit that `try_reserve` just counted.
    fn record_reservation(&self, record: &ReservationRecord) -> Result<(), StorageError>;

    /// Forgets the handle and leaves the counter untouched. Returns the record
    /// if it was still pending.
    fn settle_reservation(
        &self,
        reservation_id: &Uuid,
    ) -> Result<Option<ReservationRecord>, StorageError>;

    /// Forgets the handle and decrements its day's counter as one step. Only
    /// the first call for a given id returns the record.
    fn release_reservation(
        &self,
        reservation_id: &Uuid,
    ) -> Result<Option<ReservationRecord>, StorageError>;

    /// Drops handles admitted strictly before `admitted_before`. Counters are
    /// not touched: an unreleased unit stays consumed.
    fn purge_reservations(&self, admitted_before: DateTime<Utc>) -> Result<usize, StorageError>;

    fn pending_reservations(&self) -> Result<usize, StorageError>;

    fn day_entries(&self, usage_date: NaiveDate) -> Result<Vec<UsageLedgerEntry>, StorageError>;

    /// Newest day first.
    fn account_history(&self, account_id: &str) -> Result<Vec<UsageLedgerEntry>, StorageError>;

    /// Accounts ordered by cumulative usage since `since` (inclusive), largest first.
    fn top_consumers(
        &self,
        since: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<ConsumerTotal>, StorageError>;
}
