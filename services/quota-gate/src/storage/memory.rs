use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use uuid::Uuid;

use super::error::StorageError;
use super::ledger::{
    ConsumerTotal, ReservationRecord, ReserveOutcome, UsageLedger, UsageLedgerEntry,
};

type LedgerKey = (String, NaiveDate);

/// Process-local ledger. The dashmap shard lock held by `entry()` makes the
/// compare-and-increment in `try_reserve` indivisible.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: DashMap<LedgerKey, u64>,
    reservations: DashMap<Uuid, ReservationRecord>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(account_id: &str, usage_date: NaiveDate) -> LedgerKey {
        (account_id.to_string(), usage_date)
    }
}

impl UsageLedger for MemoryLedger {
    fn read_or_initialize(
        &self,
        account_id: &str,
        usage_date: NaiveDate,
    ) -> Result<u64, StorageError> {
        let entry = self
            .entries
            .entry(Self::key(account_id, usage_date))
            .or_insert(0);
        Ok(*entry)
    }

    fn try_reserve(
        &self,
        account_id: &str,
        usage_date: NaiveDate,
        ceiling: u32,
    ) -> Result<ReserveOutcome, StorageError> {
        let mut units = self
            .entries
            .entry(Self::key(account_id, usage_date))
            .or_insert(0);

        if *units < u64::from(ceiling) {
            let units_before = *units;
            *units += 1;
            Ok(ReserveOutcome::Reserved { units_before })
        } else {
            Ok(ReserveOutcome::CeilingReached {
                units_consumed: *units,
            })
        }
    }

    fn release(&self, account_id: &str, usage_date: NaiveDate) -> Result<bool, StorageError> {
        match self.entries.get_mut(&Self::key(account_id, usage_date)) {
            Some(mut units) if *units > 0 => {
                *units -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn record_reservation(&self, record: &ReservationRecord) -> Result<(), StorageError> {
        self.reservations.insert(record.reservation_id, record.clone());
        Ok(())
    }

    fn settle_reservation(
        &self,
        reservation_id: &Uuid,
    ) -> Result<Option<ReservationRecord>, StorageError> {
        Ok(self
            .reservations
            .remove(reservation_id)
            .map(|(_, record)| record))
    }

    fn release_reservation(
        &self,
        reservation_id: &Uuid,
    ) -> Result<Option<ReservationRecord>, StorageError> {
        // Only the caller that removes the handle decrements.
        let Some((_, record)) = self.reservations.remove(reservation_id) else {
            return Ok(None);
        };
        self.release(&record.account_id, record.usage_date)?;
        Ok(Some(record))
    }

    fn purge_reservations(&self, admitted_before: DateTime<Utc>) -> Result<usize, StorageError> {
        let mut purged = 0usize;
        self.reservations.retain(|_, record| {
            let keep = record.admitted_at >= admitted_before;
            if !keep {
                purged += 1;
            }
            keep
        });
        Ok(purged)
    }

    fn pending_reservations(&self) -> Result<usize, StorageError> {
        Ok(self.reservations.len())
    }

    fn day_entries(&self, usage_date: NaiveDate) -> Result<Vec<UsageLedgerEntry>, StorageError> {
        let mut entries: Vec<UsageLedgerEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.key().1 == usage_date)
            .map(|entry| UsageLedgerEntry {
                account_id: entry.key().0.clone(),
                usage_date,
                units_consumed: *entry.value(),
            })
            .collect();
        entries.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        Ok(entries)
    }

    fn account_history(&self, account_id: &str) -> Result<Vec<UsageLedgerEntry>, StorageError> {
        let mut entries: Vec<UsageLedgerEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.key().0 == account_id)
            .map(|entry| UsageLedgerEntry {
                account_id: account_id.to_string(),
                usage_date: entry.key().1,
                units_consumed: *entry.value(),
            })
            .collect();
        entries.sort_by(|a, b| b.usage_date.cmp(&a.usage_date));
        Ok(entries)
    }

    fn top_consumers(
        &self,
        since: Option<NaiveDate>,
        limit: usize,
    ) -> Result<Vec<ConsumerTotal>, StorageError> {
        let mut totals: HashMap<String, ConsumerTotal> = HashMap::new();

        for entry in self.entries.iter() {
            let (account_id, usage_date) = entry.key();
            if since.is_some_and(|since| *usage_date < since) {
                continue;
            }
            let units = *entry.value();
            let total = totals
                .entry(account_id.clone())
                .or_insert_with(|| ConsumerTotal {
                    account_id: account_id.clone(),
                    units_consumed: 0,
                    active_days: 0,
                });
            total.units_consumed += units;
            if units > 0 {
                total.active_days += 1;
            }
        }

        let mut ranked: Vec<ConsumerTotal> = totals
            .into_values()
            .filter(|total| total.units_consumed > 0)
            .collect();
        ranked.sort_by(|a, b| {
            b.units_consumed
                .cmp(&a.units_consumed)
                .then_with(|| a.account_id.cmp(&b.account_id))
        });
        ranked.truncate(limit);
        Ok(ranked)
    }
}
