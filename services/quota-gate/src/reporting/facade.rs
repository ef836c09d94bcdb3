use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, UsageCalendar};
use crate::storage::{StorageError, UsageLedger};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySummary {
    pub usage_date: NaiveDate,
    pub total_units: u64,
    pub active_accounts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    pub usage_date: NaiveDate,
    pub units_consumed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUsage {
    pub account_id: String,
    pub total_units: u64,
    pub today_units: u64,
    pub days: Vec<DailyUsage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerRank {
    pub rank: usize,
    pub account_id: String,
    pub total_units: u64,
    pub active_days: u64,
}

/// Dashboard aggregates over the usage ledger. Read-only: it never creates
/// or mutates ledger rows.
pub struct UsageReporter {
    ledger: Arc<dyn UsageLedger>,
    clock: Arc<dyn Clock>,
    calendar: UsageCalendar,
}

impl UsageReporter {
    pub fn new(ledger: Arc<dyn UsageLedger>, clock: Arc<dyn Clock>, calendar: UsageCalendar) -> Self {
        Self {
            ledger,
            clock,
            calendar,
        }
    }

    pub fn today(&self) -> Result<DaySummary, StorageError> {
        self.day(self.calendar.usage_date(self.clock.now()))
    }

    pub fn day(&self, usage_date: NaiveDate) -> Result<DaySummary, StorageError> {
        let entries = self.ledger.day_entries(usage_date)?;
        let total_units = entries.iter().map(|entry| entry.units_consumed).sum();
        let active_accounts = entries
            .iter()
            .filter(|entry| entry.units_consumed > 0)
            .count();

        Ok(DaySummary {
            usage_date,
            total_units,
            active_accounts,
        })
    }

    pub fn account(&self, account_id: &str) -> Result<AccountUsage, StorageError> {
        let today = self.calendar.usage_date(self.clock.now());
        let history = self.ledger.account_history(account_id)?;

        let total_units = history.iter().map(|entry| entry.units_consumed).sum();
        let today_units = history
            .iter()
            .find(|entry| entry.usage_date == today)
            .map(|entry| entry.units_consumed)
            .unwrap_or(0);
        let days = history
            .into_iter()
            .map(|entry| DailyUsage {
                usage_date: entry.usage_date,
                units_consumed: entry.units_consumed,
            })
            .collect();

        Ok(AccountUsage {
            account_id: account_id.to_string(),
            total_units,
            today_units,
            days,
        })
    }

    /// Ranking by cumulative usage. `days` limits the window to the last N
    /// calendar days including today; `None`, or a window reaching past the
    /// earliest representable date, ranks over all history.
    pub fn top_consumers(
        &self,
        limit: usize,
        days: Option<u32>,
    ) -> Result<Vec<ConsumerRank>, StorageError> {
        let since = days.and_then(|days| {
            let today = self.calendar.usage_date(self.clock.now());
            Duration::try_days(i64::from(days.saturating_sub(1)))
                .and_then(|span| today.checked_sub_signed(span))
        });

        let ranked = self
            .ledger
            .top_consumers(since, limit)?
            .into_iter()
            .enumerate()
            .map(|(index, total)| ConsumerRank {
                rank: index + 1,
                account_id: total.account_id,
                total_units: total.units_consumed,
                active_days: total.active_days,
            })
            .collect();

        Ok(ranked)
    }
}
