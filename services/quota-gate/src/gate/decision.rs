use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policy::ResolvedTier;

/// Handle for one admitted unit. Settle it exactly once with `commit` or
/// `release`; it records the day the unit was billed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: Uuid,
    pub account_id: String,
    pub usage_date: NaiveDate,
}

impl Reservation {
    pub fn new(account_id: &str, usage_date: NaiveDate) -> Self {
        Self {
            reservation_id: Uuid::new_v4(),
            account_id: account_id.to_string(),
            usage_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaDecision {
    pub admitted: bool,
    pub units_used_before_this_request: u64,
    pub ceiling_for_today: u32,
    pub is_privileged_tier: bool,
    pub usage_date: NaiveDate,
    pub reservation: Option<Reservation>,
}

impl QuotaDecision {
    pub(crate) fn admitted(
        tier: ResolvedTier,
        units_before: u64,
        reservation: Reservation,
    ) -> Self {
        Self {
            admitted: true,
            units_used_before_this_request: units_before,
            ceiling_for_today: tier.ceiling,
            is_privileged_tier: tier.is_privileged_tier,
            usage_date: reservation.usage_date,
            reservation: Some(reservation),
        }
    }

    /// A rejection always reports the account as fully used.
    pub(crate) fn rejected(tier: ResolvedTier, usage_date: NaiveDate) -> Self {
        Self {
            admitted: false,
            units_used_before_this_request: u64::from(tier.ceiling),
            ceiling_for_today: tier.ceiling,
            is_privileged_tier: tier.is_privileged_tier,
            usage_date,
            reservation: None,
        }
    }

    /// Units left after this request, for "X/Y used today" style messaging.
    pub fn remaining(&self) -> u64 {
        let consumed = self.units_used_before_this_request + u64::from(self.admitted);
        u64::from(self.ceiling_for_today).saturating_sub(consumed)
    }
}

/// Read-only snapshot of an account's allotment for today.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub account_id: String,
    pub usage_date: NaiveDate,
    pub units_consumed: u64,
    pub ceiling_for_today: u32,
    pub is_privileged_tier: bool,
    pub remaining: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(ceiling: u32) -> ResolvedTier {
        ResolvedTier {
            ceiling,
            is_privileged_tier: false,
        }
    }

    #[test]
    fn remaining_counts_the_current_request() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let decision = QuotaDecision::admitted(tier(3), 1, Reservation::new("acct", date));
        assert_eq!(decision.remaining(), 1);

        let last = QuotaDecision::admitted(tier(3), 2, Reservation::new("acct", date));
        assert_eq!(last.remaining(), 0);
    }

    #[test]
    fn rejection_reports_full_usage() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        let decision = QuotaDecision::rejected(tier(3), date);
        assert!(!decision.admitted);
        assert_eq!(decision.units_used_before_this_request, 3);
        assert_eq!(decision.ceiling_for_today, 3);
        assert_eq!(decision.remaining(), 0);
        assert!(decision.reservation.is_none());
    }
}
