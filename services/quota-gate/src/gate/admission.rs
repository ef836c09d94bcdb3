use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::accounts::{Account, AccountDirectory};
use crate::clock::{Clock, UsageCalendar};
use crate::policy::{OperationClass, ResolvedTier, TierPolicy, TierPolicyResolver};
use crate::storage::{ReservationRecord, ReserveOutcome, StorageError, UsageLedger};

use super::decision::{QuotaDecision, QuotaStatus, Reservation};
use super::error::AdmissionError;
use super::DEFAULT_RESERVATION_TTL_SECS;

/// Reserve-before-work admission control shared by every generation endpoint.
///
/// `admit` resolves the account's tier, then atomically reserves one unit on
/// today's ledger row. The caller runs the expensive work only when the
/// decision is admitted. A successful request needs no follow-up call; a
/// failed one releases its reservation so it does not cost the user quota.
/// Reservation handles live in the ledger store, so any instance sharing
/// that store can settle them. No lock is held between `admit` and the
/// settle call.
pub struct AdmissionGate {
    ledger: Arc<dyn UsageLedger>,
    accounts: Arc<dyn AccountDirectory>,
    clock: Arc<dyn Clock>,
    resolver: TierPolicyResolver,
    calendar: UsageCalendar,
    reservation_ttl: chrono::Duration,
}

impl AdmissionGate {
    pub fn new(
        ledger: Arc<dyn UsageLedger>,
        accounts: Arc<dyn AccountDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            ledger,
            accounts,
            clock,
            resolver: TierPolicyResolver::default(),
            calendar: UsageCalendar::utc(),
            reservation_ttl: chrono::Duration::seconds(DEFAULT_RESERVATION_TTL_SECS as i64),
        }
    }

    pub fn with_policy(mut self, policy: TierPolicy) -> Self {
        self.resolver = TierPolicyResolver::new(policy);
        self
    }

    pub fn with_calendar(mut self, calendar: UsageCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    /// How long a reservation stays releasable by id.
    pub fn with_reservation_ttl(mut self, ttl: Duration) -> Self {
        self.reservation_ttl =
            chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        self
    }

    pub fn resolver(&self) -> &TierPolicyResolver {
        &self.resolver
    }

    pub fn calendar(&self) -> UsageCalendar {
        self.calendar
    }

    pub fn today(&self) -> NaiveDate {
        self.calendar.usage_date(self.clock.now())
    }

    /// Reservation handles still releasable, across every instance sharing the ledger.
    pub fn pending_reservations(&self) -> Result<usize, StorageError> {
        self.ledger.pending_reservations()
    }

    /// Looks the account up in the directory, then decides. Directory
    /// failures downgrade the account to the free tier.
    pub fn admit(
        &self,
        account_id: &str,
        operation: OperationClass,
        ceiling_override: Option<u32>,
    ) -> QuotaDecision {
        let membership = self.membership(account_id);
        self.decide(account_id, membership, operation, ceiling_override)
    }

    /// Decides for a caller that already holds the account's membership state.
    pub fn admit_account(
        &self,
        account: &Account,
        operation: OperationClass,
        ceiling_override: Option<u32>,
    ) -> QuotaDecision {
        self.decide(
            &account.account_id,
            account.membership_expires_at,
            operation,
            ceiling_override,
        )
    }

    /// Optional after a successful request: drops the handle early so the
    /// unit can no longer be released. The unit stays counted either way.
    pub fn commit(&self, reservation: &Reservation) -> bool {
        self.commit_by_id(&reservation.reservation_id)
    }

    pub fn commit_by_id(&self, reservation_id: &Uuid) -> bool {
        match self.ledger.settle_reservation(reservation_id) {
            Ok(Some(record)) => {
                debug!(
                    %reservation_id,
                    account_id = %record.account_id,
                    "committed reservation"
                );
                true
            }
            Ok(None) => {
                debug!(%reservation_id, "commit for unknown or settled reservation");
                false
            }
            Err(err) => {
                warn!(%reservation_id, error = %err, "failed to commit reservation");
                false
            }
        }
    }

    /// The downstream work failed; hand the unit back to the day it was billed to.
    /// Releasing twice is a no-op.
    pub fn release(&self, reservation: &Reservation) -> bool {
        self.release_by_id(&reservation.reservation_id)
    }

    pub fn release_by_id(&self, reservation_id: &Uuid) -> bool {
        match self.ledger.release_reservation(reservation_id) {
            Ok(Some(record)) => {
                debug!(
                    %reservation_id,
                    account_id = %record.account_id,
                    usage_date = %record.usage_date,
                    "released reservation"
                );
                true
            }
            Ok(None) => {
                debug!(%reservation_id, "release for unknown, settled or expired reservation");
                false
            }
            Err(err) => {
                error!(%reservation_id, error = %err, "failed to release reservation");
                false
            }
        }
    }

    /// Returns one unit to `account_id` on `usage_date` without a handle.
    /// Not idempotent: every call decrements, never below zero.
    pub fn release_usage(&self, account_id: &str, usage_date: NaiveDate) -> bool {
        match self.ledger.release(account_id, usage_date) {
            Ok(returned) => {
                debug!(account_id, %usage_date, returned, "released usage unit");
                returned
            }
            Err(err) => {
                error!(account_id, %usage_date, error = %err, "failed to release usage unit");
                false
            }
        }
    }

    /// Forgets reservation handles older than the TTL. Their units stay
    /// consumed. Returns how many handles were dropped.
    pub fn reconcile(&self) -> usize {
        let cutoff = self.clock.now() - self.reservation_ttl;

        match self.ledger.purge_reservations(cutoff) {
            Ok(purged) => {
                if purged > 0 {
                    info!(purged, %cutoff, "expired unsettled reservations");
                }
                purged
            }
            Err(err) => {
                error!(error = %err, "reservation sweep failed");
                0
            }
        }
    }

    pub fn start_reconciliation_task(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let gate = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let purged = gate.reconcile();
                debug!(purged, "reconciliation pass");
            }
        })
    }

    /// Today's usage for UI display. Creates the day's row if it is missing
    /// but never reserves.
    pub fn status(
        &self,
        account_id: &str,
        operation: OperationClass,
        ceiling_override: Option<u32>,
    ) -> Result<QuotaStatus, StorageError> {
        let membership = self.membership(account_id);
        let now = self.clock.now();
        let usage_date = self.calendar.usage_date(now);
        let tier = self
            .resolver
            .resolve(membership, operation, ceiling_override, now);
        let units_consumed = self.ledger.read_or_initialize(account_id, usage_date)?;

        Ok(QuotaStatus {
            account_id: account_id.to_string(),
            usage_date,
            units_consumed,
            ceiling_for_today: tier.ceiling,
            is_privileged_tier: tier.is_privileged_tier,
            remaining: u64::from(tier.ceiling).saturating_sub(units_consumed),
        })
    }

    fn decide(
        &self,
        account_id: &str,
        membership_expires_at: Option<DateTime<Utc>>,
        operation: OperationClass,
        ceiling_override: Option<u32>,
    ) -> QuotaDecision {
        // The date is fixed here; a request that runs past midnight stays on this day.
        let now = self.clock.now();
        let usage_date = self.calendar.usage_date(now);
        let tier = self
            .resolver
            .resolve(membership_expires_at, operation, ceiling_override, now);

        match self.reserve(account_id, usage_date, tier) {
            Ok(units_before) => {
                let reservation = Reservation::new(account_id, usage_date);
                if let Err(err) = self.track(&reservation, now) {
                    error!(
                        account_id,
                        %operation,
                        %usage_date,
                        error = %err,
                        "failed to record reservation; admission failed closed"
                    );
                    self.release_usage(account_id, usage_date);
                    return QuotaDecision::rejected(tier, usage_date);
                }

                debug!(
                    account_id,
                    %operation,
                    %usage_date,
                    units_before,
                    ceiling = tier.ceiling,
                    privileged = tier.is_privileged_tier,
                    reservation_id = %reservation.reservation_id,
                    "admitted generation request"
                );
                QuotaDecision::admitted(tier, units_before, reservation)
            }
            Err(err @ AdmissionError::QuotaExceeded { .. }) => {
                info!(account_id, %operation, %usage_date, reason = %err, "rejected generation request");
                QuotaDecision::rejected(tier, usage_date)
            }
            Err(err) => {
                error!(
                    account_id,
                    %operation,
                    %usage_date,
                    error = %err,
                    "admission failed closed"
                );
                QuotaDecision::rejected(tier, usage_date)
            }
        }
    }

    fn reserve(
        &self,
        account_id: &str,
        usage_date: NaiveDate,
        tier: ResolvedTier,
    ) -> Result<u64, AdmissionError> {
        match self.ledger.try_reserve(account_id, usage_date, tier.ceiling)? {
            ReserveOutcome::Reserved { units_before } => Ok(units_before),
            ReserveOutcome::CeilingReached { units_consumed } => {
                Err(AdmissionError::QuotaExceeded {
                    account_id: account_id.to_string(),
                    used: units_consumed,
                    ceiling: tier.ceiling,
                })
            }
        }
    }

    fn track(&self, reservation: &Reservation, admitted_at: DateTime<Utc>) -> Result<(), StorageError> {
        self.ledger.record_reservation(&ReservationRecord {
            reservation_id: reservation.reservation_id,
            account_id: reservation.account_id.clone(),
            usage_date: reservation.usage_date,
            admitted_at,
        })
    }

    fn membership(&self, account_id: &str) -> Option<DateTime<Utc>> {
        match self.lookup_membership(account_id) {
            Ok(membership) => membership,
            Err(err) => {
                warn!(account_id, error = %err, "treating account as free tier");
                None
            }
        }
    }

    fn lookup_membership(&self, account_id: &str) -> Result<Option<DateTime<Utc>>, AdmissionError> {
        let invalid = |reason: String| AdmissionError::InvalidAccountState {
            account_id: account_id.to_string(),
            reason,
        };

        let account = self
            .accounts
            .lookup(account_id)
            .map_err(|err| invalid(err.to_string()))?
            .ok_or_else(|| invalid("account not found".to_string()))?;

        if account.account_id != account_id {
            return Err(invalid(format!(
                "directory returned account {}",
                account.account_id
            )));
        }

        Ok(account.membership_expires_at)
    }
}
