use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OperationClass, DEFAULT_FREE_DAILY_LIMIT, DEFAULT_PRIVILEGED_DAILY_LIMIT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCeilings {
    pub free: u32,
    pub privileged: u32,
}

impl Default for TierCeilings {
    fn default() -> Self {
        Self {
            free: DEFAULT_FREE_DAILY_LIMIT,
            privileged: DEFAULT_PRIVILEGED_DAILY_LIMIT,
        }
    }
}

impl TierCeilings {
    pub fn for_tier(&self, privileged: bool) -> u32 {
        if privileged {
            self.privileged
        } else {
            self.free
        }
    }
}

/// Configured daily ceilings: a global pair plus optional per-class pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierPolicy {
    defaults: TierCeilings,
    per_class: HashMap<OperationClass, TierCeilings>,
}

impl TierPolicy {
    pub fn new(defaults: TierCeilings) -> Self {
        Self {
            defaults,
            per_class: HashMap::new(),
        }
    }

    pub fn with_class(mut self, operation: OperationClass, ceilings: TierCeilings) -> Self {
        self.per_class.insert(operation, ceilings);
        self
    }

    pub fn set_class(&mut self, operation: OperationClass, ceilings: TierCeilings) {
        self.per_class.insert(operation, ceilings);
    }

    pub fn defaults(&self) -> TierCeilings {
        self.defaults
    }

    pub fn ceilings_for(&self, operation: OperationClass) -> TierCeilings {
        self.per_class
            .get(&operation)
            .copied()
            .unwrap_or(self.defaults)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedTier {
    pub ceiling: u32,
    pub is_privileged_tier: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TierPolicyResolver {
    policy: TierPolicy,
}

impl TierPolicyResolver {
    pub fn new(policy: TierPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TierPolicy {
        &self.policy
    }

    /// Pure: the result depends only on the arguments. `now` must come from
    /// the same clock that buckets the ledger.
    ///
    /// An explicit `ceiling_override` replaces the configured ceiling for
    /// whichever tier the account falls into; it never changes the tier.
    pub fn resolve(
        &self,
        membership_expires_at: Option<DateTime<Utc>>,
        operation: OperationClass,
        ceiling_override: Option<u32>,
        now: DateTime<Utc>,
    ) -> ResolvedTier {
        let is_privileged_tier = matches!(membership_expires_at, Some(expires_at) if expires_at > now);
        let ceiling = ceiling_override.unwrap_or_else(|| {
            self.policy
                .ceilings_for(operation)
                .for_tier(is_privileged_tier)
        });

        ResolvedTier {
            ceiling,
            is_privileged_tier,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn free_account_gets_free_default() {
        let resolver = TierPolicyResolver::default();
        let tier = resolver.resolve(None, OperationClass::Report, None, now());
        assert_eq!(
            tier,
            ResolvedTier {
                ceiling: DEFAULT_FREE_DAILY_LIMIT,
                is_privileged_tier: false
            }
        );
    }

    #[test]
    fn active_membership_gets_privileged_default() {
        let resolver = TierPolicyResolver::default();
        let expires = now() + Duration::hours(1);
        let tier = resolver.resolve(Some(expires), OperationClass::CvPolish, None, now());
        assert!(tier.is_privileged_tier);
        assert_eq!(tier.ceiling, DEFAULT_PRIVILEGED_DAILY_LIMIT);
    }

    #[test]
    fn membership_expiring_now_is_not_privileged() {
        let resolver = TierPolicyResolver::default();
        let tier = resolver.resolve(Some(now()), OperationClass::Report, None, now());
        assert!(!tier.is_privileged_tier);

        let lapsed = resolver.resolve(
            Some(now() - Duration::days(3)),
            OperationClass::Report,
            None,
            now(),
        );
        assert!(!lapsed.is_privileged_tier);
        assert_eq!(lapsed.ceiling, DEFAULT_FREE_DAILY_LIMIT);
    }

    #[test]
    fn override_replaces_ceiling_but_not_tier() {
        let resolver = TierPolicyResolver::default();
        let expires = now() + Duration::days(30);

        let paid = resolver.resolve(Some(expires), OperationClass::CoverLetter, Some(7), now());
        assert_eq!(paid.ceiling, 7);
        assert!(paid.is_privileged_tier);

        let free = resolver.resolve(None, OperationClass::CoverLetter, Some(10), now());
        assert_eq!(free.ceiling, 10);
        assert!(!free.is_privileged_tier);
    }

    #[test]
    fn per_class_ceilings_take_precedence_over_global() {
        let policy = TierPolicy::new(TierCeilings {
            free: 3,
            privileged: 50,
        })
        .with_class(
            OperationClass::Report,
            TierCeilings {
                free: 1,
                privileged: 20,
            },
        );
        let resolver = TierPolicyResolver::new(policy);
        let expires = now() + Duration::hours(2);

        assert_eq!(
            resolver
                .resolve(None, OperationClass::Report, None, now())
                .ceiling,
            1
        );
        assert_eq!(
            resolver
                .resolve(Some(expires), OperationClass::Report, None, now())
                .ceiling,
            20
        );
        assert_eq!(
            resolver
                .resolve(None, OperationClass::CvPolish, None, now())
                .ceiling,
            3
        );
    }

    #[test]
    fn operation_class_parses_loosely() {
        assert_eq!(
            "cover-letter".parse::<OperationClass>().unwrap(),
            OperationClass::CoverLetter
        );
        assert_eq!(
            "CV_POLISH".parse::<OperationClass>().unwrap(),
            OperationClass::CvPolish
        );
        assert!("translate".parse::<OperationClass>().is_err());
    }
}
