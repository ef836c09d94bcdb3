use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gate::QuotaDecision;
use crate::policy::OperationClass;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmitRequest {
    pub account_id: String,
    pub operation: OperationClass,
    #[serde(default)]
    pub ceiling_override: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmitResponse {
    pub admitted: bool,
    pub units_used_before_this_request: u64,
    pub ceiling_for_today: u32,
    pub is_privileged_tier: bool,
    pub remaining: u64,
    pub usage_date: NaiveDate,
    pub reservation_id: Option<Uuid>,
}

impl From<QuotaDecision> for AdmitResponse {
    fn from(decision: QuotaDecision) -> Self {
        Self {
            admitted: decision.admitted,
            units_used_before_this_request: decision.units_used_before_this_request,
            ceiling_for_today: decision.ceiling_for_today,
            is_privileged_tier: decision.is_privileged_tier,
            remaining: decision.remaining(),
            usage_date: decision.usage_date,
            reservation_id: decision
                .reservation
                .map(|reservation| reservation.reservation_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleRequest {
    pub reservation_id: Uuid,
}

/// A release names either the reservation handle or the account and the
/// day the unit was billed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReleaseRequest {
    Reservation {
        reservation_id: Uuid,
    },
    Usage {
        account_id: String,
        usage_date: NaiveDate,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleResponse {
    pub settled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusQuery {
    pub account_id: String,
    pub operation: OperationClass,
    pub ceiling_override: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopConsumersQuery {
    pub limit: Option<usize>,
    pub days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub details: Option<serde_json::Value>,
}
