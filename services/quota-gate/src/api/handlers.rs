use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::{error, info};

use crate::gate::QuotaStatus;
use crate::reporting::{AccountUsage, ConsumerRank, DaySummary, DEFAULT_TOP_LIMIT, MAX_TOP_LIMIT};

use super::types::{
    AdmitRequest, AdmitResponse, ErrorResponse, ReleaseRequest, SettleRequest, SettleResponse,
    StatusQuery, TopConsumersQuery,
};
use super::ApiState;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Both admission and rejection answer 200; `admitted` carries the verdict.
pub async fn admit(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<AdmitRequest>,
) -> ApiResult<AdmitResponse> {
    if request.account_id.trim().is_empty() {
        return Err(bad_request("invalid_account_id", "account_id cannot be empty"));
    }

    let decision = state
        .gate
        .admit(&request.account_id, request.operation, request.ceiling_override);

    if !decision.admitted {
        info!(
            account_id = %request.account_id,
            operation = %request.operation,
            used = decision.units_used_before_this_request,
            ceiling = decision.ceiling_for_today,
            "admission rejected"
        );
    }

    Ok(Json(AdmitResponse::from(decision)))
}

pub async fn commit(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<SettleRequest>,
) -> ApiResult<SettleResponse> {
    let settled = state.gate.commit_by_id(&request.reservation_id);
    Ok(Json(SettleResponse { settled }))
}

pub async fn release(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<ReleaseRequest>,
) -> ApiResult<SettleResponse> {
    let settled = match request {
        ReleaseRequest::Reservation { reservation_id } => state.gate.release_by_id(&reservation_id),
        ReleaseRequest::Usage {
            account_id,
            usage_date,
        } => {
            if account_id.trim().is_empty() {
                return Err(bad_request("invalid_account_id", "account_id cannot be empty"));
            }
            state.gate.release_usage(&account_id, usage_date)
        }
    };
    Ok(Json(SettleResponse { settled }))
}

pub async fn quota_status(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<QuotaStatus> {
    if query.account_id.trim().is_empty() {
        return Err(bad_request("invalid_account_id", "account_id cannot be empty"));
    }

    state
        .gate
        .status(&query.account_id, query.operation, query.ceiling_override)
        .map(Json)
        .map_err(store_unavailable)
}

pub async fn usage_today(State(state): State<Arc<ApiState>>) -> ApiResult<DaySummary> {
    state.reporter.today().map(Json).map_err(store_unavailable)
}

pub async fn account_usage(
    State(state): State<Arc<ApiState>>,
    Path(account_id): Path<String>,
) -> ApiResult<AccountUsage> {
    state
        .reporter
        .account(&account_id)
        .map(Json)
        .map_err(store_unavailable)
}

pub async fn top_consumers(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<TopConsumersQuery>,
) -> ApiResult<Vec<ConsumerRank>> {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT);
    if limit == 0 || limit > MAX_TOP_LIMIT {
        return Err(bad_request(
            "invalid_limit",
            &format!("limit must be between 1 and {MAX_TOP_LIMIT}"),
        ));
    }
    if query.days == Some(0) {
        return Err(bad_request("invalid_days", "days must be greater than zero"));
    }

    state
        .reporter
        .top_consumers(limit, query.days)
        .map(Json)
        .map_err(store_unavailable)
}

pub async fn health_check() -> ApiResult<serde_json::Value> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": "quota-gate"
    })))
}

fn bad_request(code: &str, message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            code: code.to_string(),
            details: None,
        }),
    )
}

fn store_unavailable<E: std::fmt::Display>(err: E) -> (StatusCode, Json<ErrorResponse>) {
    error!(error = %err, "usage ledger query failed");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: "usage ledger unavailable".to_string(),
            code: "store_unavailable".to_string(),
            details: None,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{Account, InMemoryAccountDirectory};
    use crate::api::create_router;
    use crate::clock::{ManualClock, UsageCalendar};
    use crate::config::{GateConfig, LedgerBackend};
    use crate::gate::AdmissionGate;
    use crate::reporting::UsageReporter;
    use crate::storage::MemoryLedger;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use axum::Router;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let ledger = Arc::new(MemoryLedger::new());
        let accounts = Arc::new(InMemoryAccountDirectory::new());
        let now = Utc.with_ymd_and_hms(2026, 9, 1, 8, 0, 0).unwrap();
        accounts.upsert(Account::member_until("paid", now + Duration::days(30)));
        let clock = Arc::new(ManualClock::new(now));

        let gate = Arc::new(AdmissionGate::new(ledger.clone(), accounts, clock.clone()));
        let reporter = Arc::new(UsageReporter::new(ledger, clock, UsageCalendar::utc()));
        let config = GateConfig {
            ledger_backend: LedgerBackend::Memory,
            ..GateConfig::default()
        };

        create_router(Arc::new(ApiState::new(gate, reporter, config)))
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn admit_until_rejected() {
        let app = app();
        let request = json!({"account_id": "free", "operation": "cover_letter"});

        for used in 0..3 {
            let (status, body) = send(&app, post("/api/admission/admit", request.clone())).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["admitted"], true);
            assert_eq!(body["units_used_before_this_request"], used);
            assert!(body["reservation_id"].is_string());
        }

        let (_, body) = send(&app, post("/api/admission/admit", request)).await;
        assert_eq!(body["admitted"], false);
        assert_eq!(body["units_used_before_this_request"], 3);
        assert_eq!(body["ceiling_for_today"], 3);
        assert_eq!(body["is_privileged_tier"], false);
        assert!(body["reservation_id"].is_null());
    }

    #[tokio::test]
    async fn release_returns_unit() {
        let app = app();
        let request = json!({"account_id": "free", "operation": "report", "ceiling_override": 1});

        let (_, admitted) = send(&app, post("/api/admission/admit", request.clone())).await;
        let reservation_id = admitted["reservation_id"].clone();

        let (_, rejected) = send(&app, post("/api/admission/admit", request.clone())).await;
        assert_eq!(rejected["admitted"], false);

        let (status, settled) = send(
            &app,
            post("/api/admission/release", json!({"reservation_id": reservation_id})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(settled["settled"], true);

        let (_, again) = send(
            &app,
            post("/api/admission/release", json!({"reservation_id": reservation_id})),
        )
        .await;
        assert_eq!(again["settled"], false);

        let (_, readmitted) = send(&app, post("/api/admission/admit", request)).await;
        assert_eq!(readmitted["admitted"], true);
    }

    #[tokio::test]
    async fn release_by_account_and_day() {
        let app = app();
        let request = json!({"account_id": "free", "operation": "report", "ceiling_override": 1});

        let (_, admitted) = send(&app, post("/api/admission/admit", request.clone())).await;
        let usage_date = admitted["usage_date"].clone();

        let (status, settled) = send(
            &app,
            post(
                "/api/admission/release",
                json!({"account_id": "free", "usage_date": usage_date}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(settled["settled"], true);

        let (_, readmitted) = send(&app, post("/api/admission/admit", request)).await;
        assert_eq!(readmitted["admitted"], true);
    }

    #[tokio::test]
    async fn status_and_reports() {
        let app = app();
        let admit = json!({"account_id": "paid", "operation": "report"});
        let (_, body) = send(&app, post("/api/admission/admit", admit)).await;
        assert_eq!(body["is_privileged_tier"], true);
        assert_eq!(body["ceiling_for_today"], 50);

        let (status, quota) = send(
            &app,
            get("/api/admission/status?account_id=paid&operation=report"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(quota["units_consumed"], 1);
        assert_eq!(quota["remaining"], 49);

        let (_, today) = send(&app, get("/api/usage/today")).await;
        assert_eq!(today["total_units"], 1);
        assert_eq!(today["active_accounts"], 1);

        let (_, account) = send(&app, get("/api/usage/accounts/paid")).await;
        assert_eq!(account["today_units"], 1);

        let (_, top) = send(&app, get("/api/usage/top?limit=5&days=7")).await;
        assert_eq!(top[0]["account_id"], "paid");
        assert_eq!(top[0]["rank"], 1);

        let (status, all_time) = send(&app, get("/api/usage/top?days=4294967295")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all_time[0]["account_id"], "paid");
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let app = app();

        let (status, body) = send(
            &app,
            post(
                "/api/admission/admit",
                json!({"account_id": "  ", "operation": "report"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_account_id");

        let (status, _) = send(
            &app,
            post(
                "/api/admission/admit",
                json!({"account_id": "a", "operation": "translate"}),
            ),
        )
        .await;
        assert!(status.is_client_error());

        let (status, body) = send(&app, get("/api/usage/top?limit=1000")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_limit");
    }

    #[tokio::test]
    async fn health() {
        let (status, body) = send(&app(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "quota-gate");
    }
}
