use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::ApiState;

pub fn create_router(state: Arc<ApiState>) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.request_timeout()));

    Router::new()
        .route("/api/admission/admit", post(handlers::admit))
        .route("/api/admission/commit", post(handlers::commit))
        .route("/api/admission/release", post(handlers::release))
        .route("/api/admission/status", get(handlers::quota_status))
        .route("/api/usage/today", get(handlers::usage_today))
        .route("/api/usage/top", get(handlers::top_consumers))
        .route("/api/usage/accounts/:account_id", get(handlers::account_usage))
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(middleware)
}
