// Handlers: version, health endpoints, metrics, test alert

use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::alerting::SendOutcome;
use crate::version;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// GET /version: service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(version::info())
}

/// GET /api/health: 200 when every check is healthy, 503 otherwise. Same body either way.
pub(super) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.health.check_health().await;
    let status = if snapshot.overall_status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, axum::Json(snapshot))
}

/// GET /api/ready
pub(super) async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    if state.health.readiness().await {
        (
            StatusCode::OK,
            axum::Json(serde_json::json!({ "status": "ready" })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(serde_json::json!({ "status": "not_ready" })),
        )
    }
}

/// GET /api/live: answers as long as the process can.
pub(super) async fn live_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "alive",
        "uptime": state.health.uptime_secs(),
        "timestamp": chrono::Utc::now(),
    }))
}

/// GET /api/metrics: text exposition for scraping.
pub(super) async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.emitter.registry().render() {
        Ok(body) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "metrics render failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /api/metrics/json
pub(super) async fn metrics_json_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.emitter.registry().summaries())
}

/// POST /api/monitoring/test: one synthetic info alert through the throttle.
pub(super) async fn test_alert_handler(State(state): State<AppState>) -> impl IntoResponse {
    let outcome = state.notifier.send_test_alert().await;
    let (throttled, delivered, failed) = match outcome {
        SendOutcome::Throttled => (true, 0, 0),
        SendOutcome::Dispatched { delivered, failed } => (false, delivered, failed),
    };
    axum::Json(serde_json::json!({
        "success": true,
        "throttled": throttled,
        "delivered": delivered,
        "failed": failed,
        "channels": state.notifier.channel_names(),
        "stats": state.notifier.stats(),
    }))
}
