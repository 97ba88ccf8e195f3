// Request tracking: error-rate window, HTTP metrics and the slow-response check

use axum::{
    extract::{MatchedPath, Request, State},
    http::header::USER_AGENT,
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;

use super::AppState;
use crate::models::HttpRequestMetric;

/// Identity attached by an upstream authentication layer. Only read here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
}

/// Orchestrator health endpoints. Their 503s mirror an outage already reported by the health check.
const HEALTH_ROUTES: &[&str] = &["/api/health", "/api/ready", "/api/live"];

/// Status codes counted as failed requests in the error-rate window.
pub fn is_error_status(status: u16) -> bool {
    status >= 400
}

/// Health endpoints stay out of the error-rate window; they are still recorded as HTTP metrics.
pub fn counts_toward_error_rate(route: &str) -> bool {
    !HEALTH_ROUTES.contains(&route)
}

pub async fn track_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let user_id = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.id.clone());
    let user_agent = request
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let response = next.run(request).await;

    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status_code = response.status().as_u16();
    if counts_toward_error_rate(&route) {
        let rate = state
            .error_rate
            .record_request(is_error_status(status_code));
        state.emitter.record_error_rate(rate);
    }
    state.emitter.record_http_request(HttpRequestMetric {
        method,
        route: route.clone(),
        status_code,
        duration_ms,
        user_id,
        user_agent,
    });

    let notifier = state.notifier.clone();
    tokio::spawn(async move {
        notifier.check_response_time(duration_ms, &route).await;
    });

    response
}
