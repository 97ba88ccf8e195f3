// HTTP routes: health, readiness, liveness, metrics exposition, test alert

mod http;
pub mod middleware;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::alerting::AlertNotifier;
use crate::error_rate::ErrorRateTracker;
use crate::health::HealthAggregator;
use crate::metrics::MetricEmitter;

pub use middleware::AuthenticatedUser;

#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthAggregator>,
    pub emitter: Arc<MetricEmitter>,
    pub notifier: Arc<AlertNotifier>,
    pub error_rate: Arc<ErrorRateTracker>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/health", get(http::health_handler)) // GET /api/health
        .route("/api/ready", get(http::ready_handler)) // GET /api/ready
        .route("/api/live", get(http::live_handler)) // GET /api/live
        .route("/api/metrics", get(http::metrics_handler)) // GET /api/metrics
        .route("/api/metrics/json", get(http::metrics_json_handler)) // GET /api/metrics/json
        .route("/api/monitoring/test", post(http::test_alert_handler)) // POST /api/monitoring/test
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::track_requests,
        ))
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
