// Integration tests: HTTP endpoints, request tracking and the store-outage scenario

mod common;

use adopte_monitor::models::{AlertKind, MetricType, Severity};
use adopte_monitor::routes::middleware::track_requests;
use adopte_monitor::routes::{self, AuthenticatedUser};
use adopte_monitor::scheduler::{SchedulerDeps, run_alert_check, run_health_check};
use axum::extract::Request;
use axum::http::StatusCode;
use axum::{Router, routing::get};
use axum_test::TestServer;
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn test_harness(dir: &TempDir) -> Harness {
    harness(
        Arc::new(FakeStore::connected()),
        Arc::new(FixedSampler(calm_sample())),
        vec![dir.path().to_path_buf()],
    )
}

fn test_server(h: &Harness) -> TestServer {
    TestServer::try_new(routes::app(h.state.clone())).unwrap()
}

#[tokio::test]
async fn test_version_endpoint() {
    let dir = TempDir::new().unwrap();
    let server = test_server(&test_harness(&dir));
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(
        json.get("name").and_then(|v| v.as_str()),
        Some("adopte-monitor")
    );
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_health_endpoint_healthy() {
    let dir = TempDir::new().unwrap();
    let server = test_server(&test_harness(&dir));
    let response = server.get("/api/health").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["overallStatus"], "healthy");
    for check in ["database", "memory", "system", "services"] {
        assert_eq!(json["checks"][check]["status"], "healthy", "{check}");
    }
    assert!(json["responseTimeMs"].is_u64());
}

#[tokio::test]
async fn test_ready_and_live_endpoints() {
    let dir = TempDir::new().unwrap();
    let h = test_harness(&dir);
    let server = test_server(&h);

    let response = server.get("/api/ready").await;
    response.assert_status_ok();
    assert_eq!(response.json::<serde_json::Value>()["status"], "ready");

    h.store.set_connected(false);
    let response = server.get("/api/ready").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<serde_json::Value>()["status"], "not_ready");

    let response = server.get("/api/live").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["status"], "alive");
    assert!(json["uptime"].is_u64());
}

#[tokio::test]
async fn test_store_outage_reports_503_and_alerts_once() {
    let dir = TempDir::new().unwrap();
    let h = test_harness(&dir);
    let server = test_server(&h);

    h.store.set_connected(false);
    let response = server.get("/api/health").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let json: serde_json::Value = response.json();
    assert_eq!(json["checks"]["database"]["status"], "unhealthy");
    let overall = json["overallStatus"].as_str().unwrap();
    assert!(overall == "degraded" || overall == "unhealthy", "{overall}");

    let deps = SchedulerDeps {
        health: h.state.health.clone(),
        emitter: h.state.emitter.clone(),
        notifier: h.state.notifier.clone(),
        error_rate: h.state.error_rate.clone(),
        business: Arc::new(CountingBusiness::default()),
        records: None,
        clock: h.clock.clone(),
    };
    // Four minutes of 30 s health checks and 60 s alert checks.
    for tick in 0..8 {
        run_health_check(deps.clone()).await.unwrap();
        if tick % 2 == 0 {
            run_alert_check(deps.clone()).await.unwrap();
        }
        h.clock.advance(Duration::from_secs(30));
    }
    assert_eq!(h.channel.count_kind(AlertKind::Database), 1);
    assert!(h.state.notifier.stats().throttled >= 7);
}

#[tokio::test]
async fn test_metrics_endpoints_expose_request_counters() {
    let dir = TempDir::new().unwrap();
    let server = test_server(&test_harness(&dir));

    server.get("/api/live").await.assert_status_ok();

    let response = server.get("/api/metrics").await;
    response.assert_status_ok();
    let text = response.text();
    assert!(text.contains("# TYPE adopte_http_requests_total counter"));
    assert!(text.contains(r#"route="/api/live""#));
    assert!(text.contains("adopte_records_saved_total 0"));

    let response = server.get("/api/metrics/json").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    let families = json.as_array().unwrap();
    let requests = families
        .iter()
        .find(|f| f["name"] == "adopte_http_requests_total")
        .unwrap();
    assert_eq!(requests["type"], "counter");
    assert!(requests["help"].is_string());
    let values = requests["values"].as_array().unwrap();
    assert!(values.iter().any(|v| v["labels"]["route"] == "/api/live"
        && v["metricName"] == "adopte_http_requests_total"));
}

/// A host API wrapped by the tracking middleware, the way the backend mounts it.
fn tracked_api(h: &Harness) -> TestServer {
    let api = Router::new()
        .route("/api/jobs", get(|| async { "ok" }))
        .route(
            "/api/jobs/broken",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .route(
            "/api/jobs/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(1500)).await;
                "late"
            }),
        )
        .route_layer(axum::middleware::from_fn_with_state(
            h.state.clone(),
            track_requests,
        ));
    TestServer::try_new(api).unwrap()
}

#[tokio::test]
async fn test_middleware_counts_failed_requests() {
    let dir = TempDir::new().unwrap();
    let h = test_harness(&dir);
    let server = tracked_api(&h);

    server.get("/api/jobs").await.assert_status_ok();
    server
        .get("/api/jobs/broken")
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    let window = h.state.error_rate.window();
    assert_eq!(window.total_requests, 2);
    assert_eq!(window.error_requests, 1);
    assert_eq!(h.state.error_rate.error_rate(), 50.0);

    let records: Vec<_> = h
        .sink
        .records()
        .into_iter()
        .filter(|r| r.metric_type == MetricType::HttpRequest)
        .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].payload["statusCode"], 500);
    assert_eq!(records[1].payload["route"], "/api/jobs/broken");
}

#[tokio::test]
async fn test_health_endpoint_503s_stay_out_of_error_rate() {
    let dir = TempDir::new().unwrap();
    let h = test_harness(&dir);
    let server = test_server(&h);

    h.store.set_connected(false);
    for _ in 0..5 {
        server
            .get("/api/ready")
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
        server
            .get("/api/health")
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }

    assert_eq!(h.state.error_rate.window().total_requests, 0);
    assert_eq!(h.state.error_rate.error_rate(), 0.0);
    // Still visible as request metrics.
    let health_calls = h
        .sink
        .records()
        .iter()
        .filter(|r| r.metric_type == MetricType::HttpRequest)
        .count();
    assert_eq!(health_calls, 10);
}

#[tokio::test(start_paused = true)]
async fn test_slow_request_raises_response_time_alert() {
    let dir = TempDir::new().unwrap();
    let h = test_harness(&dir);
    let server = tracked_api(&h);

    server.get("/api/jobs").await.assert_status_ok();
    server.get("/api/jobs/slow").await.assert_status_ok();

    // The threshold check runs detached from the response.
    for _ in 0..50 {
        if h.channel.count_kind(AlertKind::ResponseTime) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let alerts = h.channel.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::ResponseTime);
    assert_eq!(alerts[0].severity, Severity::Warning);
    assert_eq!(alerts[0].metrics["route"], "/api/jobs/slow");
}

#[tokio::test]
async fn test_live_answers_while_store_hangs() {
    let dir = TempDir::new().unwrap();
    let h = harness(
        Arc::new(FakeStore::hanging()),
        Arc::new(FixedSampler(calm_sample())),
        vec![dir.path().to_path_buf()],
    );
    let server = test_server(&h);

    let response = tokio::time::timeout(Duration::from_millis(500), server.get("/api/live"))
        .await
        .expect("liveness does not wait on the store");
    response.assert_status_ok();
    assert_eq!(response.json::<serde_json::Value>()["status"], "alive");
}

#[tokio::test]
async fn test_middleware_tags_authenticated_user() {
    let dir = TempDir::new().unwrap();
    let h = test_harness(&dir);
    let app = routes::app(h.state.clone()).layer(axum::middleware::map_request(
        |mut request: Request| async move {
            request.extensions_mut().insert(AuthenticatedUser {
                id: "student-42".into(),
            });
            request
        },
    ));
    let server = TestServer::try_new(app).unwrap();

    server
        .get("/api/live")
        .add_header(
            axum::http::header::USER_AGENT,
            axum::http::HeaderValue::from_static("uptime-bot/1.0"),
        )
        .await
        .assert_status_ok();

    let record = h
        .sink
        .records()
        .into_iter()
        .find(|r| r.metric_type == MetricType::HttpRequest)
        .unwrap();
    assert_eq!(record.payload["userId"], "student-42");
    assert_eq!(record.payload["userAgent"], "uptime-bot/1.0");
}

#[tokio::test]
async fn test_test_alert_endpoint_goes_through_throttle() {
    let dir = TempDir::new().unwrap();
    let h = test_harness(&dir);
    let server = test_server(&h);

    let response = server.post("/api/monitoring/test").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json["success"], true);
    assert_eq!(json["throttled"], false);
    assert_eq!(json["delivered"], 1);
    assert_eq!(h.channel.count_kind(AlertKind::Test), 1);

    let json: serde_json::Value = server.post("/api/monitoring/test").await.json();
    assert_eq!(json["throttled"], true);
    assert_eq!(h.channel.count_kind(AlertKind::Test), 1);
}
