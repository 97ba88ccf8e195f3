// Individual health checks. Memory and load classification are pure; store and services do I/O.

use crate::models::{CheckResult, HealthStatus, SystemSample};
use crate::store::{ConnectionState, StoreHealth};
use std::path::PathBuf;
use std::time::Instant;
use tracing::instrument;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

const HEAP_CRITICAL_PERCENT: f64 = 90.0;
const HEAP_WARNING_PERCENT: f64 = 80.0;
const SYSTEM_MEMORY_CRITICAL_PERCENT: f64 = 95.0;
const SYSTEM_MEMORY_WARNING_PERCENT: f64 = 85.0;
const LOAD_CRITICAL_PERCENT: f64 = 90.0;
const LOAD_WARNING_PERCENT: f64 = 75.0;

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { part / whole * 100.0 } else { 0.0 }
}

fn mb(bytes: u64) -> f64 {
    ((bytes as f64 / BYTES_PER_MB) * 100.0).round() / 100.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Process memory against its budget, and host memory in use.
pub fn classify_memory(sample: &SystemSample) -> CheckResult {
    let heap_percent = percent(
        sample.process_memory_bytes as f64,
        sample.process_memory_limit_bytes as f64,
    );
    let used = sample
        .system_total_memory_bytes
        .saturating_sub(sample.system_free_memory_bytes);
    let system_percent = percent(used as f64, sample.system_total_memory_bytes as f64);

    let (status, message) = if heap_percent > HEAP_CRITICAL_PERCENT
        || system_percent > SYSTEM_MEMORY_CRITICAL_PERCENT
    {
        (HealthStatus::Critical, "Memory usage critical")
    } else if heap_percent > HEAP_WARNING_PERCENT || system_percent > SYSTEM_MEMORY_WARNING_PERCENT
    {
        (HealthStatus::Warning, "Memory usage high")
    } else {
        (HealthStatus::Healthy, "Memory usage normal")
    };

    CheckResult::new(status, message)
        .with_metric("heapUsedMB", mb(sample.process_memory_bytes))
        .with_metric("heapLimitMB", mb(sample.process_memory_limit_bytes))
        .with_metric("heapUsedPercent", round2(heap_percent))
        .with_metric("systemTotalMB", mb(sample.system_total_memory_bytes))
        .with_metric("systemFreeMB", mb(sample.system_free_memory_bytes))
        .with_metric("systemUsedPercent", round2(system_percent))
}

/// `round(load1 / cores * 100)`.
pub fn load_percent(sample: &SystemSample) -> f64 {
    percent(sample.load_one, sample.cpu_count.max(1) as f64).round()
}

pub fn classify_load(sample: &SystemSample) -> CheckResult {
    let load_percent = load_percent(sample);
    let (status, message) = if load_percent > LOAD_CRITICAL_PERCENT {
        (HealthStatus::Critical, "System load critical")
    } else if load_percent > LOAD_WARNING_PERCENT {
        (HealthStatus::Warning, "System load high")
    } else {
        (HealthStatus::Healthy, "System load normal")
    };
    CheckResult::new(status, message)
        .with_metric("loadPercent", load_percent)
        .with_metric("loadAverage1m", round2(sample.load_one))
        .with_metric("loadAverage5m", round2(sample.load_five))
        .with_metric("loadAverage15m", round2(sample.load_fifteen))
        .with_metric("cpuCount", sample.cpu_count)
        .with_metric("uptimeSecs", sample.process_uptime_secs)
}

/// Not connected: unhealthy without a round-trip. Round-trip failure: critical.
#[instrument(skip(store), fields(check = "database"))]
pub async fn check_store(store: &dyn StoreHealth) -> CheckResult {
    let state = store.connection_state();
    if state != ConnectionState::Connected {
        return CheckResult::new(HealthStatus::Unhealthy, "Database not connected")
            .with_metric("state", state.as_str());
    }

    let start = Instant::now();
    let stats = match store.ping().await {
        Ok(()) => store.stats().await,
        Err(e) => Err(e),
    };
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match stats {
        Ok(stats) => CheckResult::new(HealthStatus::Healthy, "Database connection healthy")
            .with_response_time(elapsed_ms)
            .with_metric("collections", stats.collections)
            .with_metric("indexes", stats.indexes)
            .with_metric("dataSizeMB", stats.data_size_mb())
            .with_metric("storageSizeMB", stats.storage_size_mb()),
        Err(e) => {
            tracing::warn!(error = %e, "database round-trip failed");
            CheckResult::new(
                HealthStatus::Critical,
                format!("Database check failed: {}", e),
            )
            .with_response_time(elapsed_ms)
        }
    }
}

/// Every declared local path must be reachable.
#[instrument(skip(paths), fields(check = "services", paths = paths.len()))]
pub async fn check_paths(paths: &[PathBuf]) -> CheckResult {
    let mut inaccessible = Vec::new();
    let mut result_metrics = serde_json::Map::new();
    for path in paths {
        let shown = path.display().to_string();
        let ok = match tokio::fs::metadata(path).await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(path = %shown, error = %e, "path not accessible");
                false
            }
        };
        if !ok {
            inaccessible.push(shown.clone());
        }
        result_metrics.insert(shown, serde_json::Value::Bool(ok));
    }

    let result = if inaccessible.is_empty() {
        CheckResult::new(HealthStatus::Healthy, "Local services accessible")
    } else {
        CheckResult::new(
            HealthStatus::Unhealthy,
            format!("Not accessible: {}", inaccessible.join(", ")),
        )
    };
    result.with_metric("paths", serde_json::Value::Object(result_metrics))
}
