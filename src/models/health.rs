// Health snapshot models and the worst-status reduction

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CHECK_DATABASE: &str = "database";
pub const CHECK_MEMORY: &str = "memory";
pub const CHECK_SYSTEM: &str = "system";
pub const CHECK_SERVICES: &str = "services";

/// Status of one check or of the whole snapshot; serializes lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Degraded,
    Unhealthy,
    Critical,
}

impl HealthStatus {
    /// Severity order: critical > unhealthy > degraded = warning > healthy.
    pub fn rank(self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Warning | HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
            HealthStatus::Critical => 3,
        }
    }

    /// Most severe status among `statuses`. A worst of `warning` is reported as `degraded`;
    /// an empty input is healthy.
    pub fn worst<I>(statuses: I) -> HealthStatus
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        let worst = statuses
            .into_iter()
            .max_by_key(|s| s.rank())
            .unwrap_or(HealthStatus::Healthy);
        match worst {
            HealthStatus::Warning => HealthStatus::Degraded,
            other => other,
        }
    }

    pub fn is_healthy(self) -> bool {
        self == HealthStatus::Healthy
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Critical => "critical",
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub status: HealthStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, serde_json::Value>,
}

impl CheckResult {
    pub fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            response_time_ms: None,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_response_time(mut self, ms: u64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }

    /// Numeric metric by key, if present.
    pub fn metric_f64(&self, key: &str) -> Option<f64> {
        self.metrics.get(key).and_then(|v| v.as_f64())
    }
}

/// One health-check cycle. Produced fresh each time; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub overall_status: HealthStatus,
    /// Wall time of the whole aggregation.
    pub response_time_ms: u64,
    pub uptime_secs: u64,
    pub version: String,
    pub checks: BTreeMap<String, CheckResult>,
}

impl HealthSnapshot {
    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.get(name)
    }
}
