// Alert models

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordinal alert urgency: info < warning < critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed vocabulary of alert types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ResponseTime,
    ErrorRate,
    Memory,
    CpuLoad,
    Database,
    DatabaseResponseTime,
    Services,
    Test,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::ResponseTime => "response_time",
            AlertKind::ErrorRate => "error_rate",
            AlertKind::Memory => "memory",
            AlertKind::CpuLoad => "cpu_load",
            AlertKind::Database => "database",
            AlertKind::DatabaseResponseTime => "database_response_time",
            AlertKind::Services => "services",
            AlertKind::Test => "test",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl Alert {
    pub fn new(
        kind: AlertKind,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            title: title.into(),
            description: description.into(),
            metrics: BTreeMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }

    /// Throttle key: `<type>_<severity>`.
    pub fn throttle_key(&self) -> String {
        format!("{}_{}", self.kind.as_str(), self.severity.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_key_joins_type_and_severity() {
        let alert = Alert::new(AlertKind::DatabaseResponseTime, Severity::Warning, "t", "d");
        assert_eq!(alert.throttle_key(), "database_response_time_warning");
    }

    #[test]
    fn severity_orders_info_warning_critical() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
    }

    #[test]
    fn alert_serializes_kind_as_type() {
        let alert = Alert::new(AlertKind::Memory, Severity::Critical, "t", "d").with_metric("heapUsedPercent", 93.0);
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["type"], "memory");
        assert_eq!(json["severity"], "critical");
        assert_eq!(json["metrics"]["heapUsedPercent"], 93.0);
    }
}
