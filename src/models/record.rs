// Metric records handed to the log sink, and their typed payloads

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    HttpRequest,
    DatabaseOperation,
    BusinessMetrics,
    SystemMetrics,
    SocketEvent,
    Error,
    HealthCheck,
}

impl MetricType {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::HttpRequest => "http_request",
            MetricType::DatabaseOperation => "database_operation",
            MetricType::BusinessMetrics => "business_metrics",
            MetricType::SystemMetrics => "system_metrics",
            MetricType::SocketEvent => "socket_event",
            MetricType::Error => "error",
            MetricType::HealthCheck => "health_check",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordLevel {
    Info,
    Warn,
    Error,
}

impl RecordLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordLevel::Info => "info",
            RecordLevel::Warn => "warn",
            RecordLevel::Error => "error",
        }
    }
}

/// One observation. Identity is emission order only; the core keeps no copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    pub metric_type: MetricType,
    pub level: RecordLevel,
    pub message: String,
    pub payload: serde_json::Value,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl MetricRecord {
    pub fn new<P: Serialize>(
        metric_type: MetricType,
        level: RecordLevel,
        message: impl Into<String>,
        payload: &P,
    ) -> Self {
        // Payload types are plain structs and maps; a failure here degrades to null.
        let payload = serde_json::to_value(payload).unwrap_or(serde_json::Value::Null);
        Self {
            metric_type,
            level,
            message: message.into(),
            payload,
            timestamp: chrono::Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestMetric {
    pub method: String,
    pub route: String,
    pub status_code: u16,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseOperationMetric {
    pub operation: String,
    pub collection: String,
    pub duration_ms: f64,
    pub success: bool,
}

/// Row counts of one business entity, total and per status value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityCounts {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
}

/// Aggregate business counts keyed by entity (users, job_offers, applications, adoptions).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessCounts(pub BTreeMap<String, EntityCounts>);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocketMetric {
    pub event: String,
    pub connected_clients: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMetric {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub context: serde_json::Value,
}

/// Process and host resource readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSample {
    pub process_memory_bytes: u64,
    pub process_virtual_memory_bytes: u64,
    /// Budget the process memory is measured against.
    pub process_memory_limit_bytes: u64,
    pub system_total_memory_bytes: u64,
    pub system_free_memory_bytes: u64,
    pub load_one: f64,
    pub load_five: f64,
    pub load_fifteen: f64,
    pub cpu_count: u32,
    pub process_uptime_secs: u64,
}
