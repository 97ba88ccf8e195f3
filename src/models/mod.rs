// Domain models

mod alert;
mod health;
mod record;

pub use alert::{Alert, AlertKind, Severity};
pub use health::{
    CHECK_DATABASE, CHECK_MEMORY, CHECK_SERVICES, CHECK_SYSTEM, CheckResult, HealthSnapshot,
    HealthStatus,
};
pub use record::{
    BusinessCounts, DatabaseOperationMetric, EntityCounts, ErrorMetric, HttpRequestMetric,
    MetricRecord, MetricType, RecordLevel, SocketMetric, SystemSample,
};
