// Metric emitter: shapes one record per observation, updates the pull registry and hands
// the record to the sink. Never blocks the caller and never retries.

pub mod registry;

use crate::health::checks;
use crate::models::{
    BusinessCounts, DatabaseOperationMetric, ErrorMetric, HealthSnapshot, HttpRequestMetric,
    MetricRecord, MetricType, RecordLevel, SocketMetric, SystemSample,
};
use crate::sink::Sink;
use crate::sysinfo_repo::ResourceSampler;
use registry::MetricsRegistry;
use std::sync::Arc;
use tokio::time::{Duration, interval};

pub struct MetricEmitter {
    sink: Arc<dyn Sink>,
    registry: Arc<MetricsRegistry>,
    sampler: Arc<dyn ResourceSampler>,
}

impl MetricEmitter {
    pub fn new(
        sink: Arc<dyn Sink>,
        registry: Arc<MetricsRegistry>,
        sampler: Arc<dyn ResourceSampler>,
    ) -> Self {
        Self {
            sink,
            registry,
            sampler,
        }
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    pub fn record_http_request(&self, metric: HttpRequestMetric) {
        let status = metric.status_code.to_string();
        self.registry
            .http_requests_total
            .with_label_values(&[metric.method.as_str(), metric.route.as_str(), status.as_str()])
            .inc();
        self.registry
            .http_request_duration_seconds
            .with_label_values(&[metric.method.as_str(), metric.route.as_str()])
            .observe(metric.duration_ms / 1000.0);

        let level = match metric.status_code {
            500.. => RecordLevel::Error,
            400..=499 => RecordLevel::Warn,
            _ => RecordLevel::Info,
        };
        let message = format!(
            "{} {} {} {:.1}ms",
            metric.method, metric.route, metric.status_code, metric.duration_ms
        );
        self.sink.write(MetricRecord::new(
            MetricType::HttpRequest,
            level,
            message,
            &metric,
        ));
    }

    pub fn record_database_operation(&self, metric: DatabaseOperationMetric) {
        let success = if metric.success { "true" } else { "false" };
        self.registry
            .db_operations_total
            .with_label_values(&[metric.operation.as_str(), metric.collection.as_str(), success])
            .inc();
        self.registry
            .db_operation_duration_seconds
            .with_label_values(&[metric.operation.as_str(), metric.collection.as_str()])
            .observe(metric.duration_ms / 1000.0);

        let level = if metric.success {
            RecordLevel::Info
        } else {
            RecordLevel::Warn
        };
        let message = format!("db {} on {}", metric.operation, metric.collection);
        self.sink.write(MetricRecord::new(
            MetricType::DatabaseOperation,
            level,
            message,
            &metric,
        ));
    }

    pub fn record_business_metrics(&self, counts: &BusinessCounts) {
        for (entity, entity_counts) in &counts.0 {
            self.registry
                .business_entities
                .with_label_values(&[entity.as_str(), "total"])
                .set(entity_counts.total as i64);
            for (status, n) in &entity_counts.by_status {
                self.registry
                    .business_entities
                    .with_label_values(&[entity.as_str(), status.as_str()])
                    .set(*n as i64);
            }
        }
        self.sink.write(MetricRecord::new(
            MetricType::BusinessMetrics,
            RecordLevel::Info,
            "business metrics",
            counts,
        ));
    }

    pub fn record_socket_metrics(&self, metric: SocketMetric) {
        self.registry
            .socket_connections
            .set(metric.connected_clients as i64);
        self.registry
            .socket_events_total
            .with_label_values(&[metric.event.as_str()])
            .inc();
        let message = format!("socket {}", metric.event);
        self.sink.write(MetricRecord::new(
            MetricType::SocketEvent,
            RecordLevel::Info,
            message,
            &metric,
        ));
    }

    pub fn record_error(&self, metric: ErrorMetric) {
        self.registry
            .errors_total
            .with_label_values(&[metric.kind.as_str()])
            .inc();
        let message = format!("{}: {}", metric.kind, metric.message);
        self.sink.write(MetricRecord::new(
            MetricType::Error,
            RecordLevel::Error,
            message,
            &metric,
        ));
    }

    pub fn record_health(&self, snapshot: &HealthSnapshot) {
        for (name, check) in &snapshot.checks {
            self.registry
                .health_status
                .with_label_values(&[name.as_str()])
                .set(check.status.rank() as i64);
        }
        self.registry
            .health_status
            .with_label_values(&["overall"])
            .set(snapshot.overall_status.rank() as i64);

        let level = if snapshot.overall_status.is_healthy() {
            RecordLevel::Info
        } else {
            RecordLevel::Warn
        };
        let message = format!("health check {}", snapshot.overall_status);
        self.sink.write(MetricRecord::new(
            MetricType::HealthCheck,
            level,
            message,
            snapshot,
        ));
    }

    pub fn record_error_rate(&self, rate_percent: f64) {
        self.registry.error_rate_percent.set(rate_percent);
    }

    pub fn record_system_sample(&self, sample: &SystemSample) {
        self.registry
            .process_memory_bytes
            .set(sample.process_memory_bytes.min(i64::MAX as u64) as i64);
        let used = sample
            .system_total_memory_bytes
            .saturating_sub(sample.system_free_memory_bytes);
        if sample.system_total_memory_bytes > 0 {
            self.registry
                .system_memory_used_percent
                .set(used as f64 / sample.system_total_memory_bytes as f64 * 100.0);
        }
        self.registry
            .system_load_percent
            .set(checks::load_percent(sample));
        self.sink.write(MetricRecord::new(
            MetricType::SystemMetrics,
            RecordLevel::Info,
            "system metrics",
            sample,
        ));
    }

    /// Samples process and host resources and records them. Failures are logged.
    pub async fn collect_system_metrics(&self) {
        match self.sampler.sample().await {
            Ok(sample) => self.record_system_sample(&sample),
            Err(e) => tracing::warn!(
                error = %e,
                operation = "collect_system_metrics",
                "system metrics collection failed"
            ),
        }
    }
}

/// Collects system metrics on a fixed timer, independent of the scheduler's health checks.
pub fn spawn_system_metrics(
    emitter: Arc<MetricEmitter>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            emitter.collect_system_metrics().await;
        }
    })
}
