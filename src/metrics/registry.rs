// Pull-based metrics: prometheus registry, text exposition and a JSON view of the gathered families.

use prometheus::proto::{MetricFamily, MetricType as ProtoMetricType};
use prometheus::{
    Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use serde::Serialize;
use std::collections::BTreeMap;

const NAMESPACE: &str = "adopte";

const HTTP_BUCKETS: &[f64] = &[0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
const DB_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0];

pub struct MetricsRegistry {
    registry: Registry,
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
    pub db_operations_total: IntCounterVec,
    pub db_operation_duration_seconds: HistogramVec,
    pub business_entities: IntGaugeVec,
    pub socket_connections: IntGauge,
    pub socket_events_total: IntCounterVec,
    pub errors_total: IntCounterVec,
    pub process_memory_bytes: IntGauge,
    pub system_memory_used_percent: Gauge,
    pub system_load_percent: Gauge,
    pub error_rate_percent: Gauge,
    /// 0 healthy, 1 warning/degraded, 2 unhealthy, 3 critical.
    pub health_status: IntGaugeVec,
    pub alerts_total: IntCounterVec,
    /// Metric records persisted by the record writer.
    pub records_saved_total: IntCounter,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Completed HTTP requests").namespace(NAMESPACE),
            &["method", "route", "status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request duration")
                .namespace(NAMESPACE)
                .buckets(HTTP_BUCKETS.to_vec()),
            &["method", "route"],
        )?;
        let db_operations_total = IntCounterVec::new(
            Opts::new("db_operations_total", "Store operations").namespace(NAMESPACE),
            &["operation", "collection", "success"],
        )?;
        let db_operation_duration_seconds = HistogramVec::new(
            HistogramOpts::new("db_operation_duration_seconds", "Store operation duration")
                .namespace(NAMESPACE)
                .buckets(DB_BUCKETS.to_vec()),
            &["operation", "collection"],
        )?;
        let business_entities = IntGaugeVec::new(
            Opts::new("business_entities", "Business entity counts by status")
                .namespace(NAMESPACE),
            &["entity", "status"],
        )?;
        let socket_connections = IntGauge::with_opts(
            Opts::new("socket_connections", "Connected socket clients").namespace(NAMESPACE),
        )?;
        let socket_events_total = IntCounterVec::new(
            Opts::new("socket_events_total", "Socket events").namespace(NAMESPACE),
            &["event"],
        )?;
        let errors_total = IntCounterVec::new(
            Opts::new("errors_total", "Recorded application errors").namespace(NAMESPACE),
            &["kind"],
        )?;
        let process_memory_bytes = IntGauge::with_opts(
            Opts::new("process_memory_bytes", "Resident memory of the process")
                .namespace(NAMESPACE),
        )?;
        let system_memory_used_percent = Gauge::with_opts(
            Opts::new("system_memory_used_percent", "Host memory in use").namespace(NAMESPACE),
        )?;
        let system_load_percent = Gauge::with_opts(
            Opts::new("system_load_percent", "1-minute load over core count")
                .namespace(NAMESPACE),
        )?;
        let error_rate_percent = Gauge::with_opts(
            Opts::new("error_rate_percent", "Failed requests in the current window")
                .namespace(NAMESPACE),
        )?;
        let health_status = IntGaugeVec::new(
            Opts::new("health_status", "Health check status rank").namespace(NAMESPACE),
            &["check"],
        )?;
        let alerts_total = IntCounterVec::new(
            Opts::new("alerts_total", "Alerts by outcome").namespace(NAMESPACE),
            &["type", "severity", "outcome"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(db_operations_total.clone()))?;
        registry.register(Box::new(db_operation_duration_seconds.clone()))?;
        registry.register(Box::new(business_entities.clone()))?;
        registry.register(Box::new(socket_connections.clone()))?;
        registry.register(Box::new(socket_events_total.clone()))?;
        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(process_memory_bytes.clone()))?;
        registry.register(Box::new(system_memory_used_percent.clone()))?;
        registry.register(Box::new(system_load_percent.clone()))?;
        registry.register(Box::new(error_rate_percent.clone()))?;
        registry.register(Box::new(health_status.clone()))?;
        let records_saved_total = IntCounter::with_opts(
            Opts::new("records_saved_total", "Metric records written to the store")
                .namespace(NAMESPACE),
        )?;

        registry.register(Box::new(alerts_total.clone()))?;
        registry.register(Box::new(records_saved_total.clone()))?;

        Ok(Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            db_operations_total,
            db_operation_duration_seconds,
            business_entities,
            socket_connections,
            socket_events_total,
            errors_total,
            process_memory_bytes,
            system_memory_used_percent,
            system_load_percent,
            error_rate_percent,
            health_status,
            alerts_total,
            records_saved_total,
        })
    }

    /// Text exposition format for scraping.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Gathered families reshaped for the JSON endpoint.
    pub fn summaries(&self) -> Vec<MetricSummary> {
        self.registry.gather().iter().map(summarize).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub help: String,
    #[serde(rename = "type")]
    pub metric_type: String,
    pub values: Vec<MetricValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    /// Sample name; differs from the family name for histogram `_bucket`/`_sum`/`_count`.
    pub metric_name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

fn type_name(kind: ProtoMetricType) -> &'static str {
    match kind {
        ProtoMetricType::COUNTER => "counter",
        ProtoMetricType::GAUGE => "gauge",
        ProtoMetricType::HISTOGRAM => "histogram",
        ProtoMetricType::SUMMARY => "summary",
        ProtoMetricType::UNTYPED => "untyped",
    }
}

fn summarize(family: &MetricFamily) -> MetricSummary {
    let name = family.name();
    let kind = family.type_();
    let mut values = Vec::new();

    for metric in family.get_metric() {
        let labels: BTreeMap<String, String> = metric
            .get_label()
            .iter()
            .map(|pair| (pair.name().to_string(), pair.value().to_string()))
            .collect();
        let sample = |suffix: &str, labels: BTreeMap<String, String>, value: f64| MetricValue {
            metric_name: format!("{}{}", name, suffix),
            labels,
            value,
        };

        match kind {
            ProtoMetricType::COUNTER => {
                values.push(sample("", labels, metric.get_counter().value()));
            }
            ProtoMetricType::GAUGE => {
                values.push(sample("", labels, metric.get_gauge().value()));
            }
            ProtoMetricType::HISTOGRAM => {
                let histogram = metric.get_histogram();
                for bucket in histogram.get_bucket() {
                    let mut with_le = labels.clone();
                    with_le.insert("le".into(), bucket.upper_bound().to_string());
                    values.push(sample("_bucket", with_le, bucket.cumulative_count() as f64));
                }
                let mut with_le = labels.clone();
                with_le.insert("le".into(), "+Inf".into());
                values.push(sample(
                    "_bucket",
                    with_le,
                    histogram.sample_count() as f64,
                ));
                values.push(sample("_sum", labels.clone(), histogram.sample_sum()));
                values.push(sample("_count", labels, histogram.sample_count() as f64));
            }
            // Not registered here.
            ProtoMetricType::SUMMARY | ProtoMetricType::UNTYPED => {}
        }
    }

    MetricSummary {
        name: name.to_string(),
        help: family.help().to_string(),
        metric_type: type_name(kind).to_string(),
        values,
    }
}
