// Alert throttle & notifier: threshold evaluation, per (type, severity) throttling and
// fan-out to every configured channel. Nothing here returns an error to the caller.

pub mod channels;

pub use channels::{NotificationChannel, NotifyError, channels_from_config};

use crate::clock::Clock;
use crate::config::{ThresholdPair, ThresholdsConfig, ThrottleConfig};
use crate::metrics::registry::MetricsRegistry;
use crate::models::{
    Alert, AlertKind, CHECK_DATABASE, CHECK_MEMORY, CHECK_SERVICES, CHECK_SYSTEM, HealthSnapshot,
    HealthStatus, Severity,
};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertStats {
    /// Alerts that passed the throttle and were handed to the channels.
    pub sent: u64,
    pub throttled: u64,
    /// Individual channel deliveries that failed.
    pub failed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Throttled,
    Dispatched { delivered: usize, failed: usize },
}

pub struct AlertNotifier {
    clock: Arc<dyn Clock>,
    thresholds: ThresholdsConfig,
    throttle: ThrottleConfig,
    channels: Vec<Arc<dyn NotificationChannel>>,
    /// Throttle key -> last dispatch time (ms).
    history: Mutex<HashMap<String, i64>>,
    sent: AtomicU64,
    throttled: AtomicU64,
    failed: AtomicU64,
    registry: Option<Arc<MetricsRegistry>>,
}

impl AlertNotifier {
    pub fn new(
        clock: Arc<dyn Clock>,
        thresholds: ThresholdsConfig,
        throttle: ThrottleConfig,
        channels: Vec<Arc<dyn NotificationChannel>>,
    ) -> Self {
        Self {
            clock,
            thresholds,
            throttle,
            channels,
            history: Mutex::new(HashMap::new()),
            sent: AtomicU64::new(0),
            throttled: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            registry: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<MetricsRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    fn history(&self) -> MutexGuard<'_, HashMap<String, i64>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn count(&self, alert: &Alert, outcome: &str, n: u64) {
        if let Some(registry) = &self.registry {
            registry
                .alerts_total
                .with_label_values(&[alert.kind.as_str(), alert.severity.as_str(), outcome])
                .inc_by(n);
        }
    }

    /// Dispatches `alert` unless the same (type, severity) was dispatched within its
    /// throttle window. The history entry is written before any delivery is attempted.
    pub async fn send_alert(&self, alert: Alert) -> SendOutcome {
        let key = alert.throttle_key();
        let now = self.clock.now_ms();
        let window = self.throttle.window_ms(alert.severity);
        {
            let mut history = self.history();
            if history.get(&key).is_some_and(|&last| now - last < window) {
                drop(history);
                tracing::debug!(key = %key, title = %alert.title, "alert throttled");
                self.throttled.fetch_add(1, Ordering::Relaxed);
                self.count(&alert, "throttled", 1);
                return SendOutcome::Throttled;
            }
            history.insert(key.clone(), now);
        }

        self.sent.fetch_add(1, Ordering::Relaxed);
        self.count(&alert, "sent", 1);
        tracing::info!(
            key = %key,
            severity = %alert.severity,
            title = %alert.title,
            description = %alert.description,
            channels = self.channels.len(),
            "alert dispatched"
        );

        let results = join_all(self.channels.iter().map(|channel| {
            let alert = &alert;
            async move { (channel.name().to_string(), channel.send(alert).await) }
        }))
        .await;

        let mut failed = 0;
        for (name, result) in &results {
            if let Err(e) = result {
                failed += 1;
                tracing::warn!(channel = %name, key = %key, error = %e, "alert delivery failed");
            }
        }
        if failed > 0 {
            self.failed.fetch_add(failed as u64, Ordering::Relaxed);
            self.count(&alert, "failed", failed as u64);
        }
        SendOutcome::Dispatched {
            delivered: results.len() - failed,
            failed,
        }
    }

    async fn alert_on_threshold(
        &self,
        kind: AlertKind,
        pair: ThresholdPair,
        value: f64,
        title: &str,
        unit: &str,
        extra: Option<(&str, serde_json::Value)>,
    ) {
        let Some(severity) = pair.evaluate(value) else {
            return;
        };
        let cutoff = match severity {
            Severity::Critical => pair.critical,
            _ => pair.warning,
        };
        let mut alert = Alert::new(
            kind,
            severity,
            title,
            format!("{} is {}{} (threshold {}{})", title, value, unit, cutoff, unit),
        )
        .with_metric("value", value)
        .with_metric("threshold", cutoff);
        if let Some((key, extra)) = extra {
            alert = alert.with_metric(key, extra);
        }
        self.send_alert(alert).await;
    }

    /// Evaluates every metric family present in `snapshot` independently.
    pub async fn check_and_alert(&self, snapshot: &HealthSnapshot) {
        self.alert_on_threshold(
            AlertKind::ResponseTime,
            self.thresholds.response_time,
            snapshot.response_time_ms as f64,
            "Health check response time",
            "ms",
            None,
        )
        .await;

        // Process budget and host memory both count; the higher one is evaluated.
        if let Some(memory) = snapshot.check(CHECK_MEMORY) {
            let heap = memory.metric_f64("heapUsedPercent");
            let system = memory.metric_f64("systemUsedPercent");
            let worst = match (heap, system) {
                (Some(h), Some(s)) if s > h => Some((s, "system")),
                (Some(h), _) => Some((h, "process")),
                (None, Some(s)) => Some((s, "system")),
                (None, None) => None,
            };
            if let Some((value, source)) = worst {
                self.alert_on_threshold(
                    AlertKind::Memory,
                    self.thresholds.memory_usage,
                    value,
                    "Memory usage",
                    "%",
                    Some(("source", source.into())),
                )
                .await;
            }
        }

        if let Some(load) = snapshot
            .check(CHECK_SYSTEM)
            .and_then(|c| c.metric_f64("loadPercent"))
        {
            self.alert_on_threshold(
                AlertKind::CpuLoad,
                self.thresholds.cpu_load,
                load,
                "CPU load",
                "%",
                None,
            )
            .await;
        }

        if let Some(database) = snapshot.check(CHECK_DATABASE) {
            if matches!(
                database.status,
                HealthStatus::Unhealthy | HealthStatus::Critical
            ) {
                let alert = Alert::new(
                    AlertKind::Database,
                    Severity::Critical,
                    "Database unhealthy",
                    database.message.clone(),
                )
                .with_metric("status", database.status.as_str());
                self.send_alert(alert).await;
            } else if let Some(ms) = database.response_time_ms {
                self.alert_on_threshold(
                    AlertKind::DatabaseResponseTime,
                    self.thresholds.database_response_time,
                    ms as f64,
                    "Database response time",
                    "ms",
                    None,
                )
                .await;
            }
        }

        if let Some(services) = snapshot.check(CHECK_SERVICES)
            && !services.status.is_healthy()
        {
            let alert = Alert::new(
                AlertKind::Services,
                Severity::Warning,
                "Local services unavailable",
                services.message.clone(),
            );
            self.send_alert(alert).await;
        }
    }

    pub async fn check_error_rate(&self, rate_percent: f64) {
        self.alert_on_threshold(
            AlertKind::ErrorRate,
            self.thresholds.error_rate,
            rate_percent,
            "Error rate",
            "%",
            None,
        )
        .await;
    }

    /// Per-request slow response check.
    pub async fn check_response_time(&self, duration_ms: f64, route: &str) {
        self.alert_on_threshold(
            AlertKind::ResponseTime,
            self.thresholds.response_time,
            duration_ms.round(),
            "Response time",
            "ms",
            Some(("route", route.into())),
        )
        .await;
    }

    pub async fn send_test_alert(&self) -> SendOutcome {
        let alert = Alert::new(
            AlertKind::Test,
            Severity::Info,
            "Test alert",
            "Synthetic alert triggered from the monitoring endpoint",
        );
        self.send_alert(alert).await
    }

    /// Drops history entries older than the longest throttle window; they can no longer
    /// throttle anything. Returns how many were removed.
    pub fn evict_stale(&self, now_ms: i64) -> usize {
        let longest = self.throttle.longest_window_ms();
        let mut history = self.history();
        let before = history.len();
        history.retain(|_, last| now_ms - *last < longest);
        before - history.len()
    }

    pub fn history_len(&self) -> usize {
        self.history().len()
    }

    pub fn stats(&self) -> AlertStats {
        AlertStats {
            sent: self.sent.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
