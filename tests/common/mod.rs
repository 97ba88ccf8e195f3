// Shared test doubles and builders
#![allow(dead_code)]

use adopte_monitor::alerting::{AlertNotifier, NotificationChannel, NotifyError};
use adopte_monitor::clock::ManualClock;
use adopte_monitor::config::{ThresholdsConfig, ThrottleConfig};
use adopte_monitor::error_rate::ErrorRateTracker;
use adopte_monitor::health::{HealthAggregator, HealthTimeouts};
use adopte_monitor::metrics::MetricEmitter;
use adopte_monitor::metrics::registry::MetricsRegistry;
use adopte_monitor::models::*;
use adopte_monitor::routes::AppState;
use adopte_monitor::sink::Sink;
use adopte_monitor::store::{BusinessStatsSource, ConnectionState, StoreHealth, StoreStats};
use adopte_monitor::sysinfo_repo::ResourceSampler;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const START_MS: i64 = 1_700_000_000_000;

#[derive(Default)]
pub struct FakeStore {
    disconnected: AtomicBool,
    pub hang: bool,
    pub panic_on_ping: bool,
    pub pings: AtomicU64,
}

impl FakeStore {
    pub fn connected() -> Self {
        Self::default()
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic_on_ping: true,
            ..Self::default()
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.disconnected.store(!connected, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl StoreHealth for FakeStore {
    fn connection_state(&self) -> ConnectionState {
        if self.disconnected.load(Ordering::SeqCst) {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Connected
        }
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_ping {
            panic!("store driver blew up");
        }
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(())
    }

    async fn stats(&self) -> anyhow::Result<StoreStats> {
        Ok(StoreStats {
            collections: 4,
            indexes: 6,
            data_size_bytes: 2 * 1024 * 1024,
            storage_size_bytes: 3 * 1024 * 1024,
        })
    }
}

#[derive(Default)]
pub struct CountingBusiness {
    pub calls: AtomicU64,
}

#[async_trait::async_trait]
impl BusinessStatsSource for CountingBusiness {
    async fn business_counts(&self) -> anyhow::Result<BusinessCounts> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut counts = BusinessCounts::default();
        counts.0.insert(
            "users".into(),
            EntityCounts {
                total: 2,
                by_status: BTreeMap::from([("student".to_string(), 2)]),
            },
        );
        Ok(counts)
    }
}

pub struct FixedSampler(pub SystemSample);

#[async_trait::async_trait]
impl ResourceSampler for FixedSampler {
    async fn sample(&self) -> anyhow::Result<SystemSample> {
        Ok(self.0.clone())
    }
}

pub struct FailingSampler;

#[async_trait::async_trait]
impl ResourceSampler for FailingSampler {
    async fn sample(&self) -> anyhow::Result<SystemSample> {
        anyhow::bail!("sysinfo unavailable")
    }
}

const MB: u64 = 1024 * 1024;

/// Process at `heap_percent` of a 100 MB budget; host memory and load well below cutoffs.
pub fn sample_with_heap(heap_percent: u64) -> SystemSample {
    SystemSample {
        process_memory_bytes: heap_percent * MB,
        process_memory_limit_bytes: 100 * MB,
        system_total_memory_bytes: 1000 * MB,
        system_free_memory_bytes: 800 * MB,
        load_one: 0.4,
        cpu_count: 4,
        ..Default::default()
    }
}

pub fn calm_sample() -> SystemSample {
    sample_with_heap(10)
}

#[derive(Default)]
pub struct RecordingChannel {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingChannel {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn count_kind(&self, kind: AlertKind) -> usize {
        self.alerts().iter().filter(|a| a.kind == kind).count()
    }
}

#[async_trait::async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub struct FailingChannel;

#[async_trait::async_trait]
impl NotificationChannel for FailingChannel {
    async fn send(&self, _alert: &Alert) -> Result<(), NotifyError> {
        Err(NotifyError::Status(500))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<MetricRecord>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<MetricRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl Sink for MemorySink {
    fn write(&self, record: MetricRecord) {
        self.records.lock().unwrap().push(record);
    }
}

pub fn short_timeouts() -> HealthTimeouts {
    HealthTimeouts {
        health: Duration::from_secs(1),
        readiness: Duration::from_secs(1),
    }
}

pub fn snapshot_with(checks: Vec<(&str, CheckResult)>, response_time_ms: u64) -> HealthSnapshot {
    let checks: BTreeMap<String, CheckResult> = checks
        .into_iter()
        .map(|(name, check)| (name.to_string(), check))
        .collect();
    HealthSnapshot {
        timestamp: chrono::Utc::now(),
        overall_status: HealthStatus::worst(checks.values().map(|c| c.status)),
        response_time_ms,
        uptime_secs: 1,
        version: "test".into(),
        checks,
    }
}

pub fn notifier_with(
    clock: Arc<ManualClock>,
    channels: Vec<Arc<dyn NotificationChannel>>,
) -> AlertNotifier {
    AlertNotifier::new(
        clock,
        ThresholdsConfig::default(),
        ThrottleConfig::default(),
        channels,
    )
}

/// Fully wired core around fakes, driven by a manual clock.
pub struct Harness {
    pub state: AppState,
    pub store: Arc<FakeStore>,
    pub clock: Arc<ManualClock>,
    pub sink: Arc<MemorySink>,
    pub channel: Arc<RecordingChannel>,
    pub registry: Arc<MetricsRegistry>,
}

pub fn harness(
    store: Arc<FakeStore>,
    sampler: Arc<dyn ResourceSampler>,
    service_paths: Vec<PathBuf>,
) -> Harness {
    let clock = Arc::new(ManualClock::new(START_MS));
    let sink = Arc::new(MemorySink::default());
    let channel = Arc::new(RecordingChannel::default());
    let registry = Arc::new(MetricsRegistry::new().unwrap());

    let emitter = Arc::new(MetricEmitter::new(
        sink.clone(),
        registry.clone(),
        sampler.clone(),
    ));
    let health = Arc::new(HealthAggregator::new(
        store.clone(),
        sampler,
        service_paths,
        short_timeouts(),
    ));
    let channels: Vec<Arc<dyn NotificationChannel>> = vec![channel.clone()];
    let notifier = Arc::new(notifier_with(clock.clone(), channels).with_registry(registry.clone()));
    let error_rate = Arc::new(ErrorRateTracker::new(
        clock.clone(),
        Duration::from_secs(300),
    ));

    Harness {
        state: AppState {
            health,
            emitter,
            notifier,
            error_rate,
        },
        store,
        clock,
        sink,
        channel,
        registry,
    }
}
