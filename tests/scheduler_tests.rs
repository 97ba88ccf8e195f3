// Scheduler: task isolation, idempotent start/stop, task bodies

mod common;

use adopte_monitor::models::{Alert, AlertKind, MetricRecord, MetricType, RecordLevel, Severity};
use adopte_monitor::scheduler::{
    MonitoringScheduler, SchedulerConfig, SchedulerDeps, TASK_DAILY_CLEANUP, run_business_metrics,
    run_daily_cleanup, run_health_check,
};
use adopte_monitor::sink::repo::RecordRepo;
use adopte_monitor::store::BusinessStatsSource;
use common::*;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

fn deps(
    h: &Harness,
    business: Arc<dyn BusinessStatsSource>,
    records: Option<Arc<RecordRepo>>,
) -> SchedulerDeps {
    SchedulerDeps {
        health: h.state.health.clone(),
        emitter: h.state.emitter.clone(),
        notifier: h.state.notifier.clone(),
        error_rate: h.state.error_rate.clone(),
        business,
        records,
        clock: h.clock.clone(),
    }
}

fn config() -> SchedulerConfig {
    SchedulerConfig {
        health_check_interval: Duration::from_secs(30),
        business_metrics_interval: Duration::from_secs(300),
        alert_check_interval: Duration::from_secs(60),
        cleanup_schedule: "0 0 2 * * *".into(),
    }
}

#[derive(Default)]
struct FailingBusiness {
    calls: AtomicU64,
}

#[async_trait::async_trait]
impl BusinessStatsSource for FailingBusiness {
    async fn business_counts(&self) -> anyhow::Result<adopte_monitor::models::BusinessCounts> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("aggregate query failed")
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_health_check_does_not_stop_business_task() {
    let store = Arc::new(FakeStore::panicking());
    let h = harness(store.clone(), Arc::new(FixedSampler(calm_sample())), vec![]);
    let business = Arc::new(CountingBusiness::default());
    let scheduler = MonitoringScheduler::new(deps(&h, business.clone(), None), config());

    scheduler.start();
    tokio::time::sleep(Duration::from_secs(901)).await;

    // Business ticks at 0, 300, 600 and 900 s.
    assert!(business.calls.load(Ordering::SeqCst) >= 4);
    // The health task kept its own schedule despite panicking every tick.
    assert!(store.pings.load(Ordering::SeqCst) >= 30);
    assert!(scheduler.is_running());
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn test_failing_business_task_keeps_its_schedule() {
    let h = harness(
        Arc::new(FakeStore::connected()),
        Arc::new(FixedSampler(calm_sample())),
        vec![],
    );
    let business = Arc::new(FailingBusiness::default());
    let scheduler = MonitoringScheduler::new(deps(&h, business.clone(), None), config());

    scheduler.start();
    tokio::time::sleep(Duration::from_secs(601)).await;

    assert!(business.calls.load(Ordering::SeqCst) >= 3);
    assert!(h.state.health.latest().is_some());
    let health_records = h
        .sink
        .records()
        .iter()
        .filter(|r| r.metric_type == MetricType::HealthCheck)
        .count();
    assert!(health_records >= 20);
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent_and_stop_cancels() {
    let h = harness(
        Arc::new(FakeStore::connected()),
        Arc::new(FixedSampler(calm_sample())),
        vec![],
    );
    let business = Arc::new(CountingBusiness::default());
    let scheduler = MonitoringScheduler::new(deps(&h, business.clone(), None), config());

    scheduler.start();
    scheduler.start();
    assert_eq!(scheduler.task_names().len(), 4);
    assert!(scheduler.task_names().contains(&TASK_DAILY_CLEANUP));

    tokio::time::sleep(Duration::from_secs(1)).await;
    scheduler.stop();
    assert!(!scheduler.is_running());
    let calls = business.calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(1200)).await;
    assert_eq!(business.calls.load(Ordering::SeqCst), calls);

    // Restart after stop works.
    scheduler.start();
    assert!(scheduler.is_running());
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn test_invalid_cleanup_schedule_skips_only_cleanup() {
    let h = harness(
        Arc::new(FakeStore::connected()),
        Arc::new(FixedSampler(calm_sample())),
        vec![],
    );
    let mut config = config();
    config.cleanup_schedule = "every night".into();
    let scheduler = MonitoringScheduler::new(
        deps(&h, Arc::new(CountingBusiness::default()), None),
        config,
    );
    scheduler.start();
    assert_eq!(scheduler.task_names().len(), 3);
    assert!(!scheduler.task_names().contains(&TASK_DAILY_CLEANUP));
    scheduler.stop();
}

#[tokio::test]
async fn test_health_task_feeds_emitter_and_notifier() {
    let store = Arc::new(FakeStore::connected());
    store.set_connected(false);
    let h = harness(store, Arc::new(FixedSampler(calm_sample())), vec![]);
    let d = deps(&h, Arc::new(CountingBusiness::default()), None);

    run_health_check(d).await.unwrap();

    assert!(
        h.sink
            .records()
            .iter()
            .any(|r| r.metric_type == MetricType::HealthCheck && r.level == RecordLevel::Warn)
    );
    assert_eq!(h.channel.count_kind(AlertKind::Database), 1);
    assert_eq!(
        h.registry
            .health_status
            .with_label_values(&["database"])
            .get(),
        2
    );
}

#[tokio::test]
async fn test_business_task_sets_gauges() {
    let h = harness(
        Arc::new(FakeStore::connected()),
        Arc::new(FixedSampler(calm_sample())),
        vec![],
    );
    run_business_metrics(deps(&h, Arc::new(CountingBusiness::default()), None))
        .await
        .unwrap();
    let gauge = &h.registry.business_entities;
    assert_eq!(gauge.with_label_values(&["users", "total"]).get(), 2);
    assert_eq!(gauge.with_label_values(&["users", "student"]).get(), 2);
}

#[tokio::test]
async fn test_daily_cleanup_prunes_records_and_evicts_history() {
    let h = harness(
        Arc::new(FakeStore::connected()),
        Arc::new(FixedSampler(calm_sample())),
        vec![],
    );
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let repo = Arc::new(RecordRepo::new(pool, 14));
    repo.init().await.unwrap();

    let mut old = MetricRecord::new(
        MetricType::Error,
        RecordLevel::Error,
        "old",
        &serde_json::json!({}),
    );
    old.timestamp = chrono::DateTime::from_timestamp_millis(START_MS - 30 * 86_400_000).unwrap();
    let mut recent = old.clone();
    recent.timestamp = chrono::DateTime::from_timestamp_millis(START_MS).unwrap();
    repo.save_records(&[old, recent]).await.unwrap();

    h.state
        .notifier
        .send_alert(Alert::new(AlertKind::Test, Severity::Info, "t", "d"))
        .await;
    h.clock.advance(Duration::from_secs(31 * 60));

    run_daily_cleanup(deps(
        &h,
        Arc::new(CountingBusiness::default()),
        Some(repo.clone()),
    ))
    .await
    .unwrap();

    assert_eq!(repo.count().await.unwrap(), 1);
    assert_eq!(h.state.notifier.history_len(), 0);
}
