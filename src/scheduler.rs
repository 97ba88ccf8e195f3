// Monitoring scheduler: four independently timed tasks (health check, business metrics,
// alert evaluation, daily cleanup). A failing or panicking tick is logged and the task
// keeps its schedule; other tasks are unaffected.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::alerting::AlertNotifier;
use crate::clock::Clock;
use crate::config::MonitoringConfig;
use crate::error_rate::ErrorRateTracker;
use crate::health::HealthAggregator;
use crate::metrics::MetricEmitter;
use crate::sink::repo::RecordRepo;
use crate::store::BusinessStatsSource;

pub const TASK_HEALTH_CHECK: &str = "health_check";
pub const TASK_BUSINESS_METRICS: &str = "business_metrics";
pub const TASK_ALERT_CHECK: &str = "alert_check";
pub const TASK_DAILY_CLEANUP: &str = "daily_cleanup";

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub health_check_interval: Duration,
    pub business_metrics_interval: Duration,
    pub alert_check_interval: Duration,
    /// Cron expression in local time.
    pub cleanup_schedule: String,
}

impl SchedulerConfig {
    pub fn from_monitoring(config: &MonitoringConfig) -> Self {
        Self {
            health_check_interval: Duration::from_secs(config.health_check_interval_secs),
            business_metrics_interval: Duration::from_secs(config.business_metrics_interval_secs),
            alert_check_interval: Duration::from_secs(config.alert_check_interval_secs),
            cleanup_schedule: config.cleanup_schedule.clone(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_monitoring(&MonitoringConfig::default())
    }
}

/// Everything the tasks touch. Built once by the composition root.
#[derive(Clone)]
pub struct SchedulerDeps {
    pub health: Arc<HealthAggregator>,
    pub emitter: Arc<MetricEmitter>,
    pub notifier: Arc<AlertNotifier>,
    pub error_rate: Arc<ErrorRateTracker>,
    pub business: Arc<dyn BusinessStatsSource>,
    /// Stored metric records to prune and vacuum; `None` when records are not persisted.
    pub records: Option<Arc<RecordRepo>>,
    pub clock: Arc<dyn Clock>,
}

pub struct ScheduledTask {
    pub name: &'static str,
    handle: JoinHandle<()>,
}

pub struct MonitoringScheduler {
    deps: SchedulerDeps,
    config: SchedulerConfig,
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl MonitoringScheduler {
    pub fn new(deps: SchedulerDeps, config: SchedulerConfig) -> Self {
        Self {
            deps,
            config,
            tasks: Mutex::new(Vec::new()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<ScheduledTask>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        !self.tasks().is_empty()
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks().iter().map(|t| t.name).collect()
    }

    /// Spawns all tasks. A second call while running only logs a warning.
    pub fn start(&self) {
        let mut tasks = self.tasks();
        if !tasks.is_empty() {
            warn!("monitoring scheduler already running");
            return;
        }

        let deps = self.deps.clone();
        tasks.push(spawn_interval(
            TASK_HEALTH_CHECK,
            self.config.health_check_interval,
            move || run_health_check(deps.clone()),
        ));

        let deps = self.deps.clone();
        tasks.push(spawn_interval(
            TASK_BUSINESS_METRICS,
            self.config.business_metrics_interval,
            move || run_business_metrics(deps.clone()),
        ));

        let deps = self.deps.clone();
        tasks.push(spawn_interval(
            TASK_ALERT_CHECK,
            self.config.alert_check_interval,
            move || run_alert_check(deps.clone()),
        ));

        match cron::Schedule::from_str(&self.config.cleanup_schedule) {
            Ok(schedule) => {
                let deps = self.deps.clone();
                tasks.push(spawn_cron(TASK_DAILY_CLEANUP, schedule, move || {
                    run_daily_cleanup(deps.clone())
                }));
            }
            Err(e) => {
                warn!(cron = %self.config.cleanup_schedule, error = %e, "invalid cleanup_schedule; cleanup will not run");
            }
        }

        info!(
            tasks = tasks.len(),
            health_secs = self.config.health_check_interval.as_secs(),
            business_secs = self.config.business_metrics_interval.as_secs(),
            alert_secs = self.config.alert_check_interval.as_secs(),
            "monitoring scheduler started"
        );
    }

    /// Cancels every task. Safe to call when not running.
    pub fn stop(&self) {
        let mut tasks = self.tasks();
        if tasks.is_empty() {
            return;
        }
        for task in tasks.drain(..) {
            task.handle.abort();
        }
        info!("monitoring scheduler stopped");
    }
}

impl Drop for MonitoringScheduler {
    fn drop(&mut self) {
        for task in self.tasks().drain(..) {
            task.handle.abort();
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Runs one tick body; errors and panics are logged with the task name and swallowed.
pub async fn run_guarded<Fut>(name: &'static str, body: Fut)
where
    Fut: Future<Output = anyhow::Result<()>>,
{
    match AssertUnwindSafe(body).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(task = name, error = %e, "scheduled task failed"),
        Err(panic) => error!(
            task = name,
            panic = %panic_message(panic.as_ref()),
            "scheduled task panicked"
        ),
    }
}

fn spawn_interval<F, Fut>(name: &'static str, every: Duration, body: F) -> ScheduledTask
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        let mut tick = tokio::time::interval(every);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            run_guarded(name, body()).await;
        }
    });
    ScheduledTask { name, handle }
}

/// Sleeps until each next fire time of `schedule` (local time) and runs `body`.
fn spawn_cron<F, Fut>(name: &'static str, schedule: cron::Schedule, body: F) -> ScheduledTask
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        loop {
            let now = chrono::Local::now();
            let Some(next) = schedule.after(&now).next() else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                continue;
            };
            let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
            tokio::time::sleep(delay).await;
            run_guarded(name, body()).await;
        }
    });
    ScheduledTask { name, handle }
}

/// Health snapshot -> emitter -> threshold check.
pub async fn run_health_check(deps: SchedulerDeps) -> anyhow::Result<()> {
    let snapshot = deps.health.check_health().await;
    deps.emitter.record_health(&snapshot);
    deps.notifier.check_and_alert(&snapshot).await;
    Ok(())
}

pub async fn run_business_metrics(deps: SchedulerDeps) -> anyhow::Result<()> {
    let counts = deps.business.business_counts().await?;
    deps.emitter.record_business_metrics(&counts);
    Ok(())
}

/// Current error rate plus the latest health snapshot, if any, against the thresholds.
pub async fn run_alert_check(deps: SchedulerDeps) -> anyhow::Result<()> {
    let rate = deps.error_rate.error_rate();
    deps.emitter.record_error_rate(rate);
    deps.notifier.check_error_rate(rate).await;
    if let Some(snapshot) = deps.health.latest() {
        deps.notifier.check_and_alert(&snapshot).await;
    }
    Ok(())
}

pub async fn run_daily_cleanup(deps: SchedulerDeps) -> anyhow::Result<()> {
    let now = deps.clock.now_ms();
    let evicted = deps.notifier.evict_stale(now);
    let mut pruned = 0;
    if let Some(records) = &deps.records {
        pruned = records.prune_old_records(now).await?;
        records.vacuum().await?;
    }
    info!(
        pruned_records = pruned,
        evicted_alert_keys = evicted,
        "daily cleanup complete"
    );
    Ok(())
}
