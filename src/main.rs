use adopte_monitor::*;
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    let clock: Arc<dyn clock::Clock> = Arc::new(clock::SystemClock);

    let store = Arc::new(store::Store::connect(&app_config.database.path).await?);
    let record_repo = Arc::new(sink::repo::RecordRepo::new(
        store.pool().clone(),
        app_config.database.retention_days,
    ));
    record_repo.init().await?;

    let registry = Arc::new(metrics::registry::MetricsRegistry::new()?);

    // Sinks: channel into the metric_records writer, optionally mirrored to tracing.
    let (record_tx, record_rx) = tokio::sync::mpsc::channel(app_config.sink.channel_capacity);
    let writer_handle = sink::spawn_record_writer(
        record_rx,
        record_repo.clone(),
        sink::RecordWriterConfig {
            flush_rate: app_config.sink.flush_rate,
            flush_interval_secs: app_config.sink.flush_interval_secs,
        },
        registry.records_saved_total.clone(),
    );
    let mut sinks: Vec<Arc<dyn sink::Sink>> = vec![Arc::new(sink::ChannelSink::new(record_tx))];
    if app_config.sink.tracing {
        sinks.push(Arc::new(sink::TracingSink));
    }
    let sink: Arc<dyn sink::Sink> = Arc::new(sink::FanoutSink::new(sinks));

    let sampler: Arc<dyn sysinfo_repo::ResourceSampler> = Arc::new(
        sysinfo_repo::SysinfoRepo::new(app_config.memory.process_limit_mb),
    );
    let emitter = Arc::new(metrics::MetricEmitter::new(
        sink,
        registry.clone(),
        sampler.clone(),
    ));
    let system_metrics_handle = metrics::spawn_system_metrics(
        emitter.clone(),
        Duration::from_secs(app_config.monitoring.system_metrics_interval_secs),
    );

    let mut service_paths = vec![PathBuf::from(&app_config.services.upload_dir)];
    service_paths.extend(app_config.services.extra_paths.iter().map(PathBuf::from));
    let health = Arc::new(health::HealthAggregator::new(
        store.clone(),
        sampler,
        service_paths,
        health::HealthTimeouts {
            health: Duration::from_secs(app_config.monitoring.health_timeout_secs),
            readiness: Duration::from_secs(app_config.monitoring.readiness_timeout_secs),
        },
    ));

    let channels = alerting::channels_from_config(&app_config.notifications);
    if channels.is_empty() {
        tracing::info!("no notification channel configured; alerts are logged only");
    }
    let notifier = Arc::new(
        alerting::AlertNotifier::new(
            clock.clone(),
            app_config.thresholds.clone(),
            app_config.throttle.clone(),
            channels,
        )
        .with_registry(registry),
    );
    let error_rate = Arc::new(error_rate::ErrorRateTracker::new(
        clock.clone(),
        Duration::from_secs(app_config.monitoring.error_window_secs),
    ));

    let scheduler = scheduler::MonitoringScheduler::new(
        scheduler::SchedulerDeps {
            health: health.clone(),
            emitter: emitter.clone(),
            notifier: notifier.clone(),
            error_rate: error_rate.clone(),
            business: store.clone(),
            records: Some(record_repo),
            clock,
        },
        scheduler::SchedulerConfig::from_monitoring(&app_config.monitoring),
    );
    scheduler.start();

    let app = routes::app(routes::AppState {
        health,
        emitter,
        notifier,
        error_rate,
    });
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Server stopped, shutting down monitoring");

    scheduler.stop();
    drop(scheduler);
    system_metrics_handle.abort();
    let _ = system_metrics_handle.await;
    // The writer drains once the last sink sender is gone.
    if tokio::time::timeout(Duration::from_secs(5), writer_handle)
        .await
        .is_err()
    {
        tracing::warn!("record writer did not drain within 5s; pending records dropped");
    }
    store.close().await;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("Received shutdown signal");
}
