// Log sink: where metric records go. Writes are fire-and-forget and never fail to the caller.
// ChannelSink hands records to a dedicated writer task (channel) that batches them into SQLite.

pub mod repo;

use crate::models::{MetricRecord, RecordLevel};
use prometheus::IntCounter;
use repo::RecordRepo;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, interval};

/// Rate limit for "sink full" warnings.
const DROP_WARN_INTERVAL: Duration = Duration::from_secs(60);

pub trait Sink: Send + Sync {
    /// Non-blocking; failures are logged by the sink, never returned.
    fn write(&self, record: MetricRecord);
}

/// Emits every record as a structured tracing event on the `metrics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn write(&self, record: MetricRecord) {
        let metric_type = record.metric_type.as_str();
        let payload = record.payload.to_string();
        match record.level {
            RecordLevel::Info => {
                tracing::info!(target: "metrics", metric_type, payload = %payload, "{}", record.message)
            }
            RecordLevel::Warn => {
                tracing::warn!(target: "metrics", metric_type, payload = %payload, "{}", record.message)
            }
            RecordLevel::Error => {
                tracing::error!(target: "metrics", metric_type, payload = %payload, "{}", record.message)
            }
        }
    }
}

/// Writes to every inner sink in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }
}

impl Sink for FanoutSink {
    fn write(&self, record: MetricRecord) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.write(record.clone());
            }
            last.write(record);
        }
    }
}

/// Bounded-channel sink. A full or closed channel drops the record.
pub struct ChannelSink {
    tx: mpsc::Sender<MetricRecord>,
    dropped_total: AtomicU64,
    last_drop_warn: Mutex<Option<Instant>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<MetricRecord>) -> Self {
        Self {
            tx,
            dropped_total: AtomicU64::new(0),
            last_drop_warn: Mutex::new(None),
        }
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    fn note_drop(&self, reason: &'static str) {
        let dropped = self.dropped_total.fetch_add(1, Ordering::Relaxed) + 1;
        let should_warn = match self.last_drop_warn.lock() {
            Ok(mut guard) => {
                let due = guard.is_none_or(|t| t.elapsed() >= DROP_WARN_INTERVAL);
                if due {
                    *guard = Some(Instant::now());
                }
                due
            }
            Err(_) => true,
        };
        if should_warn {
            tracing::warn!(
                operation = "sink_write",
                reason,
                dropped_total = dropped,
                "metric record dropped"
            );
        }
    }
}

impl Sink for ChannelSink {
    fn write(&self, record: MetricRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => self.note_drop("channel full"),
            Err(mpsc::error::TrySendError::Closed(_)) => self.note_drop("writer closed"),
        }
    }
}

/// Batching config for the record writer task.
pub struct RecordWriterConfig {
    pub flush_rate: usize,
    pub flush_interval_secs: u64,
}

/// Spawns the task that drains the channel into the repository.
/// Flushes when buffer len >= flush_rate, every flush_interval_secs, and when the channel closes.
pub fn spawn_record_writer(
    mut rx: mpsc::Receiver<MetricRecord>,
    repo: Arc<RecordRepo>,
    config: RecordWriterConfig,
    records_saved_total: IntCounter,
) -> tokio::task::JoinHandle<()> {
    let flush_interval = Duration::from_secs(config.flush_interval_secs);
    tokio::spawn(async move {
        let mut buffer: Vec<MetricRecord> = Vec::new();
        let mut flush_tick = interval(flush_interval);
        flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Some(record) => {
                            buffer.push(record);
                            if buffer.len() >= config.flush_rate
                                && let Err(e) = flush_buffer(&repo, &mut buffer, &records_saved_total).await
                            {
                                tracing::warn!(error = %e, "record writer: save_records failed");
                            }
                        }
                        None => break,
                    }
                }
                _ = flush_tick.tick() => {
                    if let Err(e) = flush_buffer(&repo, &mut buffer, &records_saved_total).await {
                        tracing::warn!(error = %e, "record writer: save_records failed");
                    }
                }
            }
        }
        if let Err(e) = flush_buffer(&repo, &mut buffer, &records_saved_total).await {
            tracing::warn!(error = %e, "record writer: final flush failed");
        }
        tracing::debug!("Record writer shutting down");
    })
}

/// Best-effort: a failed batch is dropped, not retried.
async fn flush_buffer(
    repo: &RecordRepo,
    buffer: &mut Vec<MetricRecord>,
    records_saved_total: &IntCounter,
) -> anyhow::Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }
    let n = buffer.len();
    let result = repo.save_records(buffer).await;
    buffer.clear();
    result?;
    records_saved_total.inc_by(n as u64);
    tracing::debug!(operation = "save_records", records_count = n, "Records saved");
    Ok(())
}
