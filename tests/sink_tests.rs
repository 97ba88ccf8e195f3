// Record writer and repository: batching, close flush, retention

use adopte_monitor::models::{MetricRecord, MetricType, RecordLevel, SocketMetric};
use adopte_monitor::sink::repo::RecordRepo;
use adopte_monitor::sink::{ChannelSink, RecordWriterConfig, Sink, spawn_record_writer};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

async fn temp_repo(dir: &TempDir) -> Arc<RecordRepo> {
    let path = dir.path().join("records.db");
    let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .unwrap()
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(opts).await.unwrap();
    let repo = RecordRepo::new(pool, 14);
    repo.init().await.unwrap();
    Arc::new(repo)
}

fn socket_record(event: &str) -> MetricRecord {
    MetricRecord::new(
        MetricType::SocketEvent,
        RecordLevel::Info,
        format!("socket {}", event),
        &SocketMetric {
            event: event.into(),
            connected_clients: 3,
        },
    )
}

async fn wait_for_count(repo: &RecordRepo, expected: i64) -> i64 {
    let mut n = 0;
    for _ in 0..200 {
        n = repo.count().await.unwrap();
        if n >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    n
}

#[tokio::test]
async fn test_writer_flushes_at_flush_rate() {
    let dir = TempDir::new().unwrap();
    let repo = temp_repo(&dir).await;
    let (tx, rx) = mpsc::channel(16);
    let saved = prometheus::IntCounter::new("records_saved_total", "saved").unwrap();
    let _handle = spawn_record_writer(
        rx,
        repo.clone(),
        RecordWriterConfig {
            flush_rate: 3,
            flush_interval_secs: 3600,
        },
        saved.clone(),
    );

    let sink = ChannelSink::new(tx);
    for event in ["connect", "message", "disconnect"] {
        sink.write(socket_record(event));
    }
    assert_eq!(wait_for_count(&repo, 3).await, 3);
    assert_eq!(saved.get(), 3);

    let recent = repo.recent_records(10).await.unwrap();
    assert_eq!(recent[0].metric_type, "socket_event");
    assert_eq!(recent[0].payload["event"], "disconnect");
    assert_eq!(recent[0].payload["connectedClients"], 3);
}

#[tokio::test]
async fn test_writer_flushes_remaining_records_on_close() {
    let dir = TempDir::new().unwrap();
    let repo = temp_repo(&dir).await;
    let (tx, rx) = mpsc::channel(16);
    let handle = spawn_record_writer(
        rx,
        repo.clone(),
        RecordWriterConfig {
            flush_rate: 100,
            flush_interval_secs: 3600,
        },
        prometheus::IntCounter::new("records_saved_total", "saved").unwrap(),
    );

    let sink = ChannelSink::new(tx);
    sink.write(socket_record("connect"));
    drop(sink);
    handle.await.unwrap();
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_prune_removes_records_past_retention() {
    let dir = TempDir::new().unwrap();
    let repo = temp_repo(&dir).await;

    let mut old = socket_record("old");
    old.timestamp = chrono::Utc::now() - chrono::Duration::days(30);
    let fresh = socket_record("fresh");
    repo.save_records(&[old, fresh]).await.unwrap();

    let pruned = repo
        .prune_old_records(chrono::Utc::now().timestamp_millis())
        .await
        .unwrap();
    assert_eq!(pruned, 1);
    let remaining = repo.recent_records(10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].payload["event"], "fresh");
    repo.vacuum().await.unwrap();
}
