// Append-only metric_records table. Payloads are stored as JSON text.

use crate::models::MetricRecord;
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::instrument;

pub struct RecordRepo {
    pool: SqlitePool,
    retention_ms: i64,
}

/// Row as read back from the table (dump/inspection and tests).
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: i64,
    pub created_at: i64,
    pub metric_type: String,
    pub level: String,
    pub message: String,
    pub payload: serde_json::Value,
}

impl RecordRepo {
    pub fn new(pool: SqlitePool, retention_days: u32) -> Self {
        let retention_ms = (retention_days as i64) * 24 * 60 * 60 * 1000;
        Self { pool, retention_ms }
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS metric_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at INTEGER NOT NULL,
                metric_type TEXT NOT NULL,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                payload TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_metric_records_created_at ON metric_records(created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_metric_records_type ON metric_records(metric_type, created_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, records), fields(repo = "records", operation = "save_records", records_count = records.len()))]
    pub async fn save_records(&self, records: &[MetricRecord]) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for r in records {
            let payload = serde_json::to_string(&r.payload)?;
            sqlx::query(
                "INSERT INTO metric_records (created_at, metric_type, level, message, payload) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(r.timestamp.timestamp_millis())
            .bind(r.metric_type.as_str())
            .bind(r.level.as_str())
            .bind(&r.message)
            .bind(&payload)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Deletes records older than the retention period relative to `now_ms`. Returns rows removed.
    #[instrument(skip(self), fields(repo = "records", operation = "prune_old_records"))]
    pub async fn prune_old_records(&self, now_ms: i64) -> anyhow::Result<u64> {
        let cutoff = now_ms - self.retention_ms;
        let result = sqlx::query("DELETE FROM metric_records WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(repo = "records", operation = "vacuum"))]
    pub async fn vacuum(&self) -> anyhow::Result<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn recent_records(&self, limit: u32) -> anyhow::Result<Vec<StoredRecord>> {
        let rows = sqlx::query(
            "SELECT id, created_at, metric_type, level, message, payload FROM metric_records ORDER BY id DESC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let payload: String = row.try_get("payload")?;
                Ok(StoredRecord {
                    id: row.try_get("id")?,
                    created_at: row.try_get("created_at")?,
                    metric_type: row.try_get("metric_type")?,
                    level: row.try_get("level")?,
                    message: row.try_get("message")?,
                    payload: serde_json::from_str(&payload)?,
                })
            })
            .collect()
    }

    pub async fn count(&self) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM metric_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}
