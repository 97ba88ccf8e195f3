// Persistent store (SQLite via sqlx): connection-state introspection, ping, stats and
// business counts. Nothing here knows about domain queries beyond row counts.

use crate::models::{BusinessCounts, EntityCounts};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::instrument;

/// (entity name, table, column grouped on)
const BUSINESS_TABLES: &[(&str, &str, &str)] = &[
    ("users", "users", "role"),
    ("jobOffers", "job_offers", "status"),
    ("applications", "applications", "status"),
    ("adoptions", "adoptions", "status"),
];

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Connecting,
    Disconnecting,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connected,
            2 => ConnectionState::Connecting,
            3 => ConnectionState::Disconnecting,
            _ => ConnectionState::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connected => 1,
            ConnectionState::Connecting => 2,
            ConnectionState::Disconnecting => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Disconnecting => "disconnecting",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub collections: u64,
    pub indexes: u64,
    pub data_size_bytes: u64,
    pub storage_size_bytes: u64,
}

impl StoreStats {
    pub fn data_size_mb(&self) -> f64 {
        round2(self.data_size_bytes as f64 / BYTES_PER_MB)
    }

    pub fn storage_size_mb(&self) -> f64 {
        round2(self.storage_size_bytes as f64 / BYTES_PER_MB)
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// What the health aggregator needs from the store driver.
#[async_trait::async_trait]
pub trait StoreHealth: Send + Sync {
    fn connection_state(&self) -> ConnectionState;
    async fn ping(&self) -> anyhow::Result<()>;
    async fn stats(&self) -> anyhow::Result<StoreStats>;
}

/// Source of aggregate business counts for the periodic refresh.
#[async_trait::async_trait]
pub trait BusinessStatsSource: Send + Sync {
    async fn business_counts(&self) -> anyhow::Result<BusinessCounts>;
}

pub struct Store {
    pool: SqlitePool,
    state: AtomicU8,
}

impl Store {
    pub async fn connect(path: &str) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new().connect_with(opts).await?;
        Ok(Self::from_pool(pool))
    }

    /// Wraps an already-open pool (e.g. an in-memory database in tests).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            state: AtomicU8::new(ConnectionState::Connected.as_u8()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.state
            .store(ConnectionState::Disconnecting.as_u8(), Ordering::Release);
        self.pool.close().await;
        self.state
            .store(ConnectionState::Disconnected.as_u8(), Ordering::Release);
    }

    async fn table_exists(&self, table: &str) -> anyhow::Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = $1",
        )
        .bind(table)
        .fetch_one(&self.pool)
        .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n > 0)
    }

    async fn pragma_i64(&self, pragma: &str) -> anyhow::Result<i64> {
        let row = sqlx::query(&format!("PRAGMA {}", pragma))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    async fn count_entity(&self, table: &str, group_column: &str) -> anyhow::Result<EntityCounts> {
        let grouped = sqlx::query(&format!(
            "SELECT CAST({col} AS TEXT) AS grp, COUNT(*) AS n FROM {table} GROUP BY {col}",
            col = group_column,
            table = table
        ))
        .fetch_all(&self.pool)
        .await;

        let mut counts = EntityCounts::default();
        match grouped {
            Ok(rows) => {
                for row in rows {
                    let key: Option<String> = row.try_get("grp")?;
                    let n: i64 = row.try_get("n")?;
                    let n = n.max(0) as u64;
                    counts.total += n;
                    *counts
                        .by_status
                        .entry(key.unwrap_or_else(|| "unknown".into()))
                        .or_insert(0) += n;
                }
            }
            Err(e) => {
                // Table without the grouping column: total only.
                tracing::debug!(table, error = %e, "grouped count failed; counting rows only");
                let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
                    .fetch_one(&self.pool)
                    .await?;
                let n: i64 = row.try_get("n")?;
                counts.total = n.max(0) as u64;
            }
        }
        Ok(counts)
    }
}

#[async_trait::async_trait]
impl StoreHealth for Store {
    fn connection_state(&self) -> ConnectionState {
        if self.pool.is_closed() {
            return ConnectionState::Disconnected;
        }
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[instrument(skip(self), fields(repo = "store", operation = "ping"))]
    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "store", operation = "stats"))]
    async fn stats(&self) -> anyhow::Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT
                SUM(CASE WHEN type = 'table' THEN 1 ELSE 0 END) AS tables,
                SUM(CASE WHEN type = 'index' THEN 1 ELSE 0 END) AS indexes
            FROM sqlite_master
            WHERE name NOT LIKE 'sqlite_%'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        let tables: Option<i64> = row.try_get("tables")?;
        let indexes: Option<i64> = row.try_get("indexes")?;

        let page_count = self.pragma_i64("page_count").await?.max(0) as u64;
        let page_size = self.pragma_i64("page_size").await?.max(0) as u64;
        let freelist = self.pragma_i64("freelist_count").await?.max(0) as u64;

        Ok(StoreStats {
            collections: tables.unwrap_or(0).max(0) as u64,
            indexes: indexes.unwrap_or(0).max(0) as u64,
            data_size_bytes: page_count.saturating_sub(freelist) * page_size,
            storage_size_bytes: page_count * page_size,
        })
    }
}

#[async_trait::async_trait]
impl BusinessStatsSource for Store {
    #[instrument(skip(self), fields(repo = "store", operation = "business_counts"))]
    async fn business_counts(&self) -> anyhow::Result<BusinessCounts> {
        let mut out = BTreeMap::new();
        for (entity, table, column) in BUSINESS_TABLES {
            let counts = if self.table_exists(table).await? {
                self.count_entity(table, column).await?
            } else {
                EntityCounts::default()
            };
            out.insert((*entity).to_string(), counts);
        }
        Ok(BusinessCounts(out))
    }
}
