// Health aggregator: runs the four checks concurrently, each under a timeout, and reduces
// their statuses to the worst one. Check failures stay inside the snapshot.

pub mod checks;

use crate::models::{
    CHECK_DATABASE, CHECK_MEMORY, CHECK_SERVICES, CHECK_SYSTEM, CheckResult, HealthSnapshot,
    HealthStatus,
};
use crate::store::{ConnectionState, StoreHealth};
use crate::sysinfo_repo::ResourceSampler;
use crate::version::VERSION;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct HealthTimeouts {
    pub health: Duration,
    pub readiness: Duration,
}

impl Default for HealthTimeouts {
    fn default() -> Self {
        Self {
            health: Duration::from_secs(10),
            readiness: Duration::from_secs(5),
        }
    }
}

pub struct HealthAggregator {
    store: Arc<dyn StoreHealth>,
    sampler: Arc<dyn ResourceSampler>,
    service_paths: Vec<PathBuf>,
    timeouts: HealthTimeouts,
    started_at: Instant,
    latest: Mutex<Option<HealthSnapshot>>,
}

impl HealthAggregator {
    pub fn new(
        store: Arc<dyn StoreHealth>,
        sampler: Arc<dyn ResourceSampler>,
        service_paths: Vec<PathBuf>,
        timeouts: HealthTimeouts,
    ) -> Self {
        Self {
            store,
            sampler,
            service_paths,
            timeouts,
            started_at: Instant::now(),
            latest: Mutex::new(None),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Most recent snapshot produced by `check_health`.
    pub fn latest(&self) -> Option<HealthSnapshot> {
        self.latest.lock().ok().and_then(|g| g.clone())
    }

    /// Runs every check and returns a fresh snapshot. Never fails; a check that errors or
    /// times out is reported in its own check.
    #[instrument(skip(self), fields(operation = "check_health"))]
    pub async fn check_health(&self) -> HealthSnapshot {
        let start = Instant::now();
        let limit = self.timeouts.health;

        let (database, resources, services) = tokio::join!(
            bounded(limit, checks::check_store(self.store.as_ref())),
            tokio::time::timeout(limit, self.sampler.sample()),
            bounded(limit, checks::check_paths(&self.service_paths)),
        );

        let (memory, system) = match resources {
            Ok(Ok(sample)) => (
                checks::classify_memory(&sample),
                checks::classify_load(&sample),
            ),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "resource sampling failed");
                let failed =
                    CheckResult::new(HealthStatus::Critical, format!("Sampling failed: {}", e));
                (failed.clone(), failed)
            }
            Err(_) => {
                let timed_out = timed_out_result(limit);
                (timed_out.clone(), timed_out)
            }
        };

        let mut checks = BTreeMap::new();
        checks.insert(CHECK_DATABASE.to_string(), database);
        checks.insert(CHECK_MEMORY.to_string(), memory);
        checks.insert(CHECK_SYSTEM.to_string(), system);
        checks.insert(CHECK_SERVICES.to_string(), services);

        let overall_status = HealthStatus::worst(checks.values().map(|c| c.status));
        let snapshot = HealthSnapshot {
            timestamp: chrono::Utc::now(),
            overall_status,
            response_time_ms: start.elapsed().as_millis() as u64,
            uptime_secs: self.uptime_secs(),
            version: VERSION.to_string(),
            checks,
        };

        if !overall_status.is_healthy() {
            tracing::warn!(
                status = %overall_status,
                response_time_ms = snapshot.response_time_ms,
                "health check not healthy"
            );
        }
        if let Ok(mut guard) = self.latest.lock() {
            *guard = Some(snapshot.clone());
        }
        snapshot
    }

    /// Ready when the store is connected and answers a ping within the readiness timeout.
    #[instrument(skip(self), fields(operation = "readiness"))]
    pub async fn readiness(&self) -> bool {
        if self.store.connection_state() != ConnectionState::Connected {
            return false;
        }
        match tokio::time::timeout(self.timeouts.readiness, self.store.ping()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "readiness ping failed");
                false
            }
            Err(_) => {
                tracing::warn!("readiness ping timed out");
                false
            }
        }
    }
}

fn timed_out_result(limit: Duration) -> CheckResult {
    CheckResult::new(
        HealthStatus::Critical,
        format!("Check timed out after {}ms", limit.as_millis()),
    )
}

/// A check that does not finish within `limit` is critical.
async fn bounded<F>(limit: Duration, check: F) -> CheckResult
where
    F: Future<Output = CheckResult>,
{
    match tokio::time::timeout(limit, check).await {
        Ok(result) => result,
        Err(_) => timed_out_result(limit),
    }
}
