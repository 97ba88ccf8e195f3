// Process and host resource readings via sysinfo

use crate::models::SystemSample;
use std::sync::{Arc, Mutex};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::instrument;

/// Source of resource readings for the memory and load checks.
#[async_trait::async_trait]
pub trait ResourceSampler: Send + Sync {
    async fn sample(&self) -> anyhow::Result<SystemSample>;
}

pub struct SysinfoRepo {
    sys: Arc<Mutex<System>>,
    pid: Option<Pid>,
    /// Process memory budget; `None` means total host memory.
    process_limit_bytes: Option<u64>,
}

impl Default for SysinfoRepo {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SysinfoRepo {
    pub fn new(process_limit_mb: Option<u64>) -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            tracing::warn!("current pid unavailable; process memory will read as 0");
        }
        Self {
            sys: Arc::new(Mutex::new(sys)),
            pid,
            process_limit_bytes: process_limit_mb.map(|mb| mb * 1024 * 1024),
        }
    }
}

#[async_trait::async_trait]
impl ResourceSampler for SysinfoRepo {
    /// Refreshes memory and the current process, then reads one sample.
    #[instrument(skip(self), fields(repo = "sysinfo", operation = "sample"))]
    async fn sample(&self) -> anyhow::Result<SystemSample> {
        let sys = self.sys.clone();
        let pid = self.pid;
        let process_limit_bytes = self.process_limit_bytes;
        tokio::task::spawn_blocking(move || {
            let mut sys = sys
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
            sys.refresh_memory();
            if let Some(pid) = pid {
                sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            }

            let (process_memory, process_virtual, process_uptime) = pid
                .and_then(|pid| sys.process(pid))
                .map(|p| (p.memory(), p.virtual_memory(), p.run_time()))
                .unwrap_or((0, 0, 0));
            let total = sys.total_memory();
            let load = System::load_average();

            Ok(SystemSample {
                process_memory_bytes: process_memory,
                process_virtual_memory_bytes: process_virtual,
                process_memory_limit_bytes: process_limit_bytes.unwrap_or(total),
                system_total_memory_bytes: total,
                system_free_memory_bytes: sys.available_memory(),
                load_one: load.one,
                load_five: load.five,
                load_fifteen: load.fifteen,
                cpu_count: sys.cpus().len().max(1) as u32,
                process_uptime_secs: process_uptime,
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }
}
