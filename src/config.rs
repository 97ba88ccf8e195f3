use serde::Deserialize;
use std::str::FromStr;

use crate::models::Severity;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            host: "0.0.0.0".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    /// Stored metric records older than this are removed by the daily cleanup.
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    14
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/adopte.db".into(),
            retention_days: default_retention_days(),
        }
    }
}

/// Cadences of the scheduled tasks and health check timeouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub health_check_interval_secs: u64,
    pub business_metrics_interval_secs: u64,
    pub alert_check_interval_secs: u64,
    /// System metrics run on their own timer, independent of health checks.
    pub system_metrics_interval_secs: u64,
    /// Cron expression (local time, seconds field first) for the daily cleanup.
    pub cleanup_schedule: String,
    pub error_window_secs: u64,
    pub health_timeout_secs: u64,
    pub readiness_timeout_secs: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 30,
            business_metrics_interval_secs: 300,
            alert_check_interval_secs: 60,
            system_metrics_interval_secs: 60,
            cleanup_schedule: "0 0 2 * * *".into(),
            error_window_secs: 300,
            health_timeout_secs: 10,
            readiness_timeout_secs: 5,
        }
    }
}

/// Warning/critical cutoffs for one metric family. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ThresholdPair {
    pub warning: f64,
    pub critical: f64,
}

impl ThresholdPair {
    pub const fn new(warning: f64, critical: f64) -> Self {
        Self { warning, critical }
    }

    /// Returns the severity reached by `value`, or `None` below the warning cutoff.
    pub fn evaluate(&self, value: f64) -> Option<Severity> {
        if value >= self.critical {
            Some(Severity::Critical)
        } else if value >= self.warning {
            Some(Severity::Warning)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThresholdsConfig {
    /// Milliseconds.
    pub response_time: ThresholdPair,
    /// Percent of failed requests in the current window.
    pub error_rate: ThresholdPair,
    /// Percent of the process memory budget.
    pub memory_usage: ThresholdPair,
    /// Percent of 1-minute load over core count.
    pub cpu_load: ThresholdPair,
    /// Milliseconds for one store round-trip.
    pub database_response_time: ThresholdPair,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            response_time: ThresholdPair::new(1000.0, 5000.0),
            error_rate: ThresholdPair::new(5.0, 10.0),
            memory_usage: ThresholdPair::new(80.0, 90.0),
            cpu_load: ThresholdPair::new(75.0, 90.0),
            database_response_time: ThresholdPair::new(500.0, 2000.0),
        }
    }
}

impl ThresholdsConfig {
    fn families_mut(&mut self) -> [(&'static str, &mut ThresholdPair); 5] {
        [
            ("RESPONSE_TIME", &mut self.response_time),
            ("ERROR_RATE", &mut self.error_rate),
            ("MEMORY_USAGE", &mut self.memory_usage),
            ("CPU_LOAD", &mut self.cpu_load),
            ("DATABASE_RESPONSE_TIME", &mut self.database_response_time),
        ]
    }

    fn families(&self) -> [(&'static str, &ThresholdPair); 5] {
        [
            ("responseTime", &self.response_time),
            ("errorRate", &self.error_rate),
            ("memoryUsage", &self.memory_usage),
            ("cpuLoad", &self.cpu_load),
            ("databaseResponseTime", &self.database_response_time),
        ]
    }
}

/// Longest accepted throttle window: one week.
pub const MAX_THROTTLE_SECS: u64 = 7 * 24 * 60 * 60;

fn secs_to_ms(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX).saturating_mul(1000)
}

/// Minimum seconds between two dispatched alerts with the same (type, severity).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub info_secs: u64,
    pub warning_secs: u64,
    pub critical_secs: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            info_secs: 30 * 60,
            warning_secs: 15 * 60,
            critical_secs: 5 * 60,
        }
    }
}

impl ThrottleConfig {
    pub fn window_ms(&self, severity: Severity) -> i64 {
        let secs = match severity {
            Severity::Info => self.info_secs,
            Severity::Warning => self.warning_secs,
            Severity::Critical => self.critical_secs,
        };
        secs_to_ms(secs)
    }

    pub fn longest_window_ms(&self) -> i64 {
        secs_to_ms(self.info_secs.max(self.warning_secs).max(self.critical_secs))
    }
}

/// Absent URLs disable the corresponding channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub slack_webhook_url: Option<String>,
    pub slack_channel: Option<String>,
    pub discord_webhook_url: Option<String>,
    pub webhook_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            slack_webhook_url: None,
            slack_channel: None,
            discord_webhook_url: None,
            webhook_url: None,
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub upload_dir: String,
    /// Other local directories the backend depends on.
    pub extra_paths: Vec<String>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            upload_dir: "uploads".into(),
            extra_paths: vec![],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Process memory budget in MB. Defaults to total host memory when unset.
    pub process_limit_mb: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub channel_capacity: usize,
    pub flush_rate: usize,
    pub flush_interval_secs: u64,
    /// Mirror every record as a tracing event.
    pub tracing: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            flush_rate: 50,
            flush_interval_secs: 5,
            tracing: true,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path, "config file not found; using defaults");
                String::new()
            }
            Err(e) => return Err(e.into()),
        };
        Self::load_from_str_with_env(&s, |key| std::env::var(key).ok())
    }

    /// Parse and validate config from a string (e.g. for tests). No environment overrides.
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        Self::load_from_str_with_env(s, |_| None)
    }

    /// Parse, apply overrides from `env`, then validate.
    pub fn load_from_str_with_env<F>(s: &str, env: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: AppConfig = toml::from_str(s)?;
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, env: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PORT") {
            self.server.port = parse_var("PORT", &v)?;
        }
        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("DATABASE_PATH") {
            self.database.path = v;
        }
        if let Some(v) = get("SLACK_WEBHOOK_URL") {
            self.notifications.slack_webhook_url = Some(v);
        }
        if let Some(v) = get("DISCORD_WEBHOOK_URL") {
            self.notifications.discord_webhook_url = Some(v);
        }
        if let Some(v) = get("ALERT_WEBHOOK_URL") {
            self.notifications.webhook_url = Some(v);
        }
        if let Some(v) = get("UPLOAD_DIR") {
            self.services.upload_dir = v;
        }
        if let Some(v) = get("HEALTH_CHECK_INTERVAL") {
            self.monitoring.health_check_interval_secs = parse_var("HEALTH_CHECK_INTERVAL", &v)?;
        }
        if let Some(v) = get("METRICS_INTERVAL") {
            self.monitoring.business_metrics_interval_secs = parse_var("METRICS_INTERVAL", &v)?;
        }
        if let Some(v) = get("ALERT_CHECK_INTERVAL") {
            self.monitoring.alert_check_interval_secs = parse_var("ALERT_CHECK_INTERVAL", &v)?;
        }
        for (family, pair) in self.thresholds.families_mut() {
            let warning_key = format!("ALERT_{family}_WARNING");
            if let Some(v) = get(&warning_key) {
                pair.warning = parse_var(&warning_key, &v)?;
            }
            let critical_key = format!("ALERT_{family}_CRITICAL");
            if let Some(v) = get(&critical_key) {
                pair.critical = parse_var(&critical_key, &v)?;
            }
        }
        if let Some(v) = get("ALERT_THROTTLE_INFO") {
            self.throttle.info_secs = parse_var("ALERT_THROTTLE_INFO", &v)?;
        }
        if let Some(v) = get("ALERT_THROTTLE_WARNING") {
            self.throttle.warning_secs = parse_var("ALERT_THROTTLE_WARNING", &v)?;
        }
        if let Some(v) = get("ALERT_THROTTLE_CRITICAL") {
            self.throttle.critical_secs = parse_var("ALERT_THROTTLE_CRITICAL", &v)?;
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.retention_days > 0,
            "database.retention_days must be > 0, got {}",
            self.database.retention_days
        );
        let intervals = [
            (
                "monitoring.health_check_interval_secs",
                self.monitoring.health_check_interval_secs,
            ),
            (
                "monitoring.business_metrics_interval_secs",
                self.monitoring.business_metrics_interval_secs,
            ),
            (
                "monitoring.alert_check_interval_secs",
                self.monitoring.alert_check_interval_secs,
            ),
            (
                "monitoring.system_metrics_interval_secs",
                self.monitoring.system_metrics_interval_secs,
            ),
            (
                "monitoring.error_window_secs",
                self.monitoring.error_window_secs,
            ),
            (
                "monitoring.health_timeout_secs",
                self.monitoring.health_timeout_secs,
            ),
            (
                "monitoring.readiness_timeout_secs",
                self.monitoring.readiness_timeout_secs,
            ),
            ("throttle.info_secs", self.throttle.info_secs),
            ("throttle.warning_secs", self.throttle.warning_secs),
            ("throttle.critical_secs", self.throttle.critical_secs),
            (
                "notifications.request_timeout_secs",
                self.notifications.request_timeout_secs,
            ),
            ("sink.flush_interval_secs", self.sink.flush_interval_secs),
        ];
        for (name, value) in intervals {
            anyhow::ensure!(value > 0, "{} must be > 0, got {}", name, value);
        }
        for (name, value) in [
            ("throttle.info_secs", self.throttle.info_secs),
            ("throttle.warning_secs", self.throttle.warning_secs),
            ("throttle.critical_secs", self.throttle.critical_secs),
        ] {
            anyhow::ensure!(
                value <= MAX_THROTTLE_SECS,
                "{} must be at most {} (one week), got {}",
                name,
                MAX_THROTTLE_SECS,
                value
            );
        }
        anyhow::ensure!(
            cron::Schedule::from_str(&self.monitoring.cleanup_schedule).is_ok(),
            "monitoring.cleanup_schedule is not a valid cron expression: {:?}",
            self.monitoring.cleanup_schedule
        );
        for (name, pair) in self.thresholds.families() {
            anyhow::ensure!(
                pair.warning < pair.critical,
                "thresholds.{}: warning ({}) must be below critical ({})",
                name,
                pair.warning,
                pair.critical
            );
        }
        anyhow::ensure!(
            self.sink.channel_capacity > 0,
            "sink.channel_capacity must be > 0, got {}",
            self.sink.channel_capacity
        );
        anyhow::ensure!(
            self.sink.flush_rate > 0,
            "sink.flush_rate must be > 0, got {}",
            self.sink.flush_rate
        );
        Ok(())
    }
}

fn parse_var<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{}: invalid value {:?}: {}", key, value, e))
}
