// Monitoring core shared by the binary and the integration tests

pub mod alerting;
pub mod clock;
pub mod config;
pub mod error_rate;
pub mod health;
pub mod metrics;
pub mod models;
pub mod routes;
pub mod scheduler;
pub mod sink;
pub mod store;
pub mod sysinfo_repo;
pub mod version;
