use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Seconds between due-schedule sweeps.
    pub sweep_interval_secs: u64,
    /// Execution log entries older than this many days are pruned.
    pub log_retention_days: i64,
    /// Seconds between log retention passes.
    pub retention_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("scheduler.sweep_interval_secs", 60)?
            .set_default("scheduler.log_retention_days", 30)?
            .set_default("scheduler.retention_interval_secs", 86400)?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., ASPRI__DATABASE__URL)
            .add_source(Environment::with_prefix("ASPRI").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
