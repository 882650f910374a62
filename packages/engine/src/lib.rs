pub mod config;
pub mod configuration;
pub mod database;
pub mod entity;
pub mod error;
pub mod logs;
pub mod registry;
pub mod scheduler;

pub use config::AppConfig;
pub use configuration::ConfigurationService;
pub use error::EngineError;
pub use logs::{LogLevel, PluginLogService};
pub use registry::{PluginFactory, PluginForUser, PluginRegistry};
pub use scheduler::{run_log_retention_loop, run_sweep_loop, SchedulerService, SweepOutcome};
