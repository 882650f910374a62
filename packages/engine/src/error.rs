use plugin_core::{PluginError, ValidationErrors};
use sea_orm::DbErr;
use thiserror::Error;

/// Engine-level error type returned by the registry and services.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Plugin '{0}' is not registered")]
    NotRegistered(String),

    #[error("Plugin '{0}' is not installed")]
    NotInstalled(String),

    #[error("Plugin '{0}' is not active for user {1}")]
    NotActive(String, i32),

    #[error("Schedule {0} not found")]
    ScheduleNotFound(i32),

    /// Configuration rejected by the validator. Field-level messages are
    /// returned to the caller, never raised past it.
    #[error("Configuration validation failed for {} field(s)", .0.len())]
    Validation(ValidationErrors),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error(transparent)]
    Db(#[from] DbErr),

    #[error("Internal error: {0}")]
    Internal(String),
}
