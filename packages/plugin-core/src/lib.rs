pub mod error;
pub mod intent;
pub mod schedule;
pub mod schema;
pub mod traits;
pub mod validator;

pub use error::PluginError;
pub use intent::{IntentOutcome, IntentSpec};
pub use schedule::{ScheduleError, ScheduleKind, ScheduleSpec};
pub use schema::{ConfigField, ConfigMap, ConfigSchema, FieldType};
pub use traits::{ExecutionContext, Plugin, Trigger};
pub use validator::ValidationErrors;
