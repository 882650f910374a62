use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PluginError;
use crate::intent::{IntentOutcome, IntentSpec};
use crate::schedule::{ScheduleKind, ScheduleSpec};
use crate::schema::{ConfigMap, ConfigSchema};
use crate::validator::{self, ValidationErrors};

/// What caused a plugin execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    /// Explicit request through the on-demand execution path.
    Manual,
    /// Picked up by the due-schedule sweep.
    Scheduled,
}

/// Context handed to `execute`. For scheduled runs it carries the schedule's
/// identity and the originally-due timestamp; manual runs carry only the
/// trigger and whatever metadata the caller supplies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub trigger: Trigger,
    pub schedule_id: Option<i32>,
    pub schedule_kind: Option<ScheduleKind>,
    /// When the run was originally due, not when it actually started.
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Opaque schedule metadata, e.g. a sub-type discriminator.
    pub metadata: Value,
}

impl ExecutionContext {
    pub fn manual() -> Self {
        Self {
            trigger: Trigger::Manual,
            schedule_id: None,
            schedule_kind: None,
            scheduled_for: None,
            metadata: Value::Null,
        }
    }

    pub fn scheduled(
        schedule_id: i32,
        schedule_kind: Option<ScheduleKind>,
        scheduled_for: Option<DateTime<Utc>>,
        metadata: Value,
    ) -> Self {
        Self {
            trigger: Trigger::Scheduled,
            schedule_id: Some(schedule_id),
            schedule_kind,
            scheduled_for,
            metadata,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The capability contract every plugin variant implements.
///
/// Variants are pure behavior holders: stateless, cheap to construct, with
/// all per-user state living in the engine's stores. Scheduling and chat
/// integration are capability sets — callers consult the corresponding flag
/// before invoking those methods, and the defaults give non-supporting
/// variants an empty contract rather than an error.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique identifier, stable across versions.
    fn slug(&self) -> &str;

    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn author(&self) -> &str {
        "ASPRI Team"
    }

    fn icon(&self) -> &str {
        "puzzle-piece"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
    }

    /// Defaults derived from the schema unless a variant overrides them.
    fn default_config(&self) -> ConfigMap {
        self.config_schema().defaults()
    }

    /// Schema-driven validation plus any variant-specific cross-field rules.
    fn validate_config(&self, candidate: &ConfigMap) -> ValidationErrors {
        validator::validate(&self.config_schema(), candidate)
    }

    /// Called once when the plugin is installed system-wide.
    async fn install(&self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called once when the plugin is uninstalled from the system.
    async fn uninstall(&self) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called when a user activates the plugin.
    async fn activate(&self, _user_id: i32) -> Result<(), PluginError> {
        Ok(())
    }

    /// Called when a user deactivates the plugin.
    async fn deactivate(&self, _user_id: i32) -> Result<(), PluginError> {
        Ok(())
    }

    /// The scheduled or on-demand unit of work. Side-effecting; completion or
    /// error is the whole contract.
    async fn execute(
        &self,
        user_id: i32,
        config: &ConfigMap,
        context: &ExecutionContext,
    ) -> Result<(), PluginError>;

    fn supports_scheduling(&self) -> bool {
        false
    }

    fn default_schedule(&self) -> Option<ScheduleSpec> {
        None
    }

    fn supports_chat_integration(&self) -> bool {
        false
    }

    fn chat_intents(&self) -> Vec<IntentSpec> {
        Vec::new()
    }

    async fn handle_chat_intent(
        &self,
        _user_id: i32,
        action: &str,
        _entities: &ConfigMap,
    ) -> Result<IntentOutcome, PluginError> {
        Ok(IntentOutcome::failure(format!(
            "Action '{action}' is not supported."
        )))
    }
}
