use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use plugin_core::{schedule, ExecutionContext, ScheduleKind, ScheduleSpec};
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QuerySelect, Set, TransactionTrait,
};
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use crate::configuration::effective_config;
use crate::entity::{plugin, plugin_log, plugin_schedule, user_plugin};
use crate::error::EngineError;
use crate::logs::PluginLogService;
use crate::registry::PluginRegistry;

/// What happened to one schedule during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// Executed and rescheduled successfully.
    Completed,
    /// Not executed: claimed by a concurrent sweep, or self-healed away.
    Skipped,
    /// Execution or dispatch failed. Logged against the plugin.
    Failed,
}

/// Creates and maintains schedules, and runs the due-schedule sweep.
#[derive(Clone)]
pub struct SchedulerService {
    db: DatabaseConnection,
    registry: Arc<PluginRegistry>,
}

impl SchedulerService {
    pub fn new(db: DatabaseConnection, registry: Arc<PluginRegistry>) -> Self {
        Self { db, registry }
    }

    /// Create a schedule for a user's activation. Any previously active
    /// schedules of that activation are deactivated, not deleted, so past
    /// runs stay attributable.
    #[instrument(skip(self, metadata))]
    pub async fn create_schedule(
        &self,
        user_id: i32,
        slug: &str,
        spec: ScheduleSpec,
        metadata: Option<Value>,
    ) -> Result<plugin_schedule::Model, EngineError> {
        let activation = self.require_activation(user_id, slug).await?;

        plugin_schedule::Entity::update_many()
            .col_expr(
                plugin_schedule::Column::IsActive,
                sea_orm::sea_query::Expr::value(false),
            )
            .filter(plugin_schedule::Column::UserPluginId.eq(activation.id))
            .filter(plugin_schedule::Column::IsActive.eq(true))
            .exec(&self.db)
            .await?;

        let next = self.next_run_or_fallback(spec.kind.as_str(), &spec.value, Utc::now());

        let model = plugin_schedule::ActiveModel {
            user_plugin_id: Set(activation.id),
            schedule_type: Set(spec.kind.to_string()),
            schedule_value: Set(spec.value),
            last_run_at: Set(None),
            next_run_at: Set(Some(next)),
            is_active: Set(true),
            metadata: Set(metadata.unwrap_or(Value::Null)),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        Ok(model.insert(&self.db).await?)
    }

    /// Create a schedule from the variant's declared default, if it supports
    /// scheduling and declares one.
    pub async fn create_default_schedule(
        &self,
        user_id: i32,
        slug: &str,
    ) -> Result<Option<plugin_schedule::Model>, EngineError> {
        let Some(instance) = self.registry.get(slug) else {
            return Ok(None);
        };

        if !instance.supports_scheduling() {
            return Ok(None);
        }

        let Some(spec) = instance.default_schedule() else {
            return Ok(None);
        };

        Ok(Some(self.create_schedule(user_id, slug, spec, None).await?))
    }

    /// Re-point an existing schedule at a new type/value and recompute its
    /// next occurrence.
    pub async fn update_schedule(
        &self,
        schedule_id: i32,
        spec: ScheduleSpec,
        metadata: Option<Value>,
    ) -> Result<plugin_schedule::Model, EngineError> {
        let schedule = self.find_schedule(schedule_id).await?;

        let next = self.next_run_or_fallback(spec.kind.as_str(), &spec.value, Utc::now());

        let mut model: plugin_schedule::ActiveModel = schedule.into();
        model.schedule_type = Set(spec.kind.to_string());
        model.schedule_value = Set(spec.value);
        model.next_run_at = Set(Some(next));
        if let Some(metadata) = metadata {
            model.metadata = Set(metadata);
        }

        Ok(model.update(&self.db).await?)
    }

    pub async fn activate_schedule(
        &self,
        schedule_id: i32,
    ) -> Result<plugin_schedule::Model, EngineError> {
        let schedule = self.find_schedule(schedule_id).await?;
        let next =
            self.next_run_or_fallback(&schedule.schedule_type, &schedule.schedule_value, Utc::now());

        let mut model: plugin_schedule::ActiveModel = schedule.into();
        model.is_active = Set(true);
        model.next_run_at = Set(Some(next));

        Ok(model.update(&self.db).await?)
    }

    pub async fn deactivate_schedule(
        &self,
        schedule_id: i32,
    ) -> Result<plugin_schedule::Model, EngineError> {
        let schedule = self.find_schedule(schedule_id).await?;

        let mut model: plugin_schedule::ActiveModel = schedule.into();
        model.is_active = Set(false);

        Ok(model.update(&self.db).await?)
    }

    /// Delete a schedule outright. Returns false when it did not exist.
    pub async fn delete_schedule(&self, schedule_id: i32) -> Result<bool, EngineError> {
        let result = plugin_schedule::Entity::delete_by_id(schedule_id)
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    pub async fn schedules_for_user_plugin(
        &self,
        user_id: i32,
        slug: &str,
    ) -> Result<Vec<plugin_schedule::Model>, EngineError> {
        let Some(definition) = self.registry.find_by_slug(slug).await? else {
            return Ok(Vec::new());
        };
        let Some(activation) = self.activation(definition.id, user_id).await? else {
            return Ok(Vec::new());
        };

        Ok(plugin_schedule::Entity::find()
            .filter(plugin_schedule::Column::UserPluginId.eq(activation.id))
            .all(&self.db)
            .await?)
    }

    pub async fn active_schedule(
        &self,
        user_id: i32,
        slug: &str,
    ) -> Result<Option<plugin_schedule::Model>, EngineError> {
        let schedules = self.schedules_for_user_plugin(user_id, slug).await?;
        Ok(schedules.into_iter().find(|s| s.is_active))
    }

    /// Active schedules that are due right now: `next_run_at` is NULL (due
    /// immediately) or has already passed.
    pub async fn due_schedules(&self) -> Result<Vec<plugin_schedule::Model>, EngineError> {
        Ok(plugin_schedule::Entity::find()
            .filter(plugin_schedule::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(plugin_schedule::Column::NextRunAt.is_null())
                    .add(plugin_schedule::Column::NextRunAt.lte(Utc::now())),
            )
            .all(&self.db)
            .await?)
    }

    /// One sweep over the due set. Failures are isolated per schedule; the
    /// returned count covers only schedules that completed successfully.
    #[instrument(skip(self))]
    pub async fn process_due_schedules(&self) -> Result<usize, EngineError> {
        let due_ids: Vec<i32> = plugin_schedule::Entity::find()
            .select_only()
            .column(plugin_schedule::Column::Id)
            .filter(plugin_schedule::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(plugin_schedule::Column::NextRunAt.is_null())
                    .add(plugin_schedule::Column::NextRunAt.lte(Utc::now())),
            )
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut processed = 0;

        for schedule_id in due_ids {
            match self.execute_schedule(schedule_id).await {
                Ok(SweepOutcome::Completed) => processed += 1,
                Ok(_) => {}
                Err(e) => {
                    error!(schedule_id, error = %e, "Failed to process due schedule");
                }
            }
        }

        Ok(processed)
    }

    /// Execute one due schedule.
    ///
    /// The row is claimed with a `FOR UPDATE` lock and its due-ness rechecked
    /// under the lock, so two concurrent sweeps cannot double-execute the
    /// same occurrence. The lock covers the bookkeeping transaction; the
    /// plugin's own side effects are not rolled back on failure.
    pub async fn execute_schedule(&self, schedule_id: i32) -> Result<SweepOutcome, EngineError> {
        let txn = self.db.begin().await?;

        let Some(schedule) = plugin_schedule::Entity::find_by_id(schedule_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
        else {
            txn.rollback().await?;
            return Ok(SweepOutcome::Skipped);
        };

        // Rechecked under the lock: a concurrent sweep may have executed and
        // rescheduled this row between the due query and the claim.
        let now = Utc::now();
        if !schedule.is_active || !is_due(&schedule, now) {
            txn.rollback().await?;
            return Ok(SweepOutcome::Skipped);
        }

        let activation = user_plugin::Entity::find_by_id(schedule.user_plugin_id)
            .one(&txn)
            .await?;

        let Some(activation) = activation.filter(|a| a.is_active) else {
            // Stale schedule on a deactivated (or deleted) activation:
            // self-heal instead of erroring on every sweep.
            warn!(schedule_id, "Deactivating schedule of inactive activation");
            let mut model: plugin_schedule::ActiveModel = schedule.into();
            model.is_active = Set(false);
            model.update(&txn).await?;
            txn.commit().await?;
            return Ok(SweepOutcome::Skipped);
        };

        let Some(definition) = plugin::Entity::find_by_id(activation.plugin_id)
            .one(&txn)
            .await?
        else {
            txn.rollback().await?;
            error!(schedule_id, "Plugin definition missing for schedule");
            return Ok(SweepOutcome::Failed);
        };

        let Some(instance) = self.registry.get(&definition.variant) else {
            // Leave the row due so it is retried next sweep; the repeating
            // error entry is the operator's signal.
            txn.rollback().await?;
            PluginLogService::new(&self.db)
                .error(
                    definition.id,
                    "Plugin variant is not registered",
                    Some(activation.user_id),
                    json!({ "schedule_id": schedule_id, "variant": definition.variant }),
                )
                .await?;
            return Ok(SweepOutcome::Failed);
        };

        let config = effective_config(&txn, &definition, activation.id).await?;

        let context = ExecutionContext::scheduled(
            schedule.id,
            schedule.schedule_type.parse::<ScheduleKind>().ok(),
            schedule.next_run_at,
            schedule.metadata.clone(),
        );

        match instance.execute(activation.user_id, &config, &context).await {
            Ok(()) => {
                self.mark_as_run(&txn, &schedule).await?;
                PluginLogService::new(&txn)
                    .info(
                        definition.id,
                        "Scheduled execution completed",
                        Some(activation.user_id),
                        json!({ "schedule_id": schedule_id }),
                    )
                    .await?;
                txn.commit().await?;
                Ok(SweepOutcome::Completed)
            }
            Err(e) => {
                txn.rollback().await?;

                PluginLogService::new(&self.db)
                    .error(
                        definition.id,
                        format!("Scheduled execution failed: {e}"),
                        Some(activation.user_id),
                        json!({ "schedule_id": schedule_id, "error": e.to_string() }),
                    )
                    .await?;

                // Bookkeeping still advances, outside the rolled-back
                // transaction, so a permanently failing plugin cannot wedge
                // the queue into immediate re-execution.
                self.mark_as_run(&self.db, &schedule).await?;

                Ok(SweepOutcome::Failed)
            }
        }
    }

    /// Newest-first execution history for a user's plugin.
    pub async fn get_execution_history(
        &self,
        user_id: i32,
        slug: &str,
        limit: u64,
    ) -> Result<Vec<plugin_log::Model>, EngineError> {
        let Some(definition) = self.registry.find_by_slug(slug).await? else {
            return Ok(Vec::new());
        };

        Ok(PluginLogService::new(&self.db)
            .history(definition.id, Some(user_id), limit)
            .await?)
    }

    /// Prune execution log entries older than `days_to_keep` days.
    pub async fn cleanup_old_logs(&self, days_to_keep: i64) -> Result<u64, EngineError> {
        Ok(PluginLogService::new(&self.db)
            .prune_older_than(days_to_keep)
            .await?)
    }

    /// Advance `last_run_at` and recompute `next_run_at` from the
    /// execution-time clock. Interval schedules therefore drift with
    /// processing delay; simplicity over precision.
    async fn mark_as_run<C: ConnectionTrait>(
        &self,
        conn: &C,
        schedule: &plugin_schedule::Model,
    ) -> Result<(), EngineError> {
        let now = Utc::now();
        let next = self.next_run_or_fallback(&schedule.schedule_type, &schedule.schedule_value, now);

        let mut model: plugin_schedule::ActiveModel = schedule.clone().into();
        model.last_run_at = Set(Some(now));
        model.next_run_at = Set(Some(next));
        model.update(conn).await?;

        Ok(())
    }

    /// Calculator front-end applying the degrade-gracefully policy: a value
    /// that cannot be interpreted schedules one day out and is surfaced as a
    /// warning rather than an error.
    fn next_run_or_fallback(
        &self,
        schedule_type: &str,
        schedule_value: &str,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let computed = schedule_type
            .parse::<ScheduleKind>()
            .and_then(|kind| schedule::next_run(kind, schedule_value, now));

        match computed {
            Ok(next) => next,
            Err(e) => {
                warn!(
                    schedule_type,
                    schedule_value,
                    error = %e,
                    "Falling back to daily retry for uninterpretable schedule"
                );
                schedule::fallback_next_run(now)
            }
        }
    }

    async fn require_activation(
        &self,
        user_id: i32,
        slug: &str,
    ) -> Result<user_plugin::Model, EngineError> {
        let definition = self
            .registry
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| EngineError::NotInstalled(slug.to_string()))?;

        self.activation(definition.id, user_id)
            .await?
            .ok_or_else(|| EngineError::NotActive(slug.to_string(), user_id))
    }

    async fn activation(
        &self,
        plugin_id: i32,
        user_id: i32,
    ) -> Result<Option<user_plugin::Model>, sea_orm::DbErr> {
        user_plugin::Entity::find()
            .filter(user_plugin::Column::UserId.eq(user_id))
            .filter(user_plugin::Column::PluginId.eq(plugin_id))
            .one(&self.db)
            .await
    }

    async fn find_schedule(
        &self,
        schedule_id: i32,
    ) -> Result<plugin_schedule::Model, EngineError> {
        plugin_schedule::Entity::find_by_id(schedule_id)
            .one(&self.db)
            .await?
            .ok_or(EngineError::ScheduleNotFound(schedule_id))
    }
}

fn is_due(schedule: &plugin_schedule::Model, now: DateTime<Utc>) -> bool {
    match schedule.next_run_at {
        None => true,
        Some(next) => next <= now,
    }
}

/// Run the due-schedule sweep as a background task.
pub async fn run_sweep_loop(service: SchedulerService, sweep_interval: Duration) {
    info!(
        interval_secs = sweep_interval.as_secs(),
        "Starting schedule sweep loop"
    );

    let mut interval = tokio::time::interval(sweep_interval);

    loop {
        interval.tick().await;

        match service.process_due_schedules().await {
            Ok(processed) if processed > 0 => {
                info!(processed, "Sweep completed");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Sweep failed");
            }
        }
    }
}

/// Periodically prune old execution log entries.
pub async fn run_log_retention_loop(
    service: SchedulerService,
    interval: Duration,
    days_to_keep: i64,
) {
    info!(
        days_to_keep,
        interval_secs = interval.as_secs(),
        "Starting log retention loop"
    );

    let mut interval = tokio::time::interval(interval);

    loop {
        interval.tick().await;

        match service.cleanup_old_logs(days_to_keep).await {
            Ok(removed) if removed > 0 => {
                info!(removed, "Pruned old plugin log entries");
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "Log retention pass failed");
            }
        }
    }
}
