use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use plugin_core::{
    ConfigField, ConfigMap, ConfigSchema, ExecutionContext, FieldType, IntentOutcome, IntentSpec,
    Plugin, PluginError, ScheduleKind, ScheduleSpec,
};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, Set};
use serde_json::json;

use engine::entity::plugin_schedule;
use engine::{ConfigurationService, PluginRegistry, SchedulerService};

pub const HYDRATION: &str = "hydration-reminder";
pub const NOTES: &str = "quick-notes";

/// Observation points shared between the fixture variants and the tests.
#[derive(Clone, Default)]
pub struct Probes {
    pub executions: Arc<AtomicUsize>,
    pub activations: Arc<AtomicUsize>,
    /// Non-zero makes hydration executions fail for that user only.
    pub fail_for_user: Arc<AtomicI32>,
    /// Effective config seen by the most recent hydration execution.
    pub last_config: Arc<Mutex<Option<ConfigMap>>>,
}

pub struct TestApp {
    pub db: DatabaseConnection,
    pub registry: Arc<PluginRegistry>,
    pub scheduler: SchedulerService,
    pub configs: ConfigurationService,
    pub probes: Probes,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let mut opt = ConnectOptions::new("sqlite::memory:");
        // One connection keeps every query on the same in-memory database.
        opt.max_connections(1).sqlx_logging(false);

        let db = Database::connect(opt)
            .await
            .expect("Failed to open test database");
        db.get_schema_registry("engine::entity::*")
            .sync(&db)
            .await
            .expect("Failed to sync schema");

        let registry = Arc::new(PluginRegistry::new(db.clone()));
        let probes = Probes::default();

        {
            let probes = probes.clone();
            registry
                .register(Arc::new(move || {
                    Arc::new(HydrationPlugin {
                        probes: probes.clone(),
                    }) as Arc<dyn Plugin>
                }))
                .expect("Failed to register hydration fixture");
        }
        registry
            .register(Arc::new(|| Arc::new(QuickNotesPlugin) as Arc<dyn Plugin>))
            .expect("Failed to register notes fixture");

        let scheduler = SchedulerService::new(db.clone(), registry.clone());
        let configs = ConfigurationService::new(db.clone(), registry.clone());

        Self {
            db,
            registry,
            scheduler,
            configs,
            probes,
        }
    }

    /// Install the hydration fixture and activate it for `user_id`.
    pub async fn setup_active(&self, user_id: i32) {
        self.registry
            .install(HYDRATION)
            .await
            .expect("Failed to install hydration fixture");
        self.registry
            .activate_for_user(HYDRATION, user_id)
            .await
            .expect("Failed to activate hydration fixture");
    }

    /// Backdate a schedule so the next sweep picks it up.
    pub async fn force_due(&self, schedule_id: i32) {
        let schedule = plugin_schedule::Entity::find_by_id(schedule_id)
            .one(&self.db)
            .await
            .expect("Failed to load schedule")
            .expect("Schedule does not exist");

        let mut model: plugin_schedule::ActiveModel = schedule.into();
        model.next_run_at = Set(Some(Utc::now() - Duration::minutes(5)));
        model
            .update(&self.db)
            .await
            .expect("Failed to backdate schedule");
    }

    pub fn executions(&self) -> usize {
        self.probes.executions.load(Ordering::SeqCst)
    }

    pub fn activations(&self) -> usize {
        self.probes.activations.load(Ordering::SeqCst)
    }
}

/// Water-intake reminder fixture: configurable, schedulable, chat-capable.
struct HydrationPlugin {
    probes: Probes,
}

#[async_trait]
impl Plugin for HydrationPlugin {
    fn slug(&self) -> &str {
        HYDRATION
    }

    fn name(&self) -> &str {
        "Hydration Reminder"
    }

    fn description(&self) -> &str {
        "Reminds you to drink water through the day"
    }

    fn version(&self) -> &str {
        "1.2.0"
    }

    fn icon(&self) -> &str {
        "droplet"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .field(
                ConfigField::new("target_ml", FieldType::Number)
                    .label("Daily target (ml)")
                    .required()
                    .default_value(2000)
                    .range(500.0, 5000.0),
            )
            .field(
                ConfigField::new("reminder_times", FieldType::Time)
                    .label("Reminder times")
                    .default_value("09:00,13:00,17:00"),
            )
            .field(
                ConfigField::new("channel", FieldType::Select)
                    .label("Delivery channel")
                    .options(["push", "email"])
                    .default_value("push"),
            )
    }

    async fn activate(&self, _user_id: i32) -> Result<(), PluginError> {
        self.probes.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(
        &self,
        user_id: i32,
        config: &ConfigMap,
        _context: &ExecutionContext,
    ) -> Result<(), PluginError> {
        if self.probes.fail_for_user.load(Ordering::SeqCst) == user_id {
            return Err(PluginError::execution("simulated delivery outage"));
        }

        if let Ok(mut last) = self.probes.last_config.lock() {
            *last = Some(config.clone());
        }
        self.probes.executions.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn supports_scheduling(&self) -> bool {
        true
    }

    fn default_schedule(&self) -> Option<ScheduleSpec> {
        Some(ScheduleSpec::new(ScheduleKind::Interval, "120"))
    }

    fn supports_chat_integration(&self) -> bool {
        true
    }

    fn chat_intents(&self) -> Vec<IntentSpec> {
        vec![
            IntentSpec::new("log_intake", "Record a drink of water")
                .entity("amount_ml", "Amount of water in millilitres")
                .example("I just drank a glass of water"),
        ]
    }

    async fn handle_chat_intent(
        &self,
        _user_id: i32,
        action: &str,
        entities: &ConfigMap,
    ) -> Result<IntentOutcome, PluginError> {
        match action {
            "log_intake" => {
                let amount = entities
                    .get("amount_ml")
                    .and_then(|v| v.as_str())
                    .unwrap_or("250");
                Ok(IntentOutcome::success("Logged your water intake")
                    .with_data(json!({ "amount_ml": amount })))
            }
            other => Ok(IntentOutcome::failure(format!(
                "Action '{other}' is not supported."
            ))),
        }
    }
}

/// Bare-minimum fixture: no schema, no scheduling, no chat.
struct QuickNotesPlugin;

#[async_trait]
impl Plugin for QuickNotesPlugin {
    fn slug(&self) -> &str {
        NOTES
    }

    fn name(&self) -> &str {
        "Quick Notes"
    }

    fn description(&self) -> &str {
        "Jot down short notes"
    }

    async fn execute(
        &self,
        _user_id: i32,
        _config: &ConfigMap,
        _context: &ExecutionContext,
    ) -> Result<(), PluginError> {
        Ok(())
    }
}
