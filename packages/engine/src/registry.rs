use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use plugin_core::{ConfigMap, ExecutionContext, IntentOutcome, IntentSpec, Plugin, PluginError};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use serde::Serialize;
use tracing::{info, instrument};

use crate::configuration::effective_config;
use crate::entity::{plugin, plugin_configuration, plugin_log, plugin_schedule, user_plugin};
use crate::error::EngineError;
use crate::logs::PluginLogService;

/// Constructs a fresh variant instance. Variants are stateless behavior
/// holders, so construction on demand is cheap and uncached.
pub type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// An installed plugin annotated with one user's activation state.
#[derive(Debug, Clone, Serialize)]
pub struct PluginForUser {
    pub plugin: plugin::Model,
    pub is_active: bool,
    pub user_plugin_id: Option<i32>,
}

/// Maps slugs to variant factories and mediates the install/activation
/// lifecycle against the persisted plugin definitions.
///
/// The installed-definitions cache is explicitly invalidated on
/// install/uninstall/sync; definitions change rarely, so a staleness window
/// between those events is acceptable.
pub struct PluginRegistry {
    db: DatabaseConnection,
    factories: RwLock<HashMap<String, PluginFactory>>,
    installed_cache: RwLock<Option<Vec<plugin::Model>>>,
}

impl PluginRegistry {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            factories: RwLock::new(HashMap::new()),
            installed_cache: RwLock::new(None),
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Register a variant factory under the slug its instances declare.
    pub fn register(&self, factory: PluginFactory) -> Result<(), EngineError> {
        let slug = factory().slug().to_string();

        let mut factories = self
            .factories
            .write()
            .map_err(|_| EngineError::Internal("Registry lock poisoned".into()))?;
        factories.insert(slug, factory);

        Ok(())
    }

    /// Instantiate the variant registered under `slug`, if any.
    pub fn get(&self, slug: &str) -> Option<Arc<dyn Plugin>> {
        let factories = self.factories.read().ok()?;
        factories.get(slug).map(|factory| factory())
    }

    pub fn registered_slugs(&self) -> Vec<String> {
        self.factories
            .read()
            .map(|f| f.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Install a registered variant: create its definition row from the
    /// declared metadata and run the system-wide install hook. Idempotent —
    /// an existing definition is returned untouched.
    #[instrument(skip(self))]
    pub async fn install(&self, slug: &str) -> Result<plugin::Model, EngineError> {
        let instance = self
            .get(slug)
            .ok_or_else(|| EngineError::NotRegistered(slug.to_string()))?;

        if let Some(existing) = self.find_by_slug(slug).await? {
            return Ok(existing);
        }

        let model = plugin::ActiveModel {
            slug: Set(instance.slug().to_string()),
            name: Set(instance.name().to_string()),
            description: Set(instance.description().to_string()),
            version: Set(instance.version().to_string()),
            author: Set(instance.author().to_string()),
            icon: Set(instance.icon().to_string()),
            variant: Set(instance.slug().to_string()),
            config_schema: Set(schema_json(instance.as_ref())?),
            default_config: Set(serde_json::Value::Object(instance.default_config())),
            installed_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        let inserted = model.insert(&self.db).await?;

        instance.install().await?;

        PluginLogService::new(&self.db)
            .info(inserted.id, "Plugin installed", None, serde_json::json!({}))
            .await?;

        info!(slug, plugin_id = inserted.id, "Plugin installed");
        self.invalidate();

        Ok(inserted)
    }

    /// Uninstall a plugin: run the uninstall hook, then delete the definition
    /// and everything hanging off it (activations, overrides, schedules, logs).
    #[instrument(skip(self))]
    pub async fn uninstall(&self, slug: &str) -> Result<bool, EngineError> {
        let Some(definition) = self.find_by_slug(slug).await? else {
            return Ok(false);
        };

        if let Some(instance) = self.get(&definition.variant) {
            instance.uninstall().await?;
        }

        let txn = self.db.begin().await?;

        let activation_ids: Vec<i32> = user_plugin::Entity::find()
            .select_only()
            .column(user_plugin::Column::Id)
            .filter(user_plugin::Column::PluginId.eq(definition.id))
            .into_tuple()
            .all(&txn)
            .await?;

        if !activation_ids.is_empty() {
            plugin_configuration::Entity::delete_many()
                .filter(plugin_configuration::Column::UserPluginId.is_in(activation_ids.clone()))
                .exec(&txn)
                .await?;
            plugin_schedule::Entity::delete_many()
                .filter(plugin_schedule::Column::UserPluginId.is_in(activation_ids))
                .exec(&txn)
                .await?;
        }

        user_plugin::Entity::delete_many()
            .filter(user_plugin::Column::PluginId.eq(definition.id))
            .exec(&txn)
            .await?;
        plugin_log::Entity::delete_many()
            .filter(plugin_log::Column::PluginId.eq(definition.id))
            .exec(&txn)
            .await?;
        plugin::Entity::delete_by_id(definition.id).exec(&txn).await?;

        txn.commit().await?;

        info!(slug, "Plugin uninstalled");
        self.invalidate();

        Ok(true)
    }

    /// Reconcile the database with the registered variants: install missing
    /// definitions and refresh metadata/schema/defaults of existing ones.
    #[instrument(skip(self))]
    pub async fn sync(&self) -> Result<(), EngineError> {
        for slug in self.registered_slugs() {
            let Some(instance) = self.get(&slug) else {
                continue;
            };

            match self.find_by_slug(&slug).await? {
                None => {
                    self.install(&slug).await?;
                }
                Some(existing) => {
                    let mut model: plugin::ActiveModel = existing.into();
                    model.name = Set(instance.name().to_string());
                    model.description = Set(instance.description().to_string());
                    model.version = Set(instance.version().to_string());
                    model.author = Set(instance.author().to_string());
                    model.icon = Set(instance.icon().to_string());
                    model.config_schema = Set(schema_json(instance.as_ref())?);
                    model.default_config =
                        Set(serde_json::Value::Object(instance.default_config()));
                    model.update(&self.db).await?;
                }
            }
        }

        self.invalidate();
        Ok(())
    }

    /// All installed plugin definitions, served from the cache when warm.
    pub async fn installed_plugins(&self) -> Result<Vec<plugin::Model>, EngineError> {
        if let Ok(cache) = self.installed_cache.read()
            && let Some(cached) = cache.as_ref()
        {
            return Ok(cached.clone());
        }

        let plugins = plugin::Entity::find()
            .filter(plugin::Column::InstalledAt.is_not_null())
            .all(&self.db)
            .await?;

        if let Ok(mut cache) = self.installed_cache.write() {
            *cache = Some(plugins.clone());
        }

        Ok(plugins)
    }

    /// Drop the installed-definitions cache.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.installed_cache.write() {
            *cache = None;
        }
    }

    /// All installed plugins annotated with this user's activation state.
    pub async fn plugins_for_user(&self, user_id: i32) -> Result<Vec<PluginForUser>, EngineError> {
        let plugins = self.installed_plugins().await?;

        let activations: HashMap<i32, user_plugin::Model> = user_plugin::Entity::find()
            .filter(user_plugin::Column::UserId.eq(user_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|up| (up.plugin_id, up))
            .collect();

        Ok(plugins
            .into_iter()
            .map(|p| {
                let activation = activations.get(&p.id);
                PluginForUser {
                    is_active: activation.is_some_and(|a| a.is_active),
                    user_plugin_id: activation.map(|a| a.id),
                    plugin: p,
                }
            })
            .collect())
    }

    /// Active activations for a user together with their plugin definitions.
    pub async fn active_plugins_for_user(
        &self,
        user_id: i32,
    ) -> Result<Vec<(user_plugin::Model, plugin::Model)>, EngineError> {
        let rows = user_plugin::Entity::find()
            .filter(user_plugin::Column::UserId.eq(user_id))
            .filter(user_plugin::Column::IsActive.eq(true))
            .find_also_related(plugin::Entity)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(up, p)| p.map(|p| (up, p)))
            .collect())
    }

    /// Activate a plugin for a user. Creates the activation row on first
    /// request; re-activating an already-active plugin is a no-op and does
    /// not re-invoke the lifecycle hook.
    #[instrument(skip(self))]
    pub async fn activate_for_user(
        &self,
        slug: &str,
        user_id: i32,
    ) -> Result<user_plugin::Model, EngineError> {
        let definition = self
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| EngineError::NotInstalled(slug.to_string()))?;

        let existing = user_plugin::Entity::find()
            .filter(user_plugin::Column::UserId.eq(user_id))
            .filter(user_plugin::Column::PluginId.eq(definition.id))
            .one(&self.db)
            .await?;

        let activation = match existing {
            Some(activation) => activation,
            None => {
                let model = user_plugin::ActiveModel {
                    user_id: Set(user_id),
                    plugin_id: Set(definition.id),
                    is_active: Set(false),
                    activated_at: Set(None),
                    created_at: Set(Utc::now()),
                    ..Default::default()
                };
                model.insert(&self.db).await?
            }
        };

        if activation.is_active {
            return Ok(activation);
        }

        let mut model: user_plugin::ActiveModel = activation.into();
        model.is_active = Set(true);
        model.activated_at = Set(Some(Utc::now()));
        let activation = model.update(&self.db).await?;

        if let Some(instance) = self.get(&definition.variant) {
            instance.activate(user_id).await?;
        }

        PluginLogService::new(&self.db)
            .info(
                definition.id,
                "Plugin activated for user",
                Some(user_id),
                serde_json::json!({}),
            )
            .await?;

        Ok(activation)
    }

    /// Deactivate a plugin for a user. Runs the deactivate hook once and
    /// deactivates the activation's schedules. Returns None when the plugin
    /// or activation does not exist.
    #[instrument(skip(self))]
    pub async fn deactivate_for_user(
        &self,
        slug: &str,
        user_id: i32,
    ) -> Result<Option<user_plugin::Model>, EngineError> {
        let Some(definition) = self.find_by_slug(slug).await? else {
            return Ok(None);
        };

        let Some(activation) = user_plugin::Entity::find()
            .filter(user_plugin::Column::UserId.eq(user_id))
            .filter(user_plugin::Column::PluginId.eq(definition.id))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        if let Some(instance) = self.get(&definition.variant) {
            instance.deactivate(user_id).await?;
        }

        plugin_schedule::Entity::update_many()
            .col_expr(
                plugin_schedule::Column::IsActive,
                sea_orm::sea_query::Expr::value(false),
            )
            .filter(plugin_schedule::Column::UserPluginId.eq(activation.id))
            .exec(&self.db)
            .await?;

        let mut model: user_plugin::ActiveModel = activation.into();
        model.is_active = Set(false);
        let activation = model.update(&self.db).await?;

        PluginLogService::new(&self.db)
            .info(
                definition.id,
                "Plugin deactivated for user",
                Some(user_id),
                serde_json::json!({}),
            )
            .await?;

        Ok(Some(activation))
    }

    /// On-demand (non-scheduled) execution path. Requires an installed
    /// definition and an active activation.
    #[instrument(skip(self, context))]
    pub async fn execute_plugin(
        &self,
        slug: &str,
        user_id: i32,
        context: &ExecutionContext,
    ) -> Result<(), EngineError> {
        let definition = self
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| EngineError::NotInstalled(slug.to_string()))?;

        let activation = user_plugin::Entity::find()
            .filter(user_plugin::Column::UserId.eq(user_id))
            .filter(user_plugin::Column::PluginId.eq(definition.id))
            .filter(user_plugin::Column::IsActive.eq(true))
            .one(&self.db)
            .await?
            .ok_or_else(|| EngineError::NotActive(slug.to_string(), user_id))?;

        let instance = self
            .get(&definition.variant)
            .ok_or_else(|| EngineError::NotRegistered(slug.to_string()))?;

        let config = effective_config(&self.db, &definition, activation.id).await?;
        instance.execute(user_id, &config, context).await?;

        Ok(())
    }

    /// Intents declared by the user's active chat-capable plugins.
    pub async fn chat_intents_for_user(
        &self,
        user_id: i32,
    ) -> Result<Vec<IntentSpec>, EngineError> {
        let mut intents = Vec::new();

        for (_, definition) in self.active_plugins_for_user(user_id).await? {
            if let Some(instance) = self.get(&definition.variant)
                && instance.supports_chat_integration()
            {
                intents.extend(instance.chat_intents());
            }
        }

        Ok(intents)
    }

    /// Route a parsed chat intent to its plugin. Requires an active
    /// activation; variants without chat support answer through the
    /// contract's default (a failure outcome), not an error.
    pub async fn handle_chat_intent(
        &self,
        slug: &str,
        user_id: i32,
        action: &str,
        entities: &ConfigMap,
    ) -> Result<IntentOutcome, EngineError> {
        let definition = self
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| EngineError::NotInstalled(slug.to_string()))?;

        let active = user_plugin::Entity::find()
            .filter(user_plugin::Column::UserId.eq(user_id))
            .filter(user_plugin::Column::PluginId.eq(definition.id))
            .filter(user_plugin::Column::IsActive.eq(true))
            .one(&self.db)
            .await?
            .is_some();
        if !active {
            return Err(EngineError::NotActive(slug.to_string(), user_id));
        }

        let instance = self
            .get(&definition.variant)
            .ok_or_else(|| EngineError::NotRegistered(slug.to_string()))?;

        Ok(instance.handle_chat_intent(user_id, action, entities).await?)
    }

    pub(crate) async fn find_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<plugin::Model>, sea_orm::DbErr> {
        plugin::Entity::find()
            .filter(plugin::Column::Slug.eq(slug))
            .one(&self.db)
            .await
    }
}

fn schema_json(instance: &dyn Plugin) -> Result<serde_json::Value, PluginError> {
    Ok(serde_json::to_value(instance.config_schema())?)
}
