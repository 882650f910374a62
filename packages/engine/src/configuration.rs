use std::sync::Arc;

use plugin_core::{validator, ConfigMap, ConfigSchema, ValidationErrors};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, Set,
};
use serde_json::Value;

use crate::entity::{plugin, plugin_configuration, user_plugin};
use crate::error::EngineError;
use crate::registry::PluginRegistry;

/// Defaults from the persisted definition overlaid with the activation's
/// stored overrides. Overrides win.
pub async fn effective_config<C: ConnectionTrait>(
    conn: &C,
    definition: &plugin::Model,
    user_plugin_id: i32,
) -> Result<ConfigMap, DbErr> {
    let mut config = definition
        .default_config
        .as_object()
        .cloned()
        .unwrap_or_default();

    let overrides = plugin_configuration::Entity::find()
        .filter(plugin_configuration::Column::UserPluginId.eq(user_plugin_id))
        .all(conn)
        .await?;

    for row in overrides {
        config.insert(row.config_key, row.config_value);
    }

    Ok(config)
}

/// Reads and writes per-activation configuration overrides, validating
/// candidates before they are persisted.
pub struct ConfigurationService {
    db: DatabaseConnection,
    registry: Arc<PluginRegistry>,
}

impl ConfigurationService {
    pub fn new(db: DatabaseConnection, registry: Arc<PluginRegistry>) -> Self {
        Self { db, registry }
    }

    /// Effective configuration for a user. Falls back to plugin defaults
    /// when the user has no activation.
    pub async fn get_config(&self, user_id: i32, slug: &str) -> Result<ConfigMap, EngineError> {
        let Some(definition) = self.registry.find_by_slug(slug).await? else {
            return Ok(ConfigMap::new());
        };

        match self.activation(definition.id, user_id).await? {
            Some(activation) => {
                Ok(effective_config(&self.db, &definition, activation.id).await?)
            }
            None => Ok(definition.default_config.as_object().cloned().unwrap_or_default()),
        }
    }

    pub async fn default_config(&self, slug: &str) -> Result<ConfigMap, EngineError> {
        let definition = self.registry.find_by_slug(slug).await?;

        Ok(definition
            .and_then(|d| d.default_config.as_object().cloned())
            .unwrap_or_default())
    }

    /// The persisted schema for a plugin, decoded into its typed form.
    pub async fn config_schema(&self, slug: &str) -> Result<ConfigSchema, EngineError> {
        let Some(definition) = self.registry.find_by_slug(slug).await? else {
            return Ok(ConfigSchema::new());
        };

        serde_json::from_value(definition.config_schema)
            .map_err(|e| EngineError::Internal(format!("Malformed persisted schema: {e}")))
    }

    /// Validate and persist a configuration map as per-key overrides.
    /// Returns the stored overrides on success.
    pub async fn save_config(
        &self,
        user_id: i32,
        slug: &str,
        candidate: ConfigMap,
    ) -> Result<ConfigMap, EngineError> {
        let (_, activation) = self.require_activation(user_id, slug).await?;

        let errors = self.validate(slug, &candidate).await?;
        if !errors.is_empty() {
            return Err(EngineError::Validation(errors));
        }

        for (key, value) in candidate {
            self.upsert_override(activation.id, &key, value).await?;
        }

        self.stored_overrides(activation.id).await
    }

    /// Validate and persist a single configuration key.
    pub async fn update_value(
        &self,
        user_id: i32,
        slug: &str,
        key: &str,
        value: Value,
    ) -> Result<(), EngineError> {
        let (_, activation) = self.require_activation(user_id, slug).await?;

        let mut single = ConfigMap::new();
        single.insert(key.to_string(), value.clone());

        let errors = self.validate(slug, &single).await?;
        // Only errors for this key block the write; required-field errors for
        // the other fields do not apply to a single-key update.
        if let Some(message) = errors.get(key) {
            let mut field_errors = ValidationErrors::new();
            field_errors.insert(key.to_string(), message.clone());
            return Err(EngineError::Validation(field_errors));
        }

        self.upsert_override(activation.id, key, value).await
    }

    /// Drop all overrides for the activation, reverting to plugin defaults.
    /// Returns the defaults.
    pub async fn reset_config(&self, user_id: i32, slug: &str) -> Result<ConfigMap, EngineError> {
        let (definition, activation) = self.require_activation(user_id, slug).await?;

        plugin_configuration::Entity::delete_many()
            .filter(plugin_configuration::Column::UserPluginId.eq(activation.id))
            .exec(&self.db)
            .await?;

        Ok(definition.default_config.as_object().cloned().unwrap_or_default())
    }

    /// Validate a candidate map. Delegates to the live variant when it is
    /// registered (picking up variant-specific cross-field rules); otherwise
    /// falls back to pure validation against the persisted schema, so a
    /// temporarily unavailable variant does not block configuration.
    pub async fn validate(
        &self,
        slug: &str,
        candidate: &ConfigMap,
    ) -> Result<ValidationErrors, EngineError> {
        if let Some(definition) = self.registry.find_by_slug(slug).await?
            && let Some(instance) = self.registry.get(&definition.variant)
        {
            return Ok(instance.validate_config(candidate));
        }

        let schema = self.config_schema(slug).await?;
        Ok(validator::validate(&schema, candidate))
    }

    async fn require_activation(
        &self,
        user_id: i32,
        slug: &str,
    ) -> Result<(plugin::Model, user_plugin::Model), EngineError> {
        let definition = self
            .registry
            .find_by_slug(slug)
            .await?
            .ok_or_else(|| EngineError::NotInstalled(slug.to_string()))?;

        let activation = self
            .activation(definition.id, user_id)
            .await?
            .ok_or_else(|| EngineError::NotActive(slug.to_string(), user_id))?;

        Ok((definition, activation))
    }

    async fn activation(
        &self,
        plugin_id: i32,
        user_id: i32,
    ) -> Result<Option<user_plugin::Model>, DbErr> {
        user_plugin::Entity::find()
            .filter(user_plugin::Column::UserId.eq(user_id))
            .filter(user_plugin::Column::PluginId.eq(plugin_id))
            .one(&self.db)
            .await
    }

    async fn upsert_override(
        &self,
        user_plugin_id: i32,
        key: &str,
        value: Value,
    ) -> Result<(), EngineError> {
        let existing = plugin_configuration::Entity::find_by_id((
            user_plugin_id,
            key.to_string(),
        ))
        .one(&self.db)
        .await?;

        match existing {
            Some(row) => {
                let mut model: plugin_configuration::ActiveModel = row.into();
                model.config_value = Set(value);
                model.update(&self.db).await?;
            }
            None => {
                let model = plugin_configuration::ActiveModel {
                    user_plugin_id: Set(user_plugin_id),
                    config_key: Set(key.to_string()),
                    config_value: Set(value),
                    ..Default::default()
                };
                model.insert(&self.db).await?;
            }
        }

        Ok(())
    }

    async fn stored_overrides(&self, user_plugin_id: i32) -> Result<ConfigMap, EngineError> {
        let rows = plugin_configuration::Entity::find()
            .filter(plugin_configuration::Column::UserPluginId.eq(user_plugin_id))
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.config_key, row.config_value))
            .collect())
    }
}
