use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// An installed plugin definition. Created on install from the variant's
/// declared metadata, updated on re-sync, never mutated by execution.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plugin")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub slug: String,
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub version: String,
    pub author: String,
    pub icon: String,

    /// Registry identifier of the capability implementation backing this
    /// definition. Resolved through the in-process registry at dispatch time.
    pub variant: String,

    /// Declared configuration schema, serialized as an array of field specs.
    #[sea_orm(column_type = "JsonBinary")]
    pub config_schema: serde_json::Value,

    /// Schema-derived defaults at install/sync time.
    #[sea_orm(column_type = "JsonBinary")]
    pub default_config: serde_json::Value,

    pub installed_at: Option<DateTimeUtc>,

    #[sea_orm(has_many)]
    pub activations: HasMany<super::user_plugin::Entity>,

    #[sea_orm(has_many)]
    pub logs: HasMany<super::plugin_log::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
