use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A single configuration override, scoped to one activation. The effective
/// configuration is the plugin's defaults with these overrides layered on top.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plugin_configuration")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub user_plugin_id: i32,
    #[sea_orm(primary_key)]
    pub config_key: String,

    #[sea_orm(belongs_to, from = "user_plugin_id", to = "id")]
    pub user_plugin: HasOne<super::user_plugin::Entity>,

    #[sea_orm(column_type = "JsonBinary")]
    pub config_value: serde_json::Value,
}

impl ActiveModelBehavior for ActiveModel {}
