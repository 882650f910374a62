use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only execution log entry, written by the engine and by plugin
/// logic. Pruned by the retention task.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plugin_log")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub plugin_id: i32,
    #[sea_orm(belongs_to, from = "plugin_id", to = "id")]
    pub plugin: HasOne<super::plugin::Entity>,

    /// NULL for system-level entries not tied to a user.
    #[sea_orm(indexed)]
    pub user_id: Option<i32>,

    /// One of: info, warning, error, debug.
    #[sea_orm(indexed)]
    pub level: String,

    #[sea_orm(column_type = "Text")]
    pub message: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub context: serde_json::Value,

    #[sea_orm(indexed)]
    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
