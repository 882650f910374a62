use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A recurring-execution contract belonging to one activation.
///
/// `next_run_at` of NULL means "due immediately". Deactivated rather than
/// deleted when superseded, so past runs stay attributable.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "plugin_schedule")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_plugin_id: i32,
    #[sea_orm(belongs_to, from = "user_plugin_id", to = "id")]
    pub user_plugin: HasOne<super::user_plugin::Entity>,

    /// One of: cron, interval, daily, weekly.
    pub schedule_type: String,
    pub schedule_value: String,

    pub last_run_at: Option<DateTimeUtc>,

    #[sea_orm(indexed)]
    pub next_run_at: Option<DateTimeUtc>,

    #[sea_orm(default_value = true, indexed)]
    pub is_active: bool,

    /// Opaque map passed through to the execution context.
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: serde_json::Value,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
