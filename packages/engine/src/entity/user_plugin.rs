use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One user's activation of one plugin. Unique per (user, plugin).
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_plugin")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(indexed)]
    pub user_id: i32,

    pub plugin_id: i32,
    #[sea_orm(belongs_to, from = "plugin_id", to = "id")]
    pub plugin: HasOne<super::plugin::Entity>,

    #[sea_orm(default_value = false)]
    pub is_active: bool,

    pub activated_at: Option<DateTimeUtc>,

    #[sea_orm(has_many)]
    pub configurations: HasMany<super::plugin_configuration::Entity>,

    #[sea_orm(has_many)]
    pub schedules: HasMany<super::plugin_schedule::Entity>,

    pub created_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
