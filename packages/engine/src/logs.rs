use std::fmt;

use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::entity::plugin_log;

/// Severity of an execution log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only writer/reader for the `plugin_log` table.
pub struct PluginLogService<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> PluginLogService<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn write(
        &self,
        plugin_id: i32,
        level: LogLevel,
        message: impl Into<String>,
        user_id: Option<i32>,
        context: serde_json::Value,
    ) -> Result<plugin_log::Model, DbErr> {
        let model = plugin_log::ActiveModel {
            plugin_id: Set(plugin_id),
            user_id: Set(user_id),
            level: Set(level.to_string()),
            message: Set(message.into()),
            context: Set(context),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        model.insert(self.conn).await
    }

    pub async fn info(
        &self,
        plugin_id: i32,
        message: impl Into<String>,
        user_id: Option<i32>,
        context: serde_json::Value,
    ) -> Result<plugin_log::Model, DbErr> {
        self.write(plugin_id, LogLevel::Info, message, user_id, context)
            .await
    }

    pub async fn warning(
        &self,
        plugin_id: i32,
        message: impl Into<String>,
        user_id: Option<i32>,
        context: serde_json::Value,
    ) -> Result<plugin_log::Model, DbErr> {
        self.write(plugin_id, LogLevel::Warning, message, user_id, context)
            .await
    }

    pub async fn error(
        &self,
        plugin_id: i32,
        message: impl Into<String>,
        user_id: Option<i32>,
        context: serde_json::Value,
    ) -> Result<plugin_log::Model, DbErr> {
        self.write(plugin_id, LogLevel::Error, message, user_id, context)
            .await
    }

    pub async fn debug(
        &self,
        plugin_id: i32,
        message: impl Into<String>,
        user_id: Option<i32>,
        context: serde_json::Value,
    ) -> Result<plugin_log::Model, DbErr> {
        self.write(plugin_id, LogLevel::Debug, message, user_id, context)
            .await
    }

    /// Newest-first entries for one plugin, optionally scoped to a user.
    pub async fn history(
        &self,
        plugin_id: i32,
        user_id: Option<i32>,
        limit: u64,
    ) -> Result<Vec<plugin_log::Model>, DbErr> {
        let mut query = plugin_log::Entity::find()
            .filter(plugin_log::Column::PluginId.eq(plugin_id));

        if let Some(user_id) = user_id {
            query = query.filter(plugin_log::Column::UserId.eq(user_id));
        }

        query
            .order_by_desc(plugin_log::Column::CreatedAt)
            .order_by_desc(plugin_log::Column::Id)
            .limit(limit)
            .all(self.conn)
            .await
    }

    /// Delete entries older than `days_to_keep` days. Returns rows removed.
    pub async fn prune_older_than(&self, days_to_keep: i64) -> Result<u64, DbErr> {
        let cutoff = Utc::now() - Duration::days(days_to_keep);

        let result = plugin_log::Entity::delete_many()
            .filter(plugin_log::Column::CreatedAt.lt(cutoff))
            .exec(self.conn)
            .await?;

        Ok(result.rows_affected)
    }
}
