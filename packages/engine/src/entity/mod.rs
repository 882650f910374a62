pub mod plugin;
pub mod plugin_configuration;
pub mod plugin_log;
pub mod plugin_schedule;
pub mod user_plugin;
