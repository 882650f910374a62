use plugin_core::{ConfigMap, ExecutionContext};
use sea_orm::EntityTrait;
use serde_json::json;

use engine::entity::{plugin, plugin_configuration, plugin_schedule, user_plugin};
use engine::EngineError;

use crate::common::{TestApp, HYDRATION, NOTES};

mod installation {
    use super::*;

    #[tokio::test]
    async fn install_persists_declared_metadata() {
        let app = TestApp::spawn().await;

        let installed = app.registry.install(HYDRATION).await.unwrap();

        assert_eq!(installed.slug, HYDRATION);
        assert_eq!(installed.name, "Hydration Reminder");
        assert_eq!(installed.version, "1.2.0");
        assert_eq!(installed.icon, "droplet");
        assert!(installed.installed_at.is_some());
        assert!(installed.config_schema.as_array().is_some_and(|a| !a.is_empty()));
        assert_eq!(
            installed.default_config.get("target_ml"),
            Some(&json!(2000))
        );
    }

    #[tokio::test]
    async fn install_is_idempotent() {
        let app = TestApp::spawn().await;

        let first = app.registry.install(HYDRATION).await.unwrap();
        let second = app.registry.install(HYDRATION).await.unwrap();

        assert_eq!(first.id, second.id);

        let definitions = plugin::Entity::find().all(&app.db).await.unwrap();
        assert_eq!(definitions.len(), 1);
    }

    #[tokio::test]
    async fn install_rejects_unregistered_slug() {
        let app = TestApp::spawn().await;

        let err = app.registry.install("no-such-plugin").await.unwrap_err();
        assert!(matches!(err, EngineError::NotRegistered(_)));
    }

    #[tokio::test]
    async fn sync_installs_every_registered_variant() {
        let app = TestApp::spawn().await;
        app.registry.install(HYDRATION).await.unwrap();

        app.registry.sync().await.unwrap();

        let mut slugs: Vec<String> = plugin::Entity::find()
            .all(&app.db)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.slug)
            .collect();
        slugs.sort();
        assert_eq!(slugs, [HYDRATION, NOTES]);
    }

    #[tokio::test]
    async fn uninstall_removes_definition_and_everything_attached() {
        let app = TestApp::spawn().await;
        app.setup_active(7).await;

        let mut overrides = ConfigMap::new();
        overrides.insert("target_ml".into(), json!(3000));
        app.configs.save_config(7, HYDRATION, overrides).await.unwrap();
        app.scheduler.create_default_schedule(7, HYDRATION).await.unwrap();

        assert!(app.registry.uninstall(HYDRATION).await.unwrap());

        assert!(plugin::Entity::find().all(&app.db).await.unwrap().is_empty());
        assert!(user_plugin::Entity::find().all(&app.db).await.unwrap().is_empty());
        assert!(plugin_configuration::Entity::find().all(&app.db).await.unwrap().is_empty());
        assert!(plugin_schedule::Entity::find().all(&app.db).await.unwrap().is_empty());

        // A second uninstall finds nothing to remove.
        assert!(!app.registry.uninstall(HYDRATION).await.unwrap());
    }
}

mod activation {
    use super::*;

    #[tokio::test]
    async fn activation_creates_row_and_runs_hook_once() {
        let app = TestApp::spawn().await;
        app.registry.install(HYDRATION).await.unwrap();

        let activation = app.registry.activate_for_user(HYDRATION, 1).await.unwrap();

        assert!(activation.is_active);
        assert!(activation.activated_at.is_some());
        assert_eq!(app.activations(), 1);
    }

    #[tokio::test]
    async fn reactivation_is_a_noop() {
        let app = TestApp::spawn().await;
        app.registry.install(HYDRATION).await.unwrap();

        let first = app.registry.activate_for_user(HYDRATION, 1).await.unwrap();
        let second = app.registry.activate_for_user(HYDRATION, 1).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.activated_at, second.activated_at);
        assert_eq!(app.activations(), 1);
    }

    #[tokio::test]
    async fn activating_uninstalled_plugin_fails() {
        let app = TestApp::spawn().await;

        let err = app.registry.activate_for_user(HYDRATION, 1).await.unwrap_err();
        assert!(matches!(err, EngineError::NotInstalled(_)));
    }

    #[tokio::test]
    async fn deactivation_cascades_to_schedules() {
        let app = TestApp::spawn().await;
        app.setup_active(1).await;
        let schedule = app
            .scheduler
            .create_default_schedule(1, HYDRATION)
            .await
            .unwrap()
            .unwrap();
        assert!(schedule.is_active);

        let deactivated = app
            .registry
            .deactivate_for_user(HYDRATION, 1)
            .await
            .unwrap()
            .unwrap();
        assert!(!deactivated.is_active);

        let schedule = plugin_schedule::Entity::find_by_id(schedule.id)
            .one(&app.db)
            .await
            .unwrap()
            .unwrap();
        assert!(!schedule.is_active);
    }

    #[tokio::test]
    async fn deactivating_without_activation_returns_none() {
        let app = TestApp::spawn().await;
        app.registry.install(HYDRATION).await.unwrap();

        let result = app.registry.deactivate_for_user(HYDRATION, 1).await.unwrap();
        assert!(result.is_none());
    }
}

mod execution {
    use super::*;

    #[tokio::test]
    async fn execute_requires_installation_then_activation() {
        let app = TestApp::spawn().await;
        let context = ExecutionContext::manual();

        let err = app
            .registry
            .execute_plugin(HYDRATION, 1, &context)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotInstalled(_)));

        app.registry.install(HYDRATION).await.unwrap();

        let err = app
            .registry
            .execute_plugin(HYDRATION, 1, &context)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotActive(_, 1)));
        assert_eq!(app.executions(), 0);
    }

    #[tokio::test]
    async fn manual_execution_sees_effective_config() {
        let app = TestApp::spawn().await;
        app.setup_active(1).await;

        let mut overrides = ConfigMap::new();
        overrides.insert("target_ml".into(), json!(3000));
        app.configs.save_config(1, HYDRATION, overrides).await.unwrap();

        app.registry
            .execute_plugin(HYDRATION, 1, &ExecutionContext::manual())
            .await
            .unwrap();

        assert_eq!(app.executions(), 1);
        let seen = app.probes.last_config.lock().unwrap().clone().unwrap();
        assert_eq!(seen.get("target_ml"), Some(&json!(3000)));
        // Untouched keys come through from the defaults.
        assert_eq!(seen.get("channel"), Some(&json!("push")));
    }
}

mod listing {
    use super::*;

    #[tokio::test]
    async fn plugins_for_user_annotates_activation_state() {
        let app = TestApp::spawn().await;
        app.registry.sync().await.unwrap();
        app.registry.activate_for_user(HYDRATION, 1).await.unwrap();

        let mut listed = app.registry.plugins_for_user(1).await.unwrap();
        listed.sort_by(|a, b| a.plugin.slug.cmp(&b.plugin.slug));

        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].plugin.slug, HYDRATION);
        assert!(listed[0].is_active);
        assert!(listed[0].user_plugin_id.is_some());
        assert_eq!(listed[1].plugin.slug, NOTES);
        assert!(!listed[1].is_active);
        assert!(listed[1].user_plugin_id.is_none());
    }

    #[tokio::test]
    async fn active_plugins_exclude_deactivated_ones() {
        let app = TestApp::spawn().await;
        app.registry.sync().await.unwrap();
        app.registry.activate_for_user(HYDRATION, 1).await.unwrap();
        app.registry.activate_for_user(NOTES, 1).await.unwrap();
        app.registry.deactivate_for_user(NOTES, 1).await.unwrap();

        let active = app.registry.active_plugins_for_user(1).await.unwrap();

        assert_eq!(active.len(), 1);
        assert_eq!(active[0].1.slug, HYDRATION);
    }
}

mod chat {
    use super::*;

    #[tokio::test]
    async fn intents_come_only_from_active_chat_capable_plugins() {
        let app = TestApp::spawn().await;
        app.registry.sync().await.unwrap();

        assert!(app.registry.chat_intents_for_user(1).await.unwrap().is_empty());

        app.registry.activate_for_user(HYDRATION, 1).await.unwrap();
        app.registry.activate_for_user(NOTES, 1).await.unwrap();

        let intents = app.registry.chat_intents_for_user(1).await.unwrap();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].action, "log_intake");
    }

    #[tokio::test]
    async fn intent_routing_requires_active_activation() {
        let app = TestApp::spawn().await;
        app.registry.install(HYDRATION).await.unwrap();

        let err = app
            .registry
            .handle_chat_intent(HYDRATION, 1, "log_intake", &ConfigMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotActive(_, 1)));
    }

    #[tokio::test]
    async fn known_intent_succeeds_and_unknown_degrades_to_failure_outcome() {
        let app = TestApp::spawn().await;
        app.setup_active(1).await;

        let mut entities = ConfigMap::new();
        entities.insert("amount_ml".into(), json!("330"));

        let outcome = app
            .registry
            .handle_chat_intent(HYDRATION, 1, "log_intake", &entities)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.data, Some(json!({ "amount_ml": "330" })));

        let outcome = app
            .registry
            .handle_chat_intent(HYDRATION, 1, "order_coffee", &ConfigMap::new())
            .await
            .unwrap();
        assert!(!outcome.success);
    }
}
