use super::*;
use crate::config::GitHubApp;
use pretty_assertions::assert_eq;
use secrecy::ExposeSecret;

fn app_with_source(name: &str, app_id: i64, source: Option<PrivateKeySource>) -> GitHubApp {
    GitHubApp {
        name: name.to_string(),
        app_id,
        installation_id: 0,
        private_key_source: source,
        private_key_path: None,
        patterns: vec!["github.com/myorg".to_string()],
        priority: 5,
        scope: None,
    }
}

fn disabled_store(dir: &tempfile::TempDir) -> SecretStore {
    SecretStore::with_keyring_disabled(dir.path())
}

#[tokio::test]
async fn test_plan_classification() {
    let dir = tempfile::tempdir().unwrap();
    let store = disabled_store(&dir);
    let engine = MigrationEngine::new(&store);

    let mut config = AuthConfig::new();
    config
        .github_apps
        .push(app_with_source("in-target", 1, Some(PrivateKeySource::Filesystem)));
    config
        .github_apps
        .push(app_with_source("in-keyring", 2, Some(PrivateKeySource::Keyring)));
    config
        .github_apps
        .push(app_with_source("legacy-unset", 3, None));
    config
        .github_apps
        .push(app_with_source("legacy-inline", 4, Some(PrivateKeySource::Inline)));

    let plan = engine.plan(&config, StorageBackend::Filesystem).await;

    assert_eq!(plan.target, StorageBackend::Filesystem);
    assert!(!plan.downgraded);
    assert_eq!(plan.up_to_date, vec!["in-target"]);
    assert_eq!(plan.to_migrate, vec!["in-keyring", "legacy-unset"]);
    assert_eq!(plan.needs_attention, vec!["legacy-inline"]);
}

#[tokio::test]
async fn test_plan_downgrades_unavailable_keyring_target() {
    let dir = tempfile::tempdir().unwrap();
    let store = disabled_store(&dir);
    let engine = MigrationEngine::new(&store);

    let config = AuthConfig::new();
    let plan = engine.plan(&config, StorageBackend::Keyring).await;

    assert_eq!(plan.target, StorageBackend::Filesystem);
    assert!(plan.downgraded);
}

#[tokio::test]
async fn test_execute_preserves_secret_content() {
    let dir = tempfile::tempdir().unwrap();
    let store = disabled_store(&dir);
    let engine = MigrationEngine::new(&store);

    // The key sits in the store, but the document still claims the keyring.
    store
        .store("stale-tag", SecretType::PrivateKey, "THE-KEY")
        .await
        .unwrap();

    let mut config = AuthConfig::new();
    config
        .github_apps
        .push(app_with_source("stale-tag", 1, Some(PrivateKeySource::Keyring)));

    let before = store
        .get("stale-tag", SecretType::PrivateKey)
        .await
        .unwrap()
        .0;

    let plan = engine.plan(&config, StorageBackend::Filesystem).await;
    assert_eq!(plan.to_migrate, vec!["stale-tag"]);
    let report = engine.execute(&mut config, &plan, false).await;

    assert!(report.all_succeeded());
    assert_eq!(report.migrated, vec!["stale-tag"]);

    let after = store
        .get("stale-tag", SecretType::PrivateKey)
        .await
        .unwrap()
        .0;
    assert_eq!(before.expose_secret(), after.expose_secret());

    let app = config.find_app("stale-tag").unwrap();
    assert_eq!(app.key_source(), PrivateKeySource::Filesystem);
    assert!(app.private_key_path.is_some());
}

#[tokio::test]
async fn test_execute_picks_up_key_from_configured_pem_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = disabled_store(&dir);
    let engine = MigrationEngine::new(&store);

    let pem_path = dir.path().join("user-key.pem");
    std::fs::write(&pem_path, "USER-PEM").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&pem_path, std::fs::Permissions::from_mode(0o600)).unwrap();
    }

    let mut config = AuthConfig::new();
    let mut app = app_with_source("from-file", 1, None);
    app.private_key_path = Some(pem_path.clone());
    config.github_apps.push(app);

    let plan = engine.plan(&config, StorageBackend::Filesystem).await;
    let report = engine.execute(&mut config, &plan, false).await;
    assert!(report.all_succeeded());

    let (value, backend) = store.get("from-file", SecretType::PrivateKey).await.unwrap();
    assert_eq!(value.expose_secret(), "USER-PEM");
    assert_eq!(backend, StorageBackend::Filesystem);

    // Without --force the original PEM file survives.
    assert!(pem_path.exists());
}

#[tokio::test]
async fn test_execute_continues_past_per_app_failures() {
    let dir = tempfile::tempdir().unwrap();
    let store = disabled_store(&dir);
    let engine = MigrationEngine::new(&store);

    store
        .store("healthy", SecretType::PrivateKey, "KEY")
        .await
        .unwrap();

    let mut config = AuthConfig::new();
    config
        .github_apps
        .push(app_with_source("keyless", 1, Some(PrivateKeySource::Keyring)));
    config
        .github_apps
        .push(app_with_source("healthy", 2, Some(PrivateKeySource::Keyring)));

    let plan = engine.plan(&config, StorageBackend::Filesystem).await;
    let report = engine.execute(&mut config, &plan, false).await;

    assert_eq!(report.migrated, vec!["healthy"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "keyless");
    assert!(!report.all_succeeded());
}

#[tokio::test]
async fn test_noop_plan() {
    let dir = tempfile::tempdir().unwrap();
    let store = disabled_store(&dir);
    let engine = MigrationEngine::new(&store);

    let mut config = AuthConfig::new();
    config
        .github_apps
        .push(app_with_source("done", 1, Some(PrivateKeySource::Filesystem)));

    let plan = engine.plan(&config, StorageBackend::Filesystem).await;
    assert!(plan.is_noop());
}
