use super::*;
use pretty_assertions::assert_eq;
use serial_test::serial;

#[test]
fn test_cli_parses_git_credential_with_pattern_hint() {
    // git appends the operation after the helper's own arguments.
    let cli = Cli::try_parse_from([
        "gh-app-auth",
        "git-credential",
        "--pattern",
        "https://github.com/myorg",
        "get",
    ])
    .unwrap();

    match cli.command {
        Commands::GitCredential(args) => {
            assert_eq!(args.pattern.as_deref(), Some("https://github.com/myorg"));
            assert_eq!(args.operation, "get");
        }
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
fn test_cli_parses_setup_with_repeated_patterns() {
    let cli = Cli::try_parse_from([
        "gh-app-auth",
        "setup",
        "--name",
        "ci-app",
        "--app-id",
        "123",
        "--key-path",
        "/tmp/key.pem",
        "--pattern",
        "github.com/a",
        "--pattern",
        "github.com/b",
    ])
    .unwrap();

    match cli.command {
        Commands::Setup(args) => {
            assert_eq!(args.patterns.len(), 2);
            assert_eq!(args.priority, DEFAULT_PRIORITY);
            assert_eq!(args.installation_id, 0);
        }
        other => panic!("unexpected command: {:?}", other),
    }
}

#[test]
fn test_cli_rejects_setup_without_patterns() {
    assert!(Cli::try_parse_from(["gh-app-auth", "setup", "--name", "x", "--app-id", "1"]).is_err());
}

#[test]
fn test_cli_rejects_app_id_with_pat() {
    assert!(Cli::try_parse_from([
        "gh-app-auth",
        "setup",
        "--name",
        "x",
        "--pat",
        "--app-id",
        "1",
        "--pattern",
        "github.com",
    ])
    .is_err());
}

#[test]
#[serial]
fn test_debug_log_path_resolution() {
    std::env::remove_var(DEBUG_LOG_ENV);
    assert_eq!(debug_log_path().unwrap(), None);

    std::env::set_var(DEBUG_LOG_ENV, "/tmp/gh-app-auth-debug.log");
    assert_eq!(
        debug_log_path().unwrap(),
        Some(PathBuf::from("/tmp/gh-app-auth-debug.log"))
    );

    std::env::set_var(DEBUG_LOG_ENV, "1");
    let path = debug_log_path().unwrap().unwrap();
    assert!(path.ends_with("debug.log"));

    std::env::remove_var(DEBUG_LOG_ENV);
}

#[tokio::test]
#[serial]
async fn test_migrate_dry_run_leaves_config_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.yml");

    let mut config = AuthConfig::new();
    config.github_apps.push(GitHubApp {
        name: "fs-app".to_string(),
        app_id: 1,
        installation_id: 0,
        private_key_source: Some(PrivateKeySource::Filesystem),
        private_key_path: Some(dir.path().join("key.pem")),
        patterns: vec!["github.com/myorg".to_string()],
        priority: DEFAULT_PRIORITY,
        scope: None,
    });
    config.save(&config_path).await.unwrap();
    let before = std::fs::read(&config_path).unwrap();

    std::env::set_var(gh_app_auth_core::config::CONFIG_PATH_ENV, &config_path);
    let code = execute_migrate(MigrateArgs {
        storage: Some("keyring".to_string()),
        dry_run: true,
        force: false,
    })
    .await
    .unwrap();
    std::env::remove_var(gh_app_auth_core::config::CONFIG_PATH_ENV);

    assert_eq!(code, 0);
    let after = std::fs::read(&config_path).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_host_for_app() {
    let mut app = GitHubApp {
        name: "a".to_string(),
        app_id: 1,
        installation_id: 0,
        private_key_source: Some(PrivateKeySource::Keyring),
        private_key_path: None,
        patterns: vec!["https://ghe.example.com/team/*".to_string()],
        priority: DEFAULT_PRIORITY,
        scope: None,
    };
    assert_eq!(host_for_app(&app).unwrap(), "ghe.example.com");

    app.patterns = vec!["  ".to_string()];
    assert!(host_for_app(&app).is_err());
}
