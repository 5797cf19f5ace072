use super::*;
use gh_app_auth_core::config::PrivateKeySource;
use pretty_assertions::assert_eq;
use std::sync::OnceLock;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_key_pem() -> &'static str {
    static KEY: OnceLock<String> = OnceLock::new();
    KEY.get_or_init(|| {
        use rsa::pkcs8::EncodePrivateKey;
        let mut rng = rand::thread_rng();
        let key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        key.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .unwrap()
            .to_string()
    })
}

fn app(name: &str, app_id: i64, installation_id: i64) -> GitHubApp {
    GitHubApp {
        name: name.to_string(),
        app_id,
        installation_id,
        private_key_source: Some(PrivateKeySource::Keyring),
        private_key_path: None,
        patterns: vec!["github.com/myorg".to_string()],
        priority: 5,
        scope: None,
    }
}

fn pat(name: &str, username: Option<&str>) -> PersonalAccessToken {
    PersonalAccessToken {
        name: name.to_string(),
        patterns: vec!["github.com".to_string()],
        priority: 5,
        token_source: Default::default(),
        username: username.map(str::to_string),
    }
}

async fn authenticator_with_key(
    dir: &tempfile::TempDir,
    server: &MockServer,
    app_name: &str,
) -> Authenticator {
    let store = SecretStore::with_keyring_disabled(dir.path());
    store
        .store(app_name, SecretType::PrivateKey, test_key_pem())
        .await
        .unwrap();
    Authenticator::with_api_base(store, server.uri())
}

fn mount_token_endpoint(installation_id: i64, token: &str) -> Mock {
    Mock::given(method("POST"))
        .and(path(format!(
            "/app/installations/{}/access_tokens",
            installation_id
        )))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "token": token,
            "expires_at": "2030-01-01T00:00:00Z"
        })))
}

#[tokio::test]
async fn test_mint_flow_with_configured_installation() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_token_endpoint(777, "ghs_minted")
        .expect(1)
        .mount(&server)
        .await;

    let authenticator = authenticator_with_key(&dir, &server, "my-app").await;
    let repo = RepoInfo::parse("github.com/myorg/myrepo").unwrap();

    let credentials = authenticator
        .credentials_for_app(&app("my-app", 123, 777), &repo)
        .await
        .unwrap();

    assert_eq!(credentials.username, "my-app[bot]");
    assert_eq!(credentials.token.expose_secret(), "ghs_minted");
}

#[tokio::test]
async fn test_second_call_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    // The mint endpoint may be hit exactly once across both calls.
    mount_token_endpoint(777, "ghs_minted")
        .expect(1)
        .mount(&server)
        .await;

    let authenticator = authenticator_with_key(&dir, &server, "my-app").await;
    let repo = RepoInfo::parse("github.com/myorg/myrepo").unwrap();
    let the_app = app("my-app", 123, 777);

    let first = authenticator
        .credentials_for_app(&the_app, &repo)
        .await
        .unwrap();
    let second = authenticator
        .credentials_for_app(&the_app, &repo)
        .await
        .unwrap();

    assert_eq!(
        first.token.expose_secret(),
        second.token.expose_secret()
    );
}

#[tokio::test]
async fn test_concurrent_cache_misses_mint_once() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_token_endpoint(777, "ghs_single")
        .expect(1)
        .mount(&server)
        .await;

    let authenticator = authenticator_with_key(&dir, &server, "my-app").await;
    let repo = RepoInfo::parse("github.com/myorg/myrepo").unwrap();
    let the_app = app("my-app", 123, 777);

    let (first, second) = tokio::join!(
        authenticator.credentials_for_app(&the_app, &repo),
        authenticator.credentials_for_app(&the_app, &repo),
    );
    assert_eq!(
        first.unwrap().token.expose_secret(),
        second.unwrap().token.expose_secret()
    );
}

#[tokio::test]
async fn test_installation_discovery_when_configured_as_zero() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/myorg/myrepo/installation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 555})))
        .expect(1)
        .mount(&server)
        .await;
    mount_token_endpoint(555, "ghs_discovered")
        .mount(&server)
        .await;

    let authenticator = authenticator_with_key(&dir, &server, "my-app").await;
    let repo = RepoInfo::parse("github.com/myorg/myrepo").unwrap();

    let credentials = authenticator
        .credentials_for_app(&app("my-app", 123, 0), &repo)
        .await
        .unwrap();
    assert_eq!(credentials.token.expose_secret(), "ghs_discovered");
}

#[tokio::test]
async fn test_cache_hit_makes_no_network_calls() {
    let dir = tempfile::tempdir().unwrap();
    // No mocks mounted: any forge call would return a connection error.
    let server = MockServer::start().await;

    let authenticator = authenticator_with_key(&dir, &server, "my-app").await;
    let the_app = app("my-app", 123, 777);
    authenticator
        .token_cache()
        .set(
            &cache_key(123, 777),
            SecretString::new("ghs_primed".to_string()),
            std::time::Duration::from_secs(60),
        )
        .await;

    let repo = RepoInfo::parse("github.com/myorg/myrepo").unwrap();
    let credentials = authenticator
        .credentials_for_app(&the_app, &repo)
        .await
        .unwrap();
    assert_eq!(credentials.token.expose_secret(), "ghs_primed");
}

#[tokio::test]
async fn test_missing_private_key_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let store = SecretStore::with_keyring_disabled(dir.path());
    let authenticator = Authenticator::with_api_base(store, server.uri());

    let repo = RepoInfo::parse("github.com/myorg/myrepo").unwrap();
    let err = authenticator
        .credentials_for_app(&app("keyless", 123, 777), &repo)
        .await
        .unwrap_err();
    assert!(err.is_pass_through());
}

#[tokio::test]
async fn test_private_key_path_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    mount_token_endpoint(777, "ghs_from_file")
        .mount(&server)
        .await;

    let pem_path = dir.path().join("key.pem");
    std::fs::write(&pem_path, test_key_pem()).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&pem_path, std::fs::Permissions::from_mode(0o600)).unwrap();
    }

    let store = SecretStore::with_keyring_disabled(dir.path());
    let authenticator = Authenticator::with_api_base(store, server.uri());
    let mut the_app = app("file-app", 123, 777);
    the_app.private_key_path = Some(pem_path);

    let repo = RepoInfo::parse("github.com/myorg/myrepo").unwrap();
    let credentials = authenticator
        .credentials_for_app(&the_app, &repo)
        .await
        .unwrap();
    assert_eq!(credentials.token.expose_secret(), "ghs_from_file");
}

#[tokio::test]
async fn test_invalidate_app_evicts_cache_entry() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let store = SecretStore::with_keyring_disabled(dir.path());
    let authenticator = Authenticator::with_api_base(store, server.uri());

    let the_app = app("my-app", 123, 777);
    authenticator
        .token_cache()
        .set(
            &cache_key(123, 777),
            SecretString::new("ghs_cached".to_string()),
            std::time::Duration::from_secs(60),
        )
        .await;

    authenticator.invalidate_app(&the_app).await;
    assert!(authenticator
        .token_cache()
        .get(&cache_key(123, 777))
        .await
        .is_none());
}

#[tokio::test]
async fn test_pat_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let store = SecretStore::with_keyring_disabled(dir.path());
    store
        .store("my-pat", SecretType::Pat, "ghp_secret")
        .await
        .unwrap();
    let authenticator = Authenticator::with_api_base(store, server.uri());

    let credentials = authenticator
        .credentials_for_pat(&pat("my-pat", None))
        .await
        .unwrap();
    assert_eq!(credentials.username, "x-access-token");
    assert_eq!(credentials.token.expose_secret(), "ghp_secret");

    let named = authenticator
        .credentials_for_pat(&pat("my-pat", Some("deploy-bot")))
        .await
        .unwrap();
    assert_eq!(named.username, "deploy-bot");
}

#[tokio::test]
async fn test_missing_pat_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let store = SecretStore::with_keyring_disabled(dir.path());
    let authenticator = Authenticator::with_api_base(store, server.uri());

    let err = authenticator
        .credentials_for_pat(&pat("absent", None))
        .await
        .unwrap_err();
    assert!(err.is_pass_through());
}
