//! Git credential-helper protocol
//!
//! Implements the `get`/`store`/`erase` operations git drives over
//! line-delimited `key=value` blocks on stdin/stdout. The guiding rule is
//! silent fallthrough: any condition that just means "we are not the helper
//! for this URL" exits successfully with no output, so git moves on to the
//! next configured helper. Only real failures (unreadable keys, forge
//! errors) surface.
//!
//! `get` is a two-stage dance: git first asks with only the host, which we
//! decline, and (because the helper is configured with `useHttpPath`) asks
//! again with the full repository path we can actually match on.

use crate::errors::{CliError, CliResult};
use gh_app_auth_core::config::{
    AuthConfig, GitHubApp, PrivateKeySource, DEFAULT_PRIORITY,
};
use gh_app_auth_core::matcher::{Matcher, Provider};
use gh_app_auth_core::repo_url::RepoInfo;
use gh_app_auth_core::secrets::{read_key_file, SecretType, StorageBackend};
use gh_app_auth_github_client::auth::{Authenticator, Credentials};
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable carrying an App ID for helper auto-setup
pub const APP_ID_ENV: &str = "GH_APP_ID";
/// Environment variable carrying a private-key path for helper auto-setup
pub const KEY_PATH_ENV: &str = "GH_APP_PRIVATE_KEY_PATH";

/// Everything a helper operation needs from the outside world.
#[derive(Debug)]
pub struct HelperEnv<'a> {
    pub authenticator: &'a Authenticator,
    pub config_path: &'a Path,
    /// URL prefix under which this helper was configured in git, when known
    pub pattern_hint: Option<&'a str>,
}

/// What a `get` run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperOutcome {
    /// Credentials were written to the output
    Emitted,
    /// Nothing written; git should try its next helper
    FallThrough,
}

/// A parsed credential-protocol request block. Unknown keys are retained;
/// later lines override earlier ones of the same key.
#[derive(Debug, Default)]
pub struct CredentialRequest {
    fields: HashMap<String, String>,
}

impl CredentialRequest {
    /// Read `key=value` lines until EOF or the first empty line. A `url=`
    /// line is decomposed into its protocol/host/path (and credential)
    /// fields.
    pub fn parse<R: BufRead>(reader: R) -> CliResult<Self> {
        let mut fields = HashMap::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                break;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if key == "url" {
                for (k, v) in decompose_url(value) {
                    fields.insert(k, v);
                }
            } else {
                fields.insert(key.to_string(), value.to_string());
            }
        }
        Ok(Self { fields })
    }

    pub fn get(&self, key: &str) -> &str {
        self.fields.get(key).map(String::as_str).unwrap_or("")
    }

    pub fn host(&self) -> &str {
        self.get("host")
    }

    pub fn path(&self) -> &str {
        self.get("path")
    }
}

/// Split a `url=` value into protocol fields the way git does:
/// `protocol://[username[:password]@]host[/path]`.
fn decompose_url(url: &str) -> Vec<(String, String)> {
    let (protocol, rest) = url.split_once("://").unwrap_or(("https", url));
    let (authority, path) = match rest.split_once('/') {
        Some((authority, path)) => (authority, path),
        None => (rest, ""),
    };
    let (userinfo, host) = match authority.rsplit_once('@') {
        Some((userinfo, host)) => (userinfo, host),
        None => ("", authority),
    };

    let mut fields = vec![
        ("protocol".to_string(), protocol.to_string()),
        ("host".to_string(), host.to_string()),
    ];
    if !path.is_empty() {
        fields.push(("path".to_string(), path.trim_end_matches('/').to_string()));
    }
    if !userinfo.is_empty() {
        match userinfo.split_once(':') {
            Some((username, password)) => {
                fields.push(("username".to_string(), username.to_string()));
                fields.push(("password".to_string(), password.to_string()));
            }
            None => fields.push(("username".to_string(), userinfo.to_string())),
        }
    }
    fields
}

/// Handle `git-credential get`.
pub async fn run_get<R: BufRead, W: Write>(
    env: &HelperEnv<'_>,
    input: R,
    mut output: W,
) -> CliResult<HelperOutcome> {
    let request = CredentialRequest::parse(input)?;

    if request.host().is_empty() {
        debug!("request has no host; falling through");
        return Ok(HelperOutcome::FallThrough);
    }
    if request.path().is_empty() {
        // First stage: decline so git re-invokes with the full path.
        debug!(host = request.host(), "host-only request; deferring to second stage");
        return Ok(HelperOutcome::FallThrough);
    }

    let repo = RepoInfo::from_parts(request.host(), request.path())?;

    let config = match load_config(env.config_path).await? {
        Some(config) if !config.is_empty() => config,
        _ => {
            debug!("no usable configuration; trying auto-setup");
            return finish_without_match(env, &repo, &mut output).await;
        }
    };

    let Some(provider) = Matcher::new(&config).select(&repo, env.pattern_hint) else {
        debug!(repo = %repo, "no provider matched; trying auto-setup");
        return finish_without_match(env, &repo, &mut output).await;
    };

    let credentials = mint(env, provider, &repo).await?;
    emit(&mut output, &credentials)?;
    Ok(HelperOutcome::Emitted)
}

/// Handle `git-credential store`. Tokens are minted on demand, so there is
/// nothing to persist; the input is consumed and discarded.
pub fn run_store<R: BufRead>(input: R) -> CliResult<()> {
    let _ = CredentialRequest::parse(input)?;
    Ok(())
}

/// Handle `git-credential erase`: best-effort eviction of the cached token
/// for whichever provider serves the named repository. Always succeeds.
pub async fn run_erase<R: BufRead>(env: &HelperEnv<'_>, input: R) -> CliResult<()> {
    let Ok(request) = CredentialRequest::parse(input) else {
        return Ok(());
    };
    if request.host().is_empty() {
        return Ok(());
    }
    let Ok(repo) = RepoInfo::from_parts(request.host(), request.path()) else {
        return Ok(());
    };
    let Ok(Some(config)) = load_config(env.config_path).await else {
        return Ok(());
    };
    if let Some(Provider::App(app)) = Matcher::new(&config).select(&repo, env.pattern_hint) {
        debug!(app = %app.name, "evicting cached token");
        env.authenticator.invalidate_app(app).await;
    }
    Ok(())
}

async fn finish_without_match<W: Write>(
    env: &HelperEnv<'_>,
    repo: &RepoInfo,
    output: &mut W,
) -> CliResult<HelperOutcome> {
    match try_auto_setup(env, repo).await? {
        Some(credentials) => {
            emit(output, &credentials)?;
            Ok(HelperOutcome::Emitted)
        }
        None => Ok(HelperOutcome::FallThrough),
    }
}

/// When nothing matched but `GH_APP_ID` and `GH_APP_PRIVATE_KEY_PATH` are
/// set, register an App for the requested host on the fly and mint with it.
async fn try_auto_setup(
    env: &HelperEnv<'_>,
    repo: &RepoInfo,
) -> CliResult<Option<Credentials>> {
    let Ok(app_id_raw) = std::env::var(APP_ID_ENV) else {
        return Ok(None);
    };
    let Ok(key_path) = std::env::var(KEY_PATH_ENV) else {
        return Ok(None);
    };
    let app_id: i64 = app_id_raw.trim().parse().map_err(|_| {
        CliError::invalid_argument(APP_ID_ENV, format!("'{}' is not an App ID", app_id_raw))
    })?;

    let pem = read_key_file(Path::new(&key_path))?;
    let pem_str = std::str::from_utf8(&pem).map_err(|_| {
        CliError::from(gh_app_auth_github_client::Error::invalid_key_format(
            "key file is not valid UTF-8 PEM",
        ))
    })?;

    let name = format!("app-{}", app_id);
    info!(app = %name, host = %repo.host, "auto-registering App from environment");

    let backend = env
        .authenticator
        .store()
        .store(&name, SecretType::PrivateKey, pem_str)
        .await?;
    let app = GitHubApp {
        name,
        app_id,
        installation_id: 0,
        private_key_source: Some(match backend {
            StorageBackend::Keyring => PrivateKeySource::Keyring,
            StorageBackend::Filesystem => PrivateKeySource::Filesystem,
        }),
        private_key_path: Some(PathBuf::from(key_path)),
        patterns: vec![repo.host.clone()],
        priority: DEFAULT_PRIORITY,
        scope: None,
    };

    let mut config = load_config(env.config_path)
        .await?
        .unwrap_or_else(AuthConfig::new);
    if config.find_app(&app.name).is_none() {
        config.github_apps.push(app.clone());
        config.save(env.config_path).await?;
    }

    let credentials = env.authenticator.credentials_for_app(&app, repo).await?;
    Ok(Some(credentials))
}

async fn mint(
    env: &HelperEnv<'_>,
    provider: Provider<'_>,
    repo: &RepoInfo,
) -> CliResult<Credentials> {
    match provider {
        Provider::App(app) => Ok(env.authenticator.credentials_for_app(app, repo).await?),
        Provider::Pat(pat) => Ok(env.authenticator.credentials_for_pat(pat).await?),
    }
}

fn emit<W: Write>(output: &mut W, credentials: &Credentials) -> CliResult<()> {
    write!(
        output,
        "username={}\npassword={}\n",
        credentials.username,
        credentials.token.expose_secret()
    )?;
    output.flush()?;
    Ok(())
}

async fn load_config(path: &Path) -> CliResult<Option<AuthConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    Ok(Some(AuthConfig::load(path).await?))
}

#[cfg(test)]
#[path = "helper_tests.rs"]
mod tests;
