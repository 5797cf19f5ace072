//! Provider configuration for gh-app-auth
//!
//! This module handles loading, validating, and persisting the provider
//! configuration from a YAML document. The document holds GitHub Apps and
//! personal access tokens together with their URL patterns; secret material
//! is never part of it, only a storage-source tag.

use crate::errors::{CoreResult, Error};
use crate::repo_url::RepoInfo;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Format version written to new configuration documents
pub const CONFIG_VERSION: &str = "1.0";

/// Environment variable overriding the configuration file path
pub const CONFIG_PATH_ENV: &str = "GH_APP_AUTH_CONFIG";

/// Default priority assigned to providers that do not specify one
pub const DEFAULT_PRIORITY: i64 = 5;

/// How long a fetched installation scope stays usable
pub const SCOPE_CACHE_TTL_HOURS: i64 = 24;

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

/// The persistent provider configuration document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Document format version
    pub version: String,
    /// Configured GitHub Apps, in priority-relevant input order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub github_apps: Vec<GitHubApp>,
    /// Configured personal access tokens
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pats: Vec<PersonalAccessToken>,
}

/// Where a GitHub App's private key is stored at rest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivateKeySource {
    /// OS-native keyring (preferred)
    Keyring,
    /// A PEM file on disk
    Filesystem,
    /// Key material embedded in the document. Legacy; rejected by validation
    /// and only tolerated so `migrate` can classify it.
    Inline,
}

impl std::fmt::Display for PrivateKeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keyring => f.write_str("keyring"),
            Self::Filesystem => f.write_str("filesystem"),
            Self::Inline => f.write_str("inline"),
        }
    }
}

/// Where a personal access token is stored at rest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    /// OS-native keyring (preferred)
    #[default]
    Keyring,
    /// The filesystem secrets tier
    Filesystem,
}

/// A GitHub App registered with the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubApp {
    /// Unique provider name; also the secret-store key
    pub name: String,
    /// The forge-assigned App ID
    pub app_id: i64,
    /// Installation ID; `0` means "discover from the requested repository"
    #[serde(default)]
    pub installation_id: i64,
    /// Private-key storage source. Absent in documents written by old
    /// versions, which stored keys on the keyring without recording it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_source: Option<PrivateKeySource>,
    /// PEM file path; required for the filesystem source and retained as a
    /// fallback when the source is the keyring
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_path: Option<PathBuf>,
    /// URL prefixes this App serves
    pub patterns: Vec<String>,
    /// Match priority; higher wins a prefix-length tie
    #[serde(default = "default_priority")]
    pub priority: i64,
    /// Cached installation scope, if it has been fetched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<InstallationScope>,
}

impl GitHubApp {
    /// The effective key source; unset documents default to the keyring.
    pub fn key_source(&self) -> PrivateKeySource {
        self.private_key_source
            .unwrap_or(PrivateKeySource::Keyring)
    }

    /// Whether the cached scope is missing or past its expiry.
    pub fn needs_scope_refresh(&self) -> bool {
        match &self.scope {
            Some(scope) => scope.is_expired(),
            None => true,
        }
    }
}

/// A personal access token registered with the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalAccessToken {
    /// Unique provider name; also the secret-store key
    pub name: String,
    /// URL prefixes this token serves
    pub patterns: Vec<String>,
    /// Match priority; higher wins a prefix-length tie
    #[serde(default = "default_priority")]
    pub priority: i64,
    /// Token storage source
    #[serde(default)]
    pub token_source: TokenSource,
    /// Username emitted with the token; defaults to `x-access-token`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl PersonalAccessToken {
    /// The username to pair with this token on the wire.
    pub fn effective_username(&self) -> &str {
        match self.username.as_deref() {
            Some(u) if !u.is_empty() => u,
            _ => "x-access-token",
        }
    }
}

/// Which repositories an App installation may act on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositorySelection {
    /// Every repository in the installing account
    All,
    /// An explicit allowlist of repositories
    Selected,
}

/// A repository named by a `selected` installation scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedRepository {
    /// `owner/name` as reported by the forge
    pub full_name: String,
    /// Whether the repository is private
    pub private: bool,
}

/// Cached description of an App installation's repository access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationScope {
    /// `all` or `selected`
    pub repository_selection: RepositorySelection,
    /// Login of the installing account
    pub account_login: String,
    /// Kind of the installing account (`User` or `Organization`)
    pub account_type: String,
    /// Allowlisted repositories; meaningful when selection is `selected`
    #[serde(default)]
    pub repositories: Vec<ScopedRepository>,
    /// When this scope was fetched from the forge
    pub last_fetched: DateTime<Utc>,
    /// The installation's own `updated_at`, when the forge reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// When this cache entry stops being usable
    pub cache_expiry: DateTime<Utc>,
}

impl InstallationScope {
    /// The expiry for a scope fetched at `fetched`.
    pub fn expiry_for(fetched: DateTime<Utc>) -> DateTime<Utc> {
        fetched + Duration::hours(SCOPE_CACHE_TTL_HOURS)
    }

    /// Whether the cached entry is past its expiry.
    pub fn is_expired(&self) -> bool {
        self.cache_expiry < Utc::now()
    }

    /// Whether a repository reference falls inside this scope.
    ///
    /// `all` admits any repository owned by the installing account (login
    /// comparison is ASCII case-insensitive, matching forge semantics).
    /// `selected` requires exact-case `full_name` membership. References
    /// shorter than `host/owner` (or `host/owner/repo` for `selected`) are
    /// out of scope.
    pub fn permits(&self, repo: &RepoInfo) -> bool {
        if repo.owner.is_empty() {
            return false;
        }
        match self.repository_selection {
            RepositorySelection::All => repo.owner.eq_ignore_ascii_case(&self.account_login),
            RepositorySelection::Selected => {
                if repo.repo.is_empty() {
                    return false;
                }
                let full_name = format!("{}/{}", repo.owner, repo.repo);
                self.repositories.iter().any(|r| r.full_name == full_name)
            }
        }
    }
}

impl AuthConfig {
    /// Create an empty document at the current format version.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            github_apps: Vec::new(),
            pats: Vec::new(),
        }
    }

    /// Resolve the configuration file path: `$GH_APP_AUTH_CONFIG` when set,
    /// otherwise `<home>/.config/gh/extensions/gh-app-auth/config.yml`.
    pub fn resolve_path() -> CoreResult<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.trim().is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        let home = dirs::home_dir()
            .ok_or_else(|| Error::invalid_config("cannot determine home directory"))?;
        Ok(home.join(".config/gh/extensions/gh-app-auth/config.yml"))
    }

    /// The directory holding the configuration file and the secrets tier.
    pub fn config_dir(config_path: &Path) -> PathBuf {
        config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Load and validate the document at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` when the file cannot be read, `Error::Yaml` when
    /// it is not valid YAML, and `Error::InvalidConfig` when an invariant is
    /// violated (including the legacy inline key source).
    pub async fn load(path: &Path) -> CoreResult<Self> {
        let config = Self::load_unvalidated(path).await?;
        config.validate()?;
        Ok(config)
    }

    /// Load the document without invariant validation. Used by the migration
    /// engine, which must be able to see documents that strict loading
    /// rejects (legacy inline keys).
    pub async fn load_unvalidated(path: &Path) -> CoreResult<Self> {
        debug!(path = %path.display(), "loading provider configuration");
        let contents = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Persist the document to `path` atomically.
    ///
    /// The document is serialized into a temporary file in the target
    /// directory and renamed over the destination, so concurrent readers see
    /// either the old or the new document, never a partial write. The file is
    /// created with mode `0600` and its directory with `0700`.
    pub async fn save(&self, path: &Path) -> CoreResult<()> {
        self.validate_for_save()?;
        let yaml = serde_yaml::to_string(self)?;

        let dir = Self::config_dir(path);
        create_private_dir(&dir).await?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            use std::io::Write;
            tmp.write_all(yaml.as_bytes())?;
            tmp.flush()?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))?;
        }
        tmp.persist(path).map_err(|e| Error::Io { source: e.error })?;

        info!(path = %path.display(), "persisted provider configuration");
        Ok(())
    }

    /// Whether the document holds no providers at all.
    pub fn is_empty(&self) -> bool {
        self.github_apps.is_empty() && self.pats.is_empty()
    }

    /// Find a GitHub App by name.
    pub fn find_app(&self, name: &str) -> Option<&GitHubApp> {
        self.github_apps.iter().find(|a| a.name == name)
    }

    /// Find a GitHub App by name, mutably.
    pub fn find_app_mut(&mut self, name: &str) -> Option<&mut GitHubApp> {
        self.github_apps.iter_mut().find(|a| a.name == name)
    }

    /// Find a personal access token by name.
    pub fn find_pat(&self, name: &str) -> Option<&PersonalAccessToken> {
        self.pats.iter().find(|p| p.name == name)
    }

    /// Remove the provider (App or PAT) with the given name. Returns whether
    /// anything was removed.
    pub fn remove_provider(&mut self, name: &str) -> bool {
        let before = self.github_apps.len() + self.pats.len();
        self.github_apps.retain(|a| a.name != name);
        self.pats.retain(|p| p.name != name);
        before != self.github_apps.len() + self.pats.len()
    }

    /// Check every document invariant.
    pub fn validate(&self) -> CoreResult<()> {
        self.validate_for_save()?;
        for app in &self.github_apps {
            if app.key_source() == PrivateKeySource::Inline {
                return Err(Error::invalid_config(format!(
                    "app '{}' uses the legacy inline private key source; \
                     run `gh-app-auth migrate` to move it to supported storage",
                    app.name
                )));
            }
        }
        Ok(())
    }

    // Invariants that must hold even for documents carrying legacy apps, so
    // migration can rewrite them.
    fn validate_for_save(&self) -> CoreResult<()> {
        let mut names = HashSet::new();
        let mut app_ids = HashSet::new();

        for app in &self.github_apps {
            if app.name.trim().is_empty() {
                return Err(Error::invalid_config("app with empty name"));
            }
            if !names.insert(app.name.clone()) {
                return Err(Error::invalid_config(format!(
                    "duplicate provider name '{}'",
                    app.name
                )));
            }
            if app.app_id <= 0 {
                return Err(Error::invalid_config(format!(
                    "app '{}' has non-positive app_id {}",
                    app.name, app.app_id
                )));
            }
            if !app_ids.insert(app.app_id) {
                return Err(Error::invalid_config(format!(
                    "duplicate app_id {}",
                    app.app_id
                )));
            }
            if app.installation_id < 0 {
                return Err(Error::invalid_config(format!(
                    "app '{}' has negative installation_id",
                    app.name
                )));
            }
            validate_patterns(&app.name, &app.patterns)?;
            if app.key_source() == PrivateKeySource::Filesystem
                && app.private_key_path.is_none()
            {
                return Err(Error::invalid_config(format!(
                    "app '{}' uses the filesystem key source but has no private_key_path",
                    app.name
                )));
            }
        }

        for pat in &self.pats {
            if pat.name.trim().is_empty() {
                return Err(Error::invalid_config("PAT with empty name"));
            }
            if !names.insert(pat.name.clone()) {
                return Err(Error::invalid_config(format!(
                    "duplicate provider name '{}'",
                    pat.name
                )));
            }
            validate_patterns(&pat.name, &pat.patterns)?;
        }

        Ok(())
    }
}

fn validate_patterns(name: &str, patterns: &[String]) -> CoreResult<()> {
    if patterns.is_empty() {
        return Err(Error::invalid_config(format!(
            "provider '{}' has no patterns",
            name
        )));
    }
    for pattern in patterns {
        if pattern.trim().is_empty() {
            return Err(Error::invalid_config(format!(
                "provider '{}' has an empty pattern",
                name
            )));
        }
    }
    Ok(())
}

/// Create `dir` (and parents) with owner-only permissions.
pub async fn create_private_dir(dir: &Path) -> CoreResult<()> {
    if dir.exists() {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).await?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
