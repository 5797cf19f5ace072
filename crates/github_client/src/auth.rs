//! Credential orchestration
//!
//! The [`Authenticator`] composes the secret store, JWT signer, forge client,
//! and token cache into the two credential pipelines: minting short-lived
//! installation tokens for GitHub Apps, and serving stored personal access
//! tokens. One authenticator is built per invocation and owns all
//! process-wide state (the token cache and the parsed-key cache).

use crate::errors::GitHubResult;
use crate::jwt::JwtSigner;
use crate::token_cache::{cache_key, TokenCache};
use crate::ForgeClient;
use gh_app_auth_core::config::{GitHubApp, PersonalAccessToken};
use gh_app_auth_core::repo_url::RepoInfo;
use gh_app_auth_core::secrets::{read_key_file, SecretStore, SecretType};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, instrument};
use zeroize::Zeroizing;

/// Cache TTL for minted installation tokens. The forge hands out one-hour
/// tokens; 55 minutes leaves headroom so a cached token is never served
/// moments before it dies.
pub const INSTALLATION_TOKEN_TTL: std::time::Duration =
    std::time::Duration::from_secs(55 * 60);

/// A username/token pair ready for the credential protocol.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    /// The bearer token (kept secret, zeroed on drop)
    pub token: SecretString,
}

/// Per-invocation credential engine.
#[derive(Debug)]
pub struct Authenticator {
    store: SecretStore,
    signer: JwtSigner,
    cache: TokenCache,
    /// Serializes minting so concurrent requests that all miss the cache
    /// produce one network exchange, not one each.
    mint_lock: tokio::sync::Mutex<()>,
    api_base_override: Option<String>,
}

impl Authenticator {
    pub fn new(store: SecretStore) -> Self {
        Self {
            store,
            signer: JwtSigner::new(),
            cache: TokenCache::new(),
            mint_lock: tokio::sync::Mutex::new(()),
            api_base_override: None,
        }
    }

    /// Route every forge call to a fixed API base instead of deriving it
    /// from the request host. Tests point this at a mock server.
    pub fn with_api_base(store: SecretStore, api_base: impl Into<String>) -> Self {
        Self {
            api_base_override: Some(api_base.into()),
            ..Self::new(store)
        }
    }

    /// The token cache backing this authenticator.
    pub fn token_cache(&self) -> &TokenCache {
        &self.cache
    }

    /// The JWT signer backing this authenticator.
    pub fn signer(&self) -> &JwtSigner {
        &self.signer
    }

    /// The secret store backing this authenticator.
    pub fn store(&self) -> &SecretStore {
        &self.store
    }

    /// Build the forge client serving `host`.
    pub fn forge_for(&self, host: &str) -> GitHubResult<ForgeClient> {
        match &self.api_base_override {
            Some(base) => ForgeClient::with_api_base(base.clone()),
            None => ForgeClient::for_host(host),
        }
    }

    /// Produce credentials for an App against a repository.
    ///
    /// A live cache entry short-circuits the pipeline with zero network
    /// calls. Otherwise: load the private key, sign a JWT, resolve the
    /// installation (when the configuration says "discover"), mint an
    /// installation token, and cache it.
    #[instrument(skip(self), fields(app = %app.name, repo = %repo))]
    pub async fn credentials_for_app(
        &self,
        app: &GitHubApp,
        repo: &RepoInfo,
    ) -> GitHubResult<Credentials> {
        let username = format!("{}[bot]", app.name);
        let key = cache_key(app.app_id, app.installation_id);

        if let Some(hit) = self.cache.get(&key).await {
            debug!("serving cached installation token");
            return Ok(Credentials {
                username,
                token: hit.token,
            });
        }

        // Single-flight: whoever loses the race re-checks the cache and
        // finds the winner's token instead of minting again.
        let _minting = self.mint_lock.lock().await;
        if let Some(hit) = self.cache.get(&key).await {
            debug!("token minted by a concurrent request");
            return Ok(Credentials {
                username,
                token: hit.token,
            });
        }

        let pem = self.load_private_key(app).await?;
        let jwt = self.signer.sign(app.app_id, &pem)?;
        let forge = self.forge_for(&repo.host)?;

        let installation_id = if app.installation_id == 0 {
            let discovered = forge
                .find_repo_installation(&jwt, &repo.owner, &repo.repo)
                .await?;
            debug!(installation_id = discovered.id, "discovered installation from repository");
            discovered.id
        } else {
            app.installation_id
        };

        let minted = forge
            .create_installation_token(&jwt, installation_id)
            .await?;
        let token = SecretString::new(minted.token);
        self.cache
            .set(&key, token.clone(), INSTALLATION_TOKEN_TTL)
            .await;

        info!(installation_id, "minted installation token");
        Ok(Credentials { username, token })
    }

    /// Produce credentials for a stored personal access token.
    #[instrument(skip(self), fields(pat = %pat.name))]
    pub async fn credentials_for_pat(
        &self,
        pat: &PersonalAccessToken,
    ) -> GitHubResult<Credentials> {
        let (token, backend) = self.store.get(&pat.name, SecretType::Pat).await?;
        debug!(%backend, "loaded personal access token");
        Ok(Credentials {
            username: pat.effective_username().to_string(),
            token,
        })
    }

    /// Drop any cached token for an App. Best-effort; a fresh process has an
    /// empty cache anyway.
    pub async fn invalidate_app(&self, app: &GitHubApp) {
        self.cache
            .delete(&cache_key(app.app_id, app.installation_id))
            .await;
    }

    /// Load an App's private key: the secret store first, then the
    /// configured PEM path as a fallback for keys that never entered the
    /// store.
    pub async fn load_private_key(&self, app: &GitHubApp) -> GitHubResult<Zeroizing<Vec<u8>>> {
        match self.store.get(&app.name, SecretType::PrivateKey).await {
            Ok((pem, backend)) => {
                debug!(%backend, "loaded private key from secret store");
                Ok(Zeroizing::new(pem.expose_secret().as_bytes().to_vec()))
            }
            Err(e @ gh_app_auth_core::Error::NotFound { .. }) => {
                match app.private_key_path.as_ref() {
                    Some(path) => {
                        debug!(path = %path.display(), "loading private key from configured file");
                        Ok(read_key_file(path)?)
                    }
                    None => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
