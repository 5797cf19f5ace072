//! Installation scope retrieval
//!
//! Fetches which repositories an App installation may act on, for the
//! matcher's scope filter. Enumerating a `selected` installation's allowlist
//! requires exchanging the App JWT for an installation token first, since the
//! repository listing endpoint only accepts installation auth. Persisting the
//! fetched scope is the caller's responsibility.

use crate::errors::{Error, GitHubResult};
use crate::ForgeClient;
use chrono::Utc;
use gh_app_auth_core::config::{
    GitHubApp, InstallationScope, RepositorySelection, ScopedRepository,
};
use tracing::{debug, instrument};

/// Fetch a fresh scope for one installation.
#[instrument(skip(forge, app_jwt))]
pub async fn fetch_scope(
    forge: &ForgeClient,
    app_jwt: &str,
    installation_id: i64,
) -> GitHubResult<InstallationScope> {
    let installation = forge.get_installation(app_jwt, installation_id).await?;

    let selection = match installation.repository_selection.as_deref() {
        Some("selected") => RepositorySelection::Selected,
        _ => RepositorySelection::All,
    };

    let (account_login, account_type) = installation
        .account
        .map(|a| (a.login, a.account_type))
        .unwrap_or_default();

    let repositories = match selection {
        RepositorySelection::All => Vec::new(),
        RepositorySelection::Selected => {
            let minted = forge
                .create_installation_token(app_jwt, installation_id)
                .await?;
            forge
                .list_installation_repositories(&minted.token)
                .await?
                .into_iter()
                .map(|r| ScopedRepository {
                    full_name: r.full_name,
                    private: r.private,
                })
                .collect()
        }
    };

    debug!(
        installation_id,
        account = %account_login,
        repositories = repositories.len(),
        "fetched installation scope"
    );

    let now = Utc::now();
    Ok(InstallationScope {
        repository_selection: selection,
        account_login,
        account_type,
        repositories,
        last_fetched: now,
        last_updated: installation.updated_at,
        cache_expiry: InstallationScope::expiry_for(now),
    })
}

/// Resolve the installation ID to fetch scope for: the configured one, or the
/// App's sole installation when the configuration says "discover" (`0`).
pub async fn resolve_installation_id(
    forge: &ForgeClient,
    app_jwt: &str,
    app: &GitHubApp,
) -> GitHubResult<i64> {
    if app.installation_id != 0 {
        return Ok(app.installation_id);
    }

    let installations = forge.list_installations(app_jwt).await?;
    match installations.as_slice() {
        [only] => Ok(only.id),
        [] => Err(Error::Core {
            source: gh_app_auth_core::Error::invalid_config(format!(
                "app '{}' has no installations on the forge",
                app.name
            )),
        }),
        many => Err(Error::Core {
            source: gh_app_auth_core::Error::invalid_config(format!(
                "app '{}' has {} installations; set installation_id explicitly",
                app.name,
                many.len()
            )),
        }),
    }
}

#[cfg(test)]
#[path = "scope_tests.rs"]
mod tests;
