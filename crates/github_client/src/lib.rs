//! Forge REST client for gh-app-auth
//!
//! Speaks the minimal subset of the GitHub-compatible REST API needed to
//! discover installations and mint installation tokens, against github.com
//! or any GitHub Enterprise-style host (`https://<host>/api/v3`).

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

pub mod auth;
pub mod errors;
pub mod jwt;
pub mod scope;
pub mod token_cache;

pub use errors::{Error, GitHubResult};

/// Hard deadline applied to every forge request
pub const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

const USER_AGENT: &str = concat!("gh-app-auth/", env!("CARGO_PKG_VERSION"));
const ACCEPT_V3: &str = "application/vnd.github.v3+json";
const ACCEPT: &str = "application/vnd.github+json";
const PER_PAGE: usize = 100;

/// The API base URL for a forge host: `api.github.com` for github.com,
/// `https://<host>/api/v3` for everything else.
pub fn api_base_for_host(host: &str) -> String {
    if host == "github.com" {
        "https://api.github.com".to_string()
    } else {
        format!("https://{}/api/v3", host)
    }
}

/// An App installation as reported by the forge. Fields beyond `id` are
/// present only on the endpoints that return them.
#[derive(Debug, Clone, Deserialize)]
pub struct Installation {
    pub id: i64,
    #[serde(default)]
    pub account: Option<Account>,
    #[serde(default)]
    pub repository_selection: Option<String>,
    #[serde(default)]
    pub target_type: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// The account an App is installed on
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub login: String,
    #[serde(rename = "type")]
    pub account_type: String,
}

/// A freshly minted installation access token
#[derive(Debug, Deserialize)]
pub struct InstallationToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// A repository visible to an installation
#[derive(Debug, Clone, Deserialize)]
pub struct RepositorySummary {
    pub full_name: String,
    pub private: bool,
}

#[derive(Debug, Deserialize)]
struct InstallationRepositories {
    #[serde(default)]
    repositories: Vec<RepositorySummary>,
}

/// HTTPS/JSON client for one forge host.
#[derive(Debug, Clone)]
pub struct ForgeClient {
    http: reqwest::Client,
    api_base: String,
}

impl ForgeClient {
    /// Build a client for `host`, routing to its canonical API base.
    pub fn for_host(host: &str) -> GitHubResult<Self> {
        Self::with_api_base(api_base_for_host(host))
    }

    /// Build a client against an explicit API base URL. Tests point this at
    /// a local mock server.
    pub fn with_api_base(api_base: impl Into<String>) -> GitHubResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Network { source: e })?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// The API base this client talks to.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// List every installation of the App (JWT auth).
    #[instrument(skip(self, app_jwt))]
    pub async fn list_installations(&self, app_jwt: &str) -> GitHubResult<Vec<Installation>> {
        let url = format!("{}/app/installations", self.api_base);
        let request = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, ACCEPT_V3)
            .bearer_auth(app_jwt);
        self.execute(request, &url, StatusCode::OK).await
    }

    /// Discover the installation covering one repository (JWT auth).
    #[instrument(skip(self, app_jwt))]
    pub async fn find_repo_installation(
        &self,
        app_jwt: &str,
        owner: &str,
        repo: &str,
    ) -> GitHubResult<Installation> {
        let url = format!("{}/repos/{}/{}/installation", self.api_base, owner, repo);
        let request = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, ACCEPT_V3)
            .bearer_auth(app_jwt);
        self.execute(request, &url, StatusCode::OK).await
    }

    /// Fetch one installation, including its repository selection (JWT auth).
    #[instrument(skip(self, app_jwt))]
    pub async fn get_installation(
        &self,
        app_jwt: &str,
        installation_id: i64,
    ) -> GitHubResult<Installation> {
        let url = format!("{}/app/installations/{}", self.api_base, installation_id);
        let request = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .bearer_auth(app_jwt);
        self.execute(request, &url, StatusCode::OK).await
    }

    /// Mint an installation access token (JWT auth; the forge answers 201).
    #[instrument(skip(self, app_jwt))]
    pub async fn create_installation_token(
        &self,
        app_jwt: &str,
        installation_id: i64,
    ) -> GitHubResult<InstallationToken> {
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base, installation_id
        );
        let request = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, ACCEPT_V3)
            .bearer_auth(app_jwt)
            .json(&serde_json::json!({}));
        self.execute(request, &url, StatusCode::CREATED).await
    }

    /// Enumerate every repository visible to an installation, following
    /// pagination (installation-token auth).
    #[instrument(skip(self, installation_token))]
    pub async fn list_installation_repositories(
        &self,
        installation_token: &str,
    ) -> GitHubResult<Vec<RepositorySummary>> {
        let mut repositories = Vec::new();
        let mut page = 1usize;
        loop {
            let url = format!(
                "{}/installation/repositories?per_page={}&page={}",
                self.api_base, PER_PAGE, page
            );
            let request = self
                .http
                .get(&url)
                .header(reqwest::header::ACCEPT, ACCEPT)
                .header(
                    reqwest::header::AUTHORIZATION,
                    format!("token {}", installation_token),
                );
            let batch: InstallationRepositories =
                self.execute(request, &url, StatusCode::OK).await?;
            let count = batch.repositories.len();
            repositories.extend(batch.repositories);
            if count < PER_PAGE {
                break;
            }
            page += 1;
        }
        debug!(count = repositories.len(), "enumerated installation repositories");
        Ok(repositories)
    }

    /// Send a request, demand `expect`, and decode the JSON body. Any other
    /// status surfaces as a forge API error carrying the raw body.
    async fn execute<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        expect: StatusCode,
    ) -> GitHubResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::from_request(url, e))?;

        let status = response.status();
        if status != expect {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::forge_api(status.as_u16(), body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::from_request(url, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
