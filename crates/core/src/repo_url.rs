//! Repository URL parsing and normalization
//!
//! Credential requests arrive either as protocol fields from the git
//! credential helper (`host` + `path`) or as free-form references typed by a
//! user (`git@github.com:org/repo.git`, `https://github.com/org/repo`,
//! `github.com/org/repo`). Both forms normalize into a [`RepoInfo`].

use crate::errors::{CoreResult, Error};

/// A normalized reference to a repository, or to a bare host.
///
/// `owner` and `repo` are empty for a host-only reference. For paths deeper
/// than `owner/repo`, the first segment is the owner and the remaining tail is
/// joined into `repo`.
#[derive(Debug, Clone, Eq)]
pub struct RepoInfo {
    /// Forge host, e.g. `github.com` or `ghe.example.com`
    pub host: String,
    /// Repository owner (user or organization); empty for host-only references
    pub owner: String,
    /// Repository name, possibly containing `/` for deep paths; empty for
    /// host-only or owner-only references
    pub repo: String,
    /// The reference as originally supplied, before normalization
    pub raw_url: String,
}

// Equality is over the normalized identity; `raw_url` is provenance only.
impl PartialEq for RepoInfo {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.owner == other.owner && self.repo == other.repo
    }
}

impl RepoInfo {
    /// Parse a free-form repository reference.
    ///
    /// Accepted forms:
    /// * `git@host:owner/repo[.git]`
    /// * `https://host/owner/repo[.git][/]` (also `http://`)
    /// * `host/owner/repo`
    /// * `host` (host-only reference)
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] when the reference is empty or yields no
    /// host after normalization.
    pub fn parse(reference: &str) -> CoreResult<Self> {
        let raw = reference.to_string();
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_url(reference, "empty reference"));
        }

        let mut working = trimmed.to_string();

        // SSH form: drop the user@ prefix and turn `host:path` into `host/path`.
        if let Some(rest) = working.strip_prefix("git@") {
            working = rest.replacen(':', "/", 1);
        }

        let normalized = normalize_path(&working);
        if normalized.is_empty() {
            return Err(Error::invalid_url(reference, "no host in reference"));
        }

        let mut segments = normalized.split('/').filter(|s| !s.is_empty());
        let host = match segments.next() {
            Some(h) => h.to_string(),
            None => return Err(Error::invalid_url(reference, "no host in reference")),
        };
        if host.chars().any(char::is_whitespace) {
            return Err(Error::invalid_url(reference, "whitespace in host"));
        }

        let owner = segments.next().unwrap_or_default().to_string();
        let repo = segments.collect::<Vec<_>>().join("/");

        Ok(Self {
            host,
            owner,
            repo,
            raw_url: raw,
        })
    }

    /// Build a `RepoInfo` from credential-protocol fields (`host` plus an
    /// optional `path`). An empty path yields a host-only reference.
    pub fn from_parts(host: &str, path: &str) -> CoreResult<Self> {
        let host = host.trim();
        if host.is_empty() {
            return Err(Error::invalid_url(host, "empty host"));
        }
        let path = path.trim().trim_matches('/');
        let reference = if path.is_empty() {
            host.to_string()
        } else {
            format!("{}/{}", host, path)
        };
        Self::parse(&reference)
    }

    /// Whether this reference names only a host, with no repository path.
    pub fn is_host_only(&self) -> bool {
        self.owner.is_empty()
    }

    /// The normalized `host/owner/repo` path. Host-only references yield just
    /// the host; owner-only references yield `host/owner`.
    pub fn fullpath(&self) -> String {
        let mut path = self.host.clone();
        if !self.owner.is_empty() {
            path.push('/');
            path.push_str(&self.owner);
            if !self.repo.is_empty() {
                path.push('/');
                path.push_str(&self.repo);
            }
        }
        path
    }

    /// Render the canonical HTTPS URL for this reference.
    pub fn render(&self) -> String {
        format!("https://{}", self.fullpath())
    }
}

impl std::fmt::Display for RepoInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.fullpath())
    }
}

/// Strip scheme, trailing `.git`, and surrounding slashes from a reference.
fn normalize_path(reference: &str) -> String {
    let mut s = reference.trim();

    for scheme in ["https://", "http://"] {
        if let Some(rest) = s.strip_prefix(scheme) {
            s = rest;
            break;
        }
    }

    s = s.trim_matches('/');
    if let Some(rest) = s.strip_suffix(".git") {
        s = rest;
    }
    s.trim_matches('/').to_string()
}

#[cfg(test)]
#[path = "repo_url_tests.rs"]
mod tests;
