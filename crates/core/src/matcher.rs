//! Provider selection for repository URLs
//!
//! Given the configured providers and a normalized repository reference, the
//! matcher picks the single best provider: longest matching pattern prefix,
//! then highest priority, then earliest position in the document. GitHub Apps
//! carrying a cached installation scope are additionally filtered by it.
//!
//! Patterns, request paths, and helper hints are all reduced to one canonical
//! form here (scheme stripped, `/*` and trailing slashes removed); no other
//! module normalizes patterns.

use crate::config::{AuthConfig, GitHubApp, InstallationScope, PersonalAccessToken};
use crate::repo_url::RepoInfo;
use tracing::debug;

/// A configured provider, as seen by the matcher and its callers.
#[derive(Debug, Clone, Copy)]
pub enum Provider<'a> {
    /// A GitHub App minting installation tokens
    App(&'a GitHubApp),
    /// A stored personal access token
    Pat(&'a PersonalAccessToken),
}

impl<'a> Provider<'a> {
    /// The provider's unique name.
    pub fn name(&self) -> &'a str {
        match self {
            Self::App(app) => &app.name,
            Self::Pat(pat) => &pat.name,
        }
    }

    /// The provider's URL patterns, as configured.
    pub fn patterns(&self) -> &'a [String] {
        match self {
            Self::App(app) => &app.patterns,
            Self::Pat(pat) => &pat.patterns,
        }
    }

    /// The provider's match priority.
    pub fn priority(&self) -> i64 {
        match self {
            Self::App(app) => app.priority,
            Self::Pat(pat) => pat.priority,
        }
    }

    fn scope(&self) -> Option<&'a InstallationScope> {
        match self {
            Self::App(app) => app.scope.as_ref(),
            Self::Pat(_) => None,
        }
    }
}

/// Reduce a pattern (or hint, or request path) to canonical form: trimmed,
/// scheme stripped, trailing `/*` and `/` removed. An empty result means the
/// pattern is ignored.
pub fn canonicalize(pattern: &str) -> String {
    let mut p = pattern.trim();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = p.strip_prefix(scheme) {
            p = rest;
            break;
        }
    }
    if let Some(rest) = p.strip_suffix("/*") {
        p = rest;
    }
    p.trim_end_matches('/').to_string()
}

/// Segment-boundary prefix test: `github.com/myorg` covers
/// `github.com/myorg` and `github.com/myorg/...`, never
/// `github.com/myorg-other/...`.
fn is_path_prefix(prefix: &str, path: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// A hint narrows the candidate set to providers whose pattern and the hint
/// lie on the same prefix chain, in either direction.
fn hint_compatible(prefix: &str, hint: &str) -> bool {
    is_path_prefix(prefix, hint) || is_path_prefix(hint, prefix)
}

/// Selects the best provider for a repository reference.
#[derive(Debug)]
pub struct Matcher<'a> {
    providers: Vec<Provider<'a>>,
}

impl<'a> Matcher<'a> {
    /// Build a matcher over a configuration document. Apps enumerate before
    /// PATs; within each kind, document order is preserved.
    pub fn new(config: &'a AuthConfig) -> Self {
        let mut providers = Vec::with_capacity(config.github_apps.len() + config.pats.len());
        providers.extend(config.github_apps.iter().map(Provider::App));
        providers.extend(config.pats.iter().map(Provider::Pat));
        Self { providers }
    }

    /// Select the provider for `repo`, or `None` when nothing matches.
    ///
    /// `pattern_hint` is the URL prefix under which the credential helper was
    /// configured in git, when known; it narrows the candidate set but never
    /// overrides the longest-prefix rule.
    pub fn select(&self, repo: &RepoInfo, pattern_hint: Option<&str>) -> Option<Provider<'a>> {
        let hint = pattern_hint
            .map(canonicalize)
            .filter(|h| !h.is_empty());

        if repo.is_host_only() {
            return self.select_host_only(&repo.host, hint.as_deref());
        }

        let path = repo.fullpath();
        let mut best: Option<Candidate<'a>> = None;

        for (position, provider) in self.providers.iter().enumerate() {
            let Some(prefix_len) = self.longest_matching_prefix(provider, &path, hint.as_deref())
            else {
                continue;
            };

            // Scope-carrying apps must also admit the repository.
            if let Some(scope) = provider.scope() {
                if !scope.permits(repo) {
                    debug!(
                        provider = provider.name(),
                        path = %path,
                        "pattern matched but repository is outside the cached scope"
                    );
                    continue;
                }
            }

            let candidate = Candidate {
                provider: *provider,
                prefix_len,
                priority: provider.priority(),
                position,
            };
            best = Some(match best.take() {
                None => candidate,
                Some(current) if candidate.beats(&current) => candidate,
                Some(current) => current,
            });
        }

        best.map(|c| {
            debug!(provider = c.provider.name(), path = %path, "selected provider");
            c.provider
        })
    }

    /// For a host-only reference, return the first provider with a pattern
    /// equal to the host or starting with `<host>/`.
    fn select_host_only(&self, host: &str, hint: Option<&str>) -> Option<Provider<'a>> {
        for provider in &self.providers {
            for pattern in provider.patterns() {
                let prefix = canonicalize(pattern);
                if prefix.is_empty() {
                    continue;
                }
                if let Some(hint) = hint {
                    if !hint_compatible(&prefix, hint) {
                        continue;
                    }
                }
                if prefix == host || prefix.starts_with(&format!("{}/", host)) {
                    return Some(*provider);
                }
            }
        }
        None
    }

    /// The longest canonical pattern prefix of `provider` covering `path`,
    /// honoring the hint filter. `None` when no pattern matches.
    fn longest_matching_prefix(
        &self,
        provider: &Provider<'a>,
        path: &str,
        hint: Option<&str>,
    ) -> Option<usize> {
        let mut longest = None;
        for pattern in provider.patterns() {
            let prefix = canonicalize(pattern);
            if prefix.is_empty() {
                continue;
            }
            if let Some(hint) = hint {
                if !hint_compatible(&prefix, hint) {
                    continue;
                }
            }
            if is_path_prefix(&prefix, path) {
                longest = Some(longest.map_or(prefix.len(), |l: usize| l.max(prefix.len())));
            }
        }
        longest
    }
}

#[derive(Debug)]
struct Candidate<'a> {
    provider: Provider<'a>,
    prefix_len: usize,
    priority: i64,
    position: usize,
}

impl Candidate<'_> {
    /// Longest prefix wins; priority breaks prefix ties; earlier document
    /// position breaks priority ties.
    fn beats(&self, other: &Self) -> bool {
        (self.prefix_len, self.priority, std::cmp::Reverse(self.position))
            > (other.prefix_len, other.priority, std::cmp::Reverse(other.position))
    }
}

#[cfg(test)]
#[path = "matcher_tests.rs"]
mod tests;
