//! git configuration wiring
//!
//! Builds the `credential.<url>.helper` entries that point git at this
//! binary, one per configured pattern prefix. `useHttpPath` is set alongside
//! each helper so git sends the repository path on the second stage of the
//! credential dance; without it, path-based matching never sees a path.

use crate::errors::{CliError, CliResult};
use gh_app_auth_core::config::AuthConfig;
use gh_app_auth_core::matcher::canonicalize;
use std::collections::HashSet;
use tracing::info;

/// One `credential.<url>` block to install into git configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperEntry {
    /// The URL prefix git will match requests against
    pub url: String,
    /// The helper command line, carrying its own pattern hint
    pub helper: String,
}

/// Compute the helper entries for every configured pattern, deduplicated in
/// document order.
pub fn entries_for(config: &AuthConfig, exe: &str) -> Vec<HelperEntry> {
    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    let all_patterns = config
        .github_apps
        .iter()
        .flat_map(|a| a.patterns.iter())
        .chain(config.pats.iter().flat_map(|p| p.patterns.iter()));

    for pattern in all_patterns {
        let prefix = canonicalize(pattern);
        if prefix.is_empty() {
            continue;
        }
        let url = format!("https://{}", prefix);
        if seen.insert(url.clone()) {
            entries.push(HelperEntry {
                helper: format!("!{} git-credential --pattern {}", exe, url),
                url,
            });
        }
    }
    entries
}

/// The `git config` invocations (as argument vectors) that install `entries`.
pub fn config_commands(entries: &[HelperEntry], global: bool) -> Vec<Vec<String>> {
    let scope = if global { "--global" } else { "--local" };
    let mut commands = Vec::new();
    for entry in entries {
        commands.push(vec![
            "config".to_string(),
            scope.to_string(),
            format!("credential.{}.helper", entry.url),
            entry.helper.clone(),
        ]);
        commands.push(vec![
            "config".to_string(),
            scope.to_string(),
            format!("credential.{}.useHttpPath", entry.url),
            "true".to_string(),
        ]);
    }
    commands
}

/// Run the `git config` invocations for `entries`.
pub fn sync(entries: &[HelperEntry], global: bool) -> CliResult<()> {
    for args in config_commands(entries, global) {
        let output = std::process::Command::new("git")
            .args(&args)
            .output()
            .map_err(|e| {
                CliError::command_execution("git", format!("failed to run git: {}", e))
            })?;
        if !output.status.success() {
            return Err(CliError::command_execution(
                "git",
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
    }
    info!(entries = entries.len(), "installed credential helper configuration");
    Ok(())
}

#[cfg(test)]
#[path = "gitconfig_tests.rs"]
mod tests;
