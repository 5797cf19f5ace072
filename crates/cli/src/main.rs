//! Command-line interface for gh-app-auth
//!
//! This binary is both the management CLI (setup, list, scope, migrate) and
//! the credential helper git invokes (`gh-app-auth git-credential get`).

use clap::{Args, Parser, Subcommand};
use gh_app_auth_core::config::{
    AuthConfig, GitHubApp, PersonalAccessToken, PrivateKeySource, TokenSource, DEFAULT_PRIORITY,
};
use gh_app_auth_core::matcher::{canonicalize, Matcher, Provider};
use gh_app_auth_core::migrate::MigrationEngine;
use gh_app_auth_core::repo_url::RepoInfo;
use gh_app_auth_core::secrets::{read_key_file, SecretStore, SecretType, StorageBackend};
use gh_app_auth_github_client::auth::Authenticator;
use gh_app_auth_github_client::jwt::JwtSigner;
use gh_app_auth_github_client::token_cache::SWEEP_INTERVAL;
use gh_app_auth_github_client::scope;
use secrecy::ExposeSecret;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod errors;
mod gitconfig;
mod helper;

use errors::{CliError, CliResult};
use helper::HelperEnv;

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;

/// Environment variable enabling the diagnostic log file
const DEBUG_LOG_ENV: &str = "GH_APP_AUTH_DEBUG_LOG";

/// gh-app-auth CLI
#[derive(Parser, Debug)]
#[command(name = "gh-app-auth")]
#[command(about = "Authenticate git to code-hosting services with GitHub App tokens")]
#[command(long_about = r#"
gh-app-auth is a git credential helper that mints short-lived GitHub App
installation tokens on demand (or serves stored personal access tokens),
selecting the right credential for each repository URL by configured
patterns.
"#)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a GitHub App or personal access token
    Setup(SetupArgs),
    /// List configured providers
    List,
    /// Remove a provider and its stored secrets
    Remove(RemoveArgs),
    /// Resolve a URL against the configuration and mint credentials for it
    Test(TestArgs),
    /// Run as a git credential helper (invoked by git)
    GitCredential(GitCredentialArgs),
    /// Show or refresh cached installation scopes
    Scope(ScopeArgs),
    /// Move App private keys between storage backends
    Migrate(MigrateArgs),
    /// Print or install the git configuration pointing at this helper
    Gitconfig(GitconfigArgs),
}

#[derive(Args, Debug)]
struct SetupArgs {
    /// Provider name
    #[arg(long)]
    name: String,

    /// GitHub App ID
    #[arg(long, conflicts_with = "pat")]
    app_id: Option<i64>,

    /// Installation ID; 0 discovers it from the requested repository
    #[arg(long, default_value_t = 0)]
    installation_id: i64,

    /// Path to the App's private key (PEM)
    #[arg(long, conflicts_with = "pat")]
    key_path: Option<PathBuf>,

    /// Register a personal access token instead; the token is read from
    /// standard input
    #[arg(long)]
    pat: bool,

    /// Username paired with the token (PAT only)
    #[arg(long)]
    username: Option<String>,

    /// URL prefix served by this provider (repeatable)
    #[arg(long = "pattern", required = true)]
    patterns: Vec<String>,

    /// Match priority; higher wins prefix-length ties
    #[arg(long, default_value_t = DEFAULT_PRIORITY)]
    priority: i64,
}

#[derive(Args, Debug)]
struct RemoveArgs {
    /// Name of the provider to remove
    name: String,
}

#[derive(Args, Debug)]
struct TestArgs {
    /// Repository URL or host to resolve
    url: String,
}

#[derive(Args, Debug)]
struct GitCredentialArgs {
    /// URL prefix under which this helper was configured in git
    #[arg(long)]
    pattern: Option<String>,

    /// Protocol operation requested by git: get, store, or erase
    operation: String,
}

#[derive(Args, Debug)]
struct ScopeArgs {
    /// Re-fetch scopes even when the cached copy is still fresh
    #[arg(long)]
    refresh: bool,

    /// Only this App (default: all configured Apps)
    name: Option<String>,
}

#[derive(Args, Debug)]
struct MigrateArgs {
    /// Target storage backend: keyring (default) or filesystem
    #[arg(long)]
    storage: Option<String>,

    /// Show what would be migrated without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Delete original key files after a successful move to the keyring
    #[arg(long)]
    force: bool,
}

#[derive(Args, Debug)]
struct GitconfigArgs {
    /// Install the configuration instead of printing it
    #[arg(long)]
    sync: bool,

    /// Write to the global git configuration (default)
    #[arg(long, conflicts_with = "local")]
    global: bool,

    /// Write to the repository-local git configuration
    #[arg(long)]
    local: bool,
}

/// Open the secret store rooted next to the configuration file.
fn open_store(config_path: &std::path::Path) -> SecretStore {
    SecretStore::new(&AuthConfig::config_dir(config_path))
}

async fn load_config_or_fail(config_path: &std::path::Path) -> CliResult<AuthConfig> {
    if !config_path.exists() {
        return Err(CliError::invalid_argument(
            "config",
            format!(
                "no configuration at {}; run `gh-app-auth setup` first",
                config_path.display()
            ),
        ));
    }
    Ok(AuthConfig::load(config_path).await?)
}

fn backend_source(backend: StorageBackend) -> PrivateKeySource {
    match backend {
        StorageBackend::Keyring => PrivateKeySource::Keyring,
        StorageBackend::Filesystem => PrivateKeySource::Filesystem,
    }
}

/// Execute the setup command
async fn execute_setup(args: SetupArgs) -> CliResult<i32> {
    let config_path = AuthConfig::resolve_path()?;
    let store = open_store(&config_path);
    let mut config = if config_path.exists() {
        AuthConfig::load(&config_path).await?
    } else {
        AuthConfig::new()
    };

    if config.find_app(&args.name).is_some() || config.find_pat(&args.name).is_some() {
        return Err(CliError::invalid_argument(
            "--name",
            format!("provider '{}' already exists", args.name),
        ));
    }

    if args.pat {
        let mut token = String::new();
        std::io::stdin().read_to_string(&mut token)?;
        let token = token.trim();
        if token.is_empty() {
            return Err(CliError::invalid_argument(
                "--pat",
                "no token on standard input",
            ));
        }

        let backend = store.store(&args.name, SecretType::Pat, token).await?;
        config.pats.push(PersonalAccessToken {
            name: args.name.clone(),
            patterns: args.patterns,
            priority: args.priority,
            token_source: match backend {
                StorageBackend::Keyring => TokenSource::Keyring,
                StorageBackend::Filesystem => TokenSource::Filesystem,
            },
            username: args.username,
        });
        config.save(&config_path).await?;
        println!("Registered PAT '{}' ({} storage)", args.name, backend);
    } else {
        let app_id = args.app_id.ok_or_else(|| {
            CliError::invalid_argument("--app-id", "required when registering an App")
        })?;
        let key_path = args.key_path.ok_or_else(|| {
            CliError::invalid_argument("--key-path", "required when registering an App")
        })?;

        let pem = read_key_file(&key_path)?;
        // Prove the key parses and signs before anything is persisted.
        JwtSigner::new().sign(app_id, &pem)?;
        let pem_str = std::str::from_utf8(&pem).map_err(|_| {
            CliError::from(gh_app_auth_github_client::Error::invalid_key_format(
                "key file is not valid UTF-8 PEM",
            ))
        })?;

        let backend = store
            .store(&args.name, SecretType::PrivateKey, pem_str)
            .await?;
        config.github_apps.push(GitHubApp {
            name: args.name.clone(),
            app_id,
            installation_id: args.installation_id,
            private_key_source: Some(backend_source(backend)),
            private_key_path: Some(key_path),
            patterns: args.patterns,
            priority: args.priority,
            scope: None,
        });
        config.save(&config_path).await?;
        println!(
            "Registered App '{}' (app id {}, {} storage)",
            args.name, app_id, backend
        );
    }

    println!("Run `gh-app-auth gitconfig --sync` to wire this helper into git.");
    Ok(0)
}

/// Execute the list command
async fn execute_list() -> CliResult<i32> {
    let config_path = AuthConfig::resolve_path()?;
    if !config_path.exists() {
        println!("No providers configured.");
        return Ok(0);
    }
    let config = AuthConfig::load(&config_path).await?;
    if config.is_empty() {
        println!("No providers configured.");
        return Ok(0);
    }

    for app in &config.github_apps {
        let scope_summary = match &app.scope {
            Some(scope) => {
                let state = if scope.is_expired() { "expired" } else { "fresh" };
                match scope.repository_selection {
                    gh_app_auth_core::config::RepositorySelection::All => {
                        format!("all repos of {} ({})", scope.account_login, state)
                    }
                    gh_app_auth_core::config::RepositorySelection::Selected => {
                        format!("{} selected repos ({})", scope.repositories.len(), state)
                    }
                }
            }
            None => "not fetched".to_string(),
        };
        println!(
            "app  {:<20} app_id={:<8} installation={:<8} priority={:<3} key={:<10} scope: {}",
            app.name,
            app.app_id,
            app.installation_id,
            app.priority,
            app.key_source(),
            scope_summary
        );
        for pattern in &app.patterns {
            println!("       pattern: {}", pattern);
        }
    }
    for pat in &config.pats {
        println!(
            "pat  {:<20} username={:<16} priority={:<3}",
            pat.name,
            pat.effective_username(),
            pat.priority
        );
        for pattern in &pat.patterns {
            println!("       pattern: {}", pattern);
        }
    }
    Ok(0)
}

/// Execute the remove command
async fn execute_remove(args: RemoveArgs) -> CliResult<i32> {
    let config_path = AuthConfig::resolve_path()?;
    let mut config = load_config_or_fail(&config_path).await?;
    let store = open_store(&config_path);

    let secret_type = if config.find_app(&args.name).is_some() {
        SecretType::PrivateKey
    } else if config.find_pat(&args.name).is_some() {
        SecretType::Pat
    } else {
        return Err(gh_app_auth_core::Error::missing_provider(&args.name).into());
    };

    config.remove_provider(&args.name);
    if let Err(e) = store.delete(&args.name, secret_type).await {
        debug!(error = %e, "no stored secret to delete");
    }
    config.save(&config_path).await?;
    println!("Removed provider '{}'.", args.name);
    Ok(0)
}

/// Execute the test command
async fn execute_test(args: TestArgs) -> CliResult<i32> {
    let repo = RepoInfo::parse(&args.url)?;
    let config_path = AuthConfig::resolve_path()?;
    let config = load_config_or_fail(&config_path).await?;

    let Some(provider) = Matcher::new(&config).select(&repo, None) else {
        println!("No provider matches {}.", repo.fullpath());
        return Ok(1);
    };

    let kind = match provider {
        Provider::App(_) => "App",
        Provider::Pat(_) => "PAT",
    };
    println!("{} matches {} '{}'.", repo.fullpath(), kind, provider.name());

    let authenticator = Authenticator::new(open_store(&config_path));
    let credentials = match provider {
        Provider::App(app) => authenticator.credentials_for_app(app, &repo).await?,
        Provider::Pat(pat) => authenticator.credentials_for_pat(pat).await?,
    };

    let token = credentials.token.expose_secret();
    let tail: String = token
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    println!(
        "Credentials OK: username={} password=****{} ({} chars)",
        credentials.username,
        tail,
        token.len()
    );
    Ok(0)
}

/// Execute the git-credential command
async fn execute_git_credential(args: GitCredentialArgs) -> CliResult<i32> {
    let config_path = AuthConfig::resolve_path()?;
    let authenticator = Authenticator::new(open_store(&config_path));
    let env = HelperEnv {
        authenticator: &authenticator,
        config_path: &config_path,
        pattern_hint: args.pattern.as_deref(),
    };
    let stdin = std::io::stdin();

    match args.operation.as_str() {
        "get" => {
            let shutdown = CancellationToken::new();
            let sweeper = authenticator
                .token_cache()
                .spawn_sweeper(SWEEP_INTERVAL, shutdown.clone());

            let result = helper::run_get(&env, stdin.lock(), std::io::stdout()).await;

            shutdown.cancel();
            let _ = sweeper.await;

            match result {
                Ok(_) => Ok(0),
                Err(e) if e.is_silent_fallthrough() => {
                    debug!(error = %e, "falling through to the next credential helper");
                    Ok(0)
                }
                Err(e) => Err(e),
            }
        }
        "store" => {
            helper::run_store(stdin.lock())?;
            Ok(0)
        }
        "erase" => {
            helper::run_erase(&env, stdin.lock()).await?;
            Ok(0)
        }
        other => Err(CliError::invalid_argument(
            "operation",
            format!("unknown operation '{}'; expected get, store, or erase", other),
        )),
    }
}

/// Execute the scope command
async fn execute_scope(args: ScopeArgs) -> CliResult<i32> {
    let config_path = AuthConfig::resolve_path()?;
    let mut config = load_config_or_fail(&config_path).await?;
    let authenticator = Authenticator::new(open_store(&config_path));

    if let Some(name) = &args.name {
        if config.find_app(name).is_none() {
            return Err(gh_app_auth_core::Error::missing_provider(name).into());
        }
    }

    let mut updated = false;
    for app in config.github_apps.iter_mut() {
        if let Some(filter) = &args.name {
            if &app.name != filter {
                continue;
            }
        }

        if args.refresh || app.needs_scope_refresh() {
            let host = host_for_app(app)?;
            let pem = authenticator.load_private_key(app).await?;
            let jwt = authenticator.signer().sign(app.app_id, &pem)?;
            let forge = authenticator.forge_for(&host)?;
            let installation_id = scope::resolve_installation_id(&forge, &jwt, app).await?;
            let fetched = scope::fetch_scope(&forge, &jwt, installation_id).await?;
            info!(app = %app.name, "refreshed installation scope");
            app.scope = Some(fetched);
            updated = true;
        }

        let Some(scope) = app.scope.as_ref() else {
            continue;
        };
        match scope.repository_selection {
            gh_app_auth_core::config::RepositorySelection::All => {
                println!(
                    "{}: all repositories of {} ({})",
                    app.name, scope.account_login, scope.account_type
                );
            }
            gh_app_auth_core::config::RepositorySelection::Selected => {
                println!(
                    "{}: {} selected repositories of {}",
                    app.name,
                    scope.repositories.len(),
                    scope.account_login
                );
                for repo in &scope.repositories {
                    let visibility = if repo.private { "private" } else { "public" };
                    println!("    {} ({})", repo.full_name, visibility);
                }
            }
        }
    }

    if updated {
        config.save(&config_path).await?;
    }
    Ok(0)
}

/// The forge host an App's patterns point at, from its first pattern.
fn host_for_app(app: &GitHubApp) -> CliResult<String> {
    let first = app
        .patterns
        .first()
        .map(|p| canonicalize(p))
        .unwrap_or_default();
    let host = first.split('/').next().unwrap_or("").to_string();
    if host.is_empty() {
        return Err(gh_app_auth_core::Error::invalid_config(format!(
            "app '{}' has no usable pattern to derive a host from",
            app.name
        ))
        .into());
    }
    Ok(host)
}

/// Execute the migrate command
async fn execute_migrate(args: MigrateArgs) -> CliResult<i32> {
    let target = match args.storage.as_deref() {
        None | Some("keyring") => StorageBackend::Keyring,
        Some("filesystem") => StorageBackend::Filesystem,
        Some(other) => {
            return Err(CliError::invalid_argument(
                "--storage",
                format!("'{}' is not a backend; expected keyring or filesystem", other),
            ))
        }
    };

    let config_path = AuthConfig::resolve_path()?;
    if !config_path.exists() {
        println!("No configuration; nothing to migrate.");
        return Ok(0);
    }
    // Lenient load: migration must be able to see legacy documents that
    // strict loading rejects.
    let mut config = AuthConfig::load_unvalidated(&config_path).await?;
    let store = open_store(&config_path);
    let engine = MigrationEngine::new(&store);

    let plan = engine.plan(&config, target).await;
    if plan.downgraded {
        println!("Keyring unavailable; falling back to filesystem storage.");
    }
    println!("Target storage: {}", plan.target);
    for name in &plan.up_to_date {
        println!("  up to date:      {}", name);
    }
    for name in &plan.to_migrate {
        println!("  to migrate:      {}", name);
    }
    for name in &plan.needs_attention {
        println!("  needs attention: {} (legacy inline key; re-run setup)", name);
    }

    if args.dry_run {
        println!("Dry run; no changes made.");
        return Ok(0);
    }
    if plan.is_noop() {
        println!("Nothing to migrate.");
        return Ok(0);
    }

    let report = engine.execute(&mut config, &plan, args.force).await;
    if !report.migrated.is_empty() {
        config.save(&config_path).await?;
    }

    for name in &report.migrated {
        println!("Migrated '{}' to {}.", name, plan.target);
    }
    for (name, reason) in &report.failed {
        eprintln!("Failed to migrate '{}': {}", name, reason);
    }
    Ok(if report.all_succeeded() { 0 } else { 1 })
}

/// Execute the gitconfig command
async fn execute_gitconfig(args: GitconfigArgs) -> CliResult<i32> {
    let config_path = AuthConfig::resolve_path()?;
    let config = load_config_or_fail(&config_path).await?;

    let exe = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "gh-app-auth".to_string());
    let entries = gitconfig::entries_for(&config, &exe);
    if entries.is_empty() {
        println!("No patterns configured; nothing to install.");
        return Ok(0);
    }

    let global = args.global || !args.local;
    if args.sync {
        gitconfig::sync(&entries, global)?;
        println!("Installed {} credential helper entries.", entries.len());
    } else {
        for command in gitconfig::config_commands(&entries, global) {
            println!("git {}", command.join(" "));
        }
    }
    Ok(0)
}

/// Resolve the diagnostic log file requested via the environment, if any.
fn debug_log_path() -> CliResult<Option<PathBuf>> {
    let Ok(value) = std::env::var(DEBUG_LOG_ENV) else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let path = match trimmed.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => {
            AuthConfig::config_dir(&AuthConfig::resolve_path()?).join("debug.log")
        }
        _ => PathBuf::from(trimmed),
    };
    Ok(Some(path))
}

/// Set up logging. Console output goes to standard error only; standard
/// output belongs to the credential protocol.
fn setup_logging(verbose: bool) -> CliResult<()> {
    let debug_log = debug_log_path()?;
    let filter = if verbose || debug_log.is_some() {
        "debug"
    } else {
        "warn"
    };

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry()
        .with(console)
        .with(tracing_subscriber::EnvFilter::new(filter));

    match debug_log {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Arc::new(file)),
                )
                .init();
        }
        None => registry.init(),
    }
    Ok(())
}

async fn run(cli: Cli) -> CliResult<i32> {
    match cli.command {
        Commands::Setup(args) => execute_setup(args).await,
        Commands::List => execute_list().await,
        Commands::Remove(args) => execute_remove(args).await,
        Commands::Test(args) => execute_test(args).await,
        Commands::GitCredential(args) => execute_git_credential(args).await,
        Commands::Scope(args) => execute_scope(args).await,
        Commands::Migrate(args) => execute_migrate(args).await,
        Commands::Gitconfig(args) => execute_gitconfig(args).await,
    }
}

/// Main entry point for the CLI application
#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = setup_logging(cli.verbose) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };
    std::process::exit(code);
}
