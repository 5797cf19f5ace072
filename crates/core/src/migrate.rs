//! Secret storage migration
//!
//! Moves App private keys between the keyring and filesystem tiers. The
//! engine classifies providers, moves each secret through the store, and
//! rewrites the configuration's source tags; the CLI decides when to persist
//! and how to report.

use crate::config::{AuthConfig, PrivateKeySource};
use crate::errors::{CoreResult, Error};
use crate::secrets::{read_key_file, SecretStore, SecretType, StorageBackend};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

/// Classification of every configured App against a migration target.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    /// The tier secrets will be moved into
    pub target: StorageBackend,
    /// Whether a keyring target was downgraded to filesystem because the
    /// keyring is unavailable
    pub downgraded: bool,
    /// Apps whose key is not yet in the target tier
    pub to_migrate: Vec<String>,
    /// Apps already storing their key in the target tier
    pub up_to_date: Vec<String>,
    /// Apps using the legacy inline source; these need manual re-setup
    pub needs_attention: Vec<String>,
}

impl MigrationPlan {
    /// Whether executing this plan would change anything.
    pub fn is_noop(&self) -> bool {
        self.to_migrate.is_empty()
    }
}

/// Outcome of executing a migration plan.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Apps whose key now lives in the target tier
    pub migrated: Vec<String>,
    /// Apps that failed, with the failure message; the batch continues past
    /// individual failures
    pub failed: Vec<(String, String)>,
}

impl MigrationReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Moves secrets between storage tiers.
#[derive(Debug)]
pub struct MigrationEngine<'a> {
    store: &'a SecretStore,
}

impl<'a> MigrationEngine<'a> {
    pub fn new(store: &'a SecretStore) -> Self {
        Self { store }
    }

    /// Classify every App against `requested`. A keyring target is downgraded
    /// to filesystem when the keyring probe fails.
    pub async fn plan(&self, config: &AuthConfig, requested: StorageBackend) -> MigrationPlan {
        let mut target = requested;
        let mut downgraded = false;
        if requested == StorageBackend::Keyring && !self.store.is_available().await {
            warn!("keyring unavailable; downgrading migration target to filesystem");
            target = StorageBackend::Filesystem;
            downgraded = true;
        }

        let mut plan = MigrationPlan {
            target,
            downgraded,
            to_migrate: Vec::new(),
            up_to_date: Vec::new(),
            needs_attention: Vec::new(),
        };

        for app in &config.github_apps {
            match app.private_key_source {
                Some(PrivateKeySource::Inline) => plan.needs_attention.push(app.name.clone()),
                // Documents from old versions carry no source tag at all.
                None => plan.to_migrate.push(app.name.clone()),
                Some(source) if source == source_for(target) => {
                    plan.up_to_date.push(app.name.clone())
                }
                Some(_) => plan.to_migrate.push(app.name.clone()),
            }
        }
        plan
    }

    /// Execute `plan` against `config`, mutating source tags in place. The
    /// caller persists the configuration afterwards (and may skip persisting
    /// when nothing migrated). Per-app failures do not abort the batch.
    pub async fn execute(
        &self,
        config: &mut AuthConfig,
        plan: &MigrationPlan,
        force: bool,
    ) -> MigrationReport {
        let mut report = MigrationReport::default();

        for name in &plan.to_migrate {
            match self.migrate_app(config, name, plan.target, force).await {
                Ok(()) => {
                    info!(app = %name, target = %plan.target, "migrated private key");
                    report.migrated.push(name.clone());
                }
                Err(e) => {
                    warn!(app = %name, error = %e, "migration failed");
                    report.failed.push((name.clone(), e.to_string()));
                }
            }
        }
        report
    }

    async fn migrate_app(
        &self,
        config: &mut AuthConfig,
        name: &str,
        target: StorageBackend,
        force: bool,
    ) -> CoreResult<()> {
        let (key_path, old_source) = {
            let app = config
                .find_app(name)
                .ok_or_else(|| Error::missing_provider(name))?;
            (app.private_key_path.clone(), app.key_source())
        };

        // Locate the current key: the store first, then the configured PEM
        // file as a fallback for keys that never entered the store.
        let mut origin_tier = None;
        let mut from_user_file = false;
        let value: SecretString = match self.store.get(name, SecretType::PrivateKey).await {
            Ok((value, backend)) => {
                origin_tier = Some(backend);
                value
            }
            Err(Error::NotFound { .. }) => match &key_path {
                Some(path) => {
                    from_user_file = true;
                    let bytes = read_key_file(path)?;
                    SecretString::new(String::from_utf8_lossy(&bytes).into_owned())
                }
                None => return Err(Error::not_found(name, SecretType::PrivateKey.to_string())),
            },
            Err(e) => return Err(e),
        };

        self.store
            .store_in(target, name, SecretType::PrivateKey, value.expose_secret())
            .await?;

        // Retire the copy in the tier we moved away from.
        if let Some(origin) = origin_tier {
            if origin != target {
                if let Err(e) = self
                    .store
                    .delete_in(origin, name, SecretType::PrivateKey)
                    .await
                {
                    debug!(app = %name, error = %e, "could not remove origin copy");
                }
            }
        }

        let secrets_file = self.store.secret_file_path(name, SecretType::PrivateKey);
        let app = config
            .find_app_mut(name)
            .ok_or_else(|| Error::missing_provider(name))?;
        app.private_key_source = Some(source_for(target));

        match target {
            StorageBackend::Filesystem => {
                // The filesystem source requires a readable path on record.
                if app.private_key_path.is_none() {
                    app.private_key_path = Some(secrets_file);
                }
            }
            StorageBackend::Keyring => {
                if force && from_user_file {
                    if let Some(path) = app.private_key_path.take() {
                        tokio::fs::remove_file(&path).await?;
                        info!(app = %name, path = %path.display(), "removed original key file");
                    }
                } else {
                    debug!(app = %name, source = %old_source_label(old_source), "key file retained as fallback");
                }
            }
        }

        Ok(())
    }
}

fn source_for(backend: StorageBackend) -> PrivateKeySource {
    match backend {
        StorageBackend::Keyring => PrivateKeySource::Keyring,
        StorageBackend::Filesystem => PrivateKeySource::Filesystem,
    }
}

fn old_source_label(source: PrivateKeySource) -> &'static str {
    match source {
        PrivateKeySource::Keyring => "keyring",
        PrivateKeySource::Filesystem => "filesystem",
        PrivateKeySource::Inline => "inline",
    }
}

#[cfg(test)]
#[path = "migrate_tests.rs"]
mod tests;
