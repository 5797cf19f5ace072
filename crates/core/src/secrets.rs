//! Two-tier secret storage
//!
//! Secrets (App private keys and personal access tokens) live in the OS
//! keyring when one is reachable, falling back to owner-only files under the
//! configuration directory. Every keyring call runs on a blocking worker
//! bounded by a hard timeout so a wedged secret service can never hang a
//! credential request.

use crate::config::create_private_dir;
use crate::errors::{CoreResult, Error};
use keyring::Entry;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Deadline applied to every individual keyring call
pub const KEYRING_TIMEOUT: Duration = Duration::from_secs(3);

/// Kinds of secret the store can hold. The string form doubles as the
/// keyring user name and the secret-file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretType {
    PrivateKey,
    AccessToken,
    InstallationToken,
    Pat,
}

impl std::fmt::Display for SecretType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PrivateKey => "private_key",
            Self::AccessToken => "access_token",
            Self::InstallationToken => "installation_token",
            Self::Pat => "pat",
        };
        f.write_str(s)
    }
}

/// Which tier ended up holding (or yielding) a secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Keyring,
    Filesystem,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keyring => f.write_str("keyring"),
            Self::Filesystem => f.write_str("filesystem"),
        }
    }
}

/// The two-tier secret store.
#[derive(Debug, Clone)]
pub struct SecretStore {
    secrets_dir: PathBuf,
    keyring_timeout: Duration,
    use_keyring: bool,
}

fn keyring_service(name: &str) -> String {
    format!("gh-app-auth:{}", name)
}

/// Reduce a logical secret name to a safe file stem: the last path component,
/// so a hostile name can never traverse out of the secrets directory.
fn sanitize_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

impl SecretStore {
    /// Create a store rooted at `config_dir` (secrets live in its `secrets/`
    /// subdirectory).
    pub fn new(config_dir: &Path) -> Self {
        Self {
            secrets_dir: config_dir.join("secrets"),
            keyring_timeout: KEYRING_TIMEOUT,
            use_keyring: true,
        }
    }

    /// Create a store that never touches the OS keyring. Used by tests and
    /// by explicit filesystem-only migration targets.
    pub fn with_keyring_disabled(config_dir: &Path) -> Self {
        Self {
            use_keyring: false,
            ..Self::new(config_dir)
        }
    }

    /// The file a secret would occupy in the filesystem tier.
    pub fn secret_file_path(&self, name: &str, secret_type: SecretType) -> PathBuf {
        self.secrets_dir
            .join(format!("{}.{}", sanitize_name(name), secret_type))
    }

    /// Store a secret, preferring the keyring. On keyring success any stale
    /// filesystem copy is removed; on keyring failure or timeout the secret
    /// is written to the filesystem tier instead. Returns the backend that
    /// ultimately holds the value.
    pub async fn store(
        &self,
        name: &str,
        secret_type: SecretType,
        value: &str,
    ) -> CoreResult<StorageBackend> {
        if self.use_keyring {
            let service = keyring_service(name);
            let user = secret_type.to_string();
            let value_owned = Zeroizing::new(value.to_string());
            match self
                .keyring_call("store", move || {
                    Entry::new(&service, &user)?.set_password(&value_owned)
                })
                .await
            {
                Ok(Ok(())) => {
                    let stale = self.secret_file_path(name, secret_type);
                    if tokio::fs::remove_file(&stale).await.is_ok() {
                        debug!(path = %stale.display(), "removed stale filesystem copy");
                    }
                    return Ok(StorageBackend::Keyring);
                }
                Ok(Err(e)) => {
                    warn!(name, %secret_type, error = %e, "keyring store failed, using filesystem");
                }
                Err(e) => {
                    warn!(name, %secret_type, error = %e, "keyring store unavailable, using filesystem");
                }
            }
        }

        self.write_secret_file(name, secret_type, value).await?;
        Ok(StorageBackend::Filesystem)
    }

    /// Store a secret in a specific backend, bypassing the fallback policy.
    /// The migration engine uses this to force the chosen tier.
    pub async fn store_in(
        &self,
        backend: StorageBackend,
        name: &str,
        secret_type: SecretType,
        value: &str,
    ) -> CoreResult<()> {
        match backend {
            StorageBackend::Keyring => {
                let service = keyring_service(name);
                let user = secret_type.to_string();
                let value_owned = Zeroizing::new(value.to_string());
                match self
                    .keyring_call("store", move || {
                        Entry::new(&service, &user)?.set_password(&value_owned)
                    })
                    .await?
                {
                    Ok(()) => Ok(()),
                    Err(e) => Err(Error::keyring_unavailable(e.to_string())),
                }
            }
            StorageBackend::Filesystem => self.write_secret_file(name, secret_type, value).await,
        }
    }

    /// Fetch a secret, trying the keyring first and falling back to the
    /// filesystem tier on miss, timeout, or keyring unavailability.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when neither tier holds the secret.
    pub async fn get(
        &self,
        name: &str,
        secret_type: SecretType,
    ) -> CoreResult<(SecretString, StorageBackend)> {
        if self.use_keyring {
            let service = keyring_service(name);
            let user = secret_type.to_string();
            match self
                .keyring_call("get", move || Entry::new(&service, &user)?.get_password())
                .await
            {
                Ok(Ok(password)) => {
                    return Ok((SecretString::new(password), StorageBackend::Keyring))
                }
                Ok(Err(keyring::Error::NoEntry)) => {
                    debug!(name, %secret_type, "secret not in keyring, trying filesystem");
                }
                Ok(Err(e)) => {
                    debug!(name, %secret_type, error = %e, "keyring get failed, trying filesystem");
                }
                Err(e) => {
                    debug!(name, %secret_type, error = %e, "keyring get unavailable, trying filesystem");
                }
            }
        }

        let path = self.secret_file_path(name, secret_type);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok((SecretString::new(contents), StorageBackend::Filesystem)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found(name, secret_type.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a secret from one specific tier, best-effort. Used by the
    /// migration engine to retire the origin copy after a move.
    pub async fn delete_in(
        &self,
        backend: StorageBackend,
        name: &str,
        secret_type: SecretType,
    ) -> CoreResult<()> {
        match backend {
            StorageBackend::Keyring => {
                let service = keyring_service(name);
                let user = secret_type.to_string();
                match self
                    .keyring_call("delete", move || {
                        Entry::new(&service, &user)?.delete_credential()
                    })
                    .await?
                {
                    Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                    Err(e) => Err(Error::keyring_unavailable(e.to_string())),
                }
            }
            StorageBackend::Filesystem => {
                let path = self.secret_file_path(name, secret_type);
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    /// Delete a secret from both tiers, best-effort. Succeeds when at least
    /// one tier held (and released) the value.
    pub async fn delete(&self, name: &str, secret_type: SecretType) -> CoreResult<()> {
        let mut deleted = false;

        if self.use_keyring {
            let service = keyring_service(name);
            let user = secret_type.to_string();
            if let Ok(Ok(())) = self
                .keyring_call("delete", move || {
                    Entry::new(&service, &user)?.delete_credential()
                })
                .await
            {
                deleted = true;
            }
        }

        let path = self.secret_file_path(name, secret_type);
        if tokio::fs::remove_file(&path).await.is_ok() {
            deleted = true;
        }

        if deleted {
            Ok(())
        } else {
            Err(Error::not_found(name, secret_type.to_string()))
        }
    }

    /// Probe whether the keyring tier actually works, by writing and deleting
    /// a synthetic entry within the timeout. Any failure reports `false`.
    pub async fn is_available(&self) -> bool {
        if !self.use_keyring {
            return false;
        }
        let service = keyring_service("__gh-app-auth-probe__");
        let outcome = self
            .keyring_call("probe", move || {
                let entry = Entry::new(&service, "probe")?;
                entry.set_password("probe")?;
                entry.delete_credential()
            })
            .await;
        matches!(outcome, Ok(Ok(())))
    }

    /// Run a keyring operation on a blocking worker with this store's
    /// deadline. The outer result covers timeout and worker failure; the
    /// inner result is the keyring's own verdict. A timed-out worker is left
    /// to finish in the background.
    async fn keyring_call<T, F>(
        &self,
        operation: &str,
        f: F,
    ) -> CoreResult<Result<T, keyring::Error>>
    where
        F: FnOnce() -> Result<T, keyring::Error> + Send + 'static,
        T: Send + 'static,
    {
        let task = tokio::task::spawn_blocking(f);
        match tokio::time::timeout(self.keyring_timeout, task).await {
            Err(_) => Err(Error::keyring_timeout(
                operation,
                self.keyring_timeout.as_secs(),
            )),
            Ok(Err(join_err)) => Err(Error::keyring_unavailable(join_err.to_string())),
            Ok(Ok(result)) => Ok(result),
        }
    }

    async fn write_secret_file(
        &self,
        name: &str,
        secret_type: SecretType,
        value: &str,
    ) -> CoreResult<()> {
        create_private_dir(&self.secrets_dir).await?;
        let path = self.secret_file_path(name, secret_type);

        // A previous write left the file read-only; remove before rewriting.
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }
        tokio::fs::write(&path, value.as_bytes()).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o400)).await?;
        }
        debug!(path = %path.display(), "wrote secret to filesystem tier");
        Ok(())
    }
}

/// Read a private-key PEM file supplied by the user, refusing files readable
/// by anyone but their owner.
///
/// # Errors
///
/// Returns [`Error::KeyFilePermissions`] when the file mode includes group or
/// other read bits, and [`Error::Io`] when the file cannot be read.
pub fn read_key_file(path: &Path) -> CoreResult<Zeroizing<Vec<u8>>> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(path)?.permissions().mode();
        if mode & 0o044 != 0 {
            return Err(Error::key_file_permissions(
                path.display().to_string(),
                mode & 0o777,
            ));
        }
    }
    Ok(Zeroizing::new(std::fs::read(path)?))
}

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod tests;
