use thiserror::Error;

/// Errors that can occur in core gh-app-auth operations
#[derive(Error, Debug)]
pub enum Error {
    /// A repository reference could not be parsed
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// The configuration document is malformed or violates an invariant
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A provider was requested by name but is not configured
    #[error("No provider named '{name}' is configured")]
    MissingProvider { name: String },

    /// No configured provider matches the requested URL
    #[error("no provider matches '{url}'")]
    NoMatch { url: String },

    /// The OS keyring backend cannot be used at all
    #[error("OS keyring unavailable: {message}")]
    KeyringUnavailable { message: String },

    /// A keyring call did not complete within its deadline
    #[error("keyring {operation} timed out after {timeout_secs}s")]
    KeyringTimeout {
        operation: String,
        timeout_secs: u64,
    },

    /// A secret is in neither the keyring nor the filesystem tier
    #[error("secret '{name}' ({secret_type}) not found in any storage backend")]
    NotFound { name: String, secret_type: String },

    /// A private-key file is readable by users other than its owner
    #[error(
        "private key file '{path}' is readable by group or others (mode {mode:03o}); \
         fix with: chmod 600 '{path}'"
    )]
    KeyFilePermissions { path: String, mode: u32 },

    /// I/O errors (file operations, directory creation, etc.)
    #[error("I/O operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// YAML parsing or serialization errors
    #[error("YAML parsing failed: {source}")]
    Yaml {
        #[from]
        source: serde_yaml::Error,
    },
}

impl Error {
    /// Create a new invalid URL error
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a new missing provider error
    pub fn missing_provider(name: impl Into<String>) -> Self {
        Self::MissingProvider { name: name.into() }
    }

    /// Create a new no-match error
    pub fn no_match(url: impl Into<String>) -> Self {
        Self::NoMatch { url: url.into() }
    }

    /// Create a new keyring unavailable error
    pub fn keyring_unavailable(message: impl Into<String>) -> Self {
        Self::KeyringUnavailable {
            message: message.into(),
        }
    }

    /// Create a new keyring timeout error
    pub fn keyring_timeout(operation: impl Into<String>, timeout_secs: u64) -> Self {
        Self::KeyringTimeout {
            operation: operation.into(),
            timeout_secs,
        }
    }

    /// Create a new secret-not-found error
    pub fn not_found(name: impl Into<String>, secret_type: impl Into<String>) -> Self {
        Self::NotFound {
            name: name.into(),
            secret_type: secret_type.into(),
        }
    }

    /// Create a new key file permissions error
    pub fn key_file_permissions(path: impl Into<String>, mode: u32) -> Self {
        Self::KeyFilePermissions {
            path: path.into(),
            mode,
        }
    }

    /// Whether this error means "we are simply not the right helper here"
    /// rather than a real failure. The credential-helper front-end is the only
    /// caller that may act on this.
    pub fn is_pass_through(&self) -> bool {
        matches!(self, Self::NoMatch { .. } | Self::NotFound { .. })
    }
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, Error>;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
