use thiserror::Error;

/// Errors that can occur when signing JWTs or talking to the forge
#[derive(Error, Debug)]
pub enum Error {
    /// The private key is not usable RSA PEM material
    #[error("invalid private key: {message}")]
    InvalidKeyFormat { message: String },

    /// JWT generation or structural validation failed
    #[error("JWT error: {message}")]
    Jwt { message: String },

    /// The forge answered with a non-success status
    #[error("forge API returned {status}: {body}")]
    ForgeApi { status: u16, body: String },

    /// A forge request did not complete within its deadline
    #[error("forge request to {url} timed out")]
    ForgeTimeout { url: String },

    /// Network-level failure talking to the forge
    #[error("network error talking to the forge: {source}")]
    Network { source: reqwest::Error },

    /// The forge's response body could not be decoded
    #[error("failed to parse forge response: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    /// Errors bubbled up from the core crate, kind preserved
    #[error(transparent)]
    Core {
        #[from]
        source: gh_app_auth_core::Error,
    },
}

impl Error {
    /// Create a new invalid key format error
    pub fn invalid_key_format(message: impl Into<String>) -> Self {
        Self::InvalidKeyFormat {
            message: message.into(),
        }
    }

    /// Create a new JWT error
    pub fn jwt(message: impl Into<String>) -> Self {
        Self::Jwt {
            message: message.into(),
        }
    }

    /// Create a new forge API error from a response status and body
    pub fn forge_api(status: u16, body: impl Into<String>) -> Self {
        Self::ForgeApi {
            status,
            body: body.into(),
        }
    }

    /// Map a reqwest failure, distinguishing deadline expiry from other
    /// network trouble
    pub fn from_request(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::ForgeTimeout { url: url.into() }
        } else {
            Self::Network { source }
        }
    }

    /// Whether this error means "we are simply not the right helper here".
    /// Delegates to the core taxonomy; forge and key errors always surface.
    pub fn is_pass_through(&self) -> bool {
        matches!(self, Self::Core { source } if source.is_pass_through())
    }
}

/// Result type for forge operations
pub type GitHubResult<T> = Result<T, Error>;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
