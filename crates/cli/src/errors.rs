use thiserror::Error;

/// Errors that can occur in CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    /// Core operation errors (config, storage, matching)
    #[error(transparent)]
    Core {
        #[from]
        source: gh_app_auth_core::Error,
    },

    /// Forge and JWT errors
    #[error(transparent)]
    GitHub {
        #[from]
        source: gh_app_auth_github_client::Error,
    },

    /// Invalid command arguments
    #[error("Invalid argument: {argument} - {message}")]
    InvalidArgument { argument: String, message: String },

    /// Command execution errors (e.g. invoking git)
    #[error("Command execution failed: {command} - {message}")]
    CommandExecution { command: String, message: String },

    /// File I/O errors
    #[error("File operation failed: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// YAML serialization errors
    #[error("YAML processing failed: {source}")]
    Yaml {
        #[from]
        source: serde_yaml::Error,
    },
}

impl CliError {
    /// Create a new invalid argument error
    pub fn invalid_argument(argument: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument: argument.into(),
            message: message.into(),
        }
    }

    /// Create a new command execution error
    pub fn command_execution(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Whether the credential helper should swallow this error and exit
    /// successfully so git falls through to the next configured helper.
    /// This is the single decision point mapping error kinds to behavior;
    /// lower layers never make this call.
    pub fn is_silent_fallthrough(&self) -> bool {
        match self {
            Self::Core { source } => source.is_pass_through(),
            Self::GitHub { source } => source.is_pass_through(),
            _ => false,
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
