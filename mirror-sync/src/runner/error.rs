//! Runner error types.

/// Errors that prevent a run from starting.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Configuration loading errors.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// Invalid branch prefix or template.
    #[error(transparent)]
    Context(#[from] crate::context::ContextError),

    /// GitHub API client initialization errors.
    #[error("Failed to create GitHub client: {0}")]
    Client(#[from] crate::client::ClientError),

    /// Reading payloads failed.
    #[error("Failed to read payload from {source_name}: {source}")]
    Input {
        source_name: String,
        #[source]
        source: std::io::Error,
    },
}
