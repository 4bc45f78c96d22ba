//! Generation and diff error types.

use crate::client::ClientError;
use thiserror::Error;

/// Errors produced while regenerating the downstream tree.
///
/// A generation error is terminal for the event. It is never reported as
/// "no diff".
#[derive(Debug, Error)]
pub enum GenerationError {
    /// `generator.command` has no program.
    #[error("Generator command is empty")]
    EmptyCommand,

    /// Materializing or reading back a working tree failed.
    #[error("Generator workspace error: {message}")]
    Workspace { message: String },

    /// The generator process could not be started.
    #[error("Failed to start generator '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The generator exited unsuccessfully.
    #[error("Generator '{program}' failed ({status}): {stderr}")]
    CommandFailed {
        program: String,
        /// Exit status as reported by the OS, e.g. `exit status: 2`.
        status: String,
        stderr: String,
    },

    /// The generator exceeded its time limit and was killed.
    #[error("Generator timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },
}

impl GenerationError {
    pub(crate) fn workspace(context: &str, error: impl std::fmt::Display) -> Self {
        Self::Workspace {
            message: format!("{context}: {error}"),
        }
    }
}

/// Errors from [`compute_diff`](super::compute_diff).
#[derive(Debug, Error)]
pub enum DiffError {
    /// The generator failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Fetching an input tree failed.
    #[error("Failed to fetch tree '{reference}': {source}")]
    Repository {
        reference: String,
        #[source]
        source: ClientError,
    },
}
