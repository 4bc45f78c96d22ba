//! Action executor error types.

use crate::client::ClientError;
use crate::templates::TemplateError;
use thiserror::Error;

/// Errors applying an action to the downstream repository.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A repository call failed.
    #[error("Failed to {operation}: {source}")]
    Repository {
        operation: &'static str,
        #[source]
        source: ClientError,
    },

    /// A configured template could not be rendered.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// The pull request the action targets is gone.
    #[error("Downstream pull request #{number} no longer exists on '{branch}'")]
    MissingPullRequest { number: u64, branch: String },
}

impl ExecutionError {
    pub(crate) fn repository(operation: &'static str) -> impl FnOnce(ClientError) -> Self {
        move |source| Self::Repository { operation, source }
    }
}
