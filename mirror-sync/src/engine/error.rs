//! Event handling error types.

use crate::client::ClientError;
use crate::events::EventError;
use crate::executor::ExecutionError;
use crate::generator::{DiffError, GenerationError};
use serde::Serialize;
use thiserror::Error;

/// Failure class of a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidEvent,
    Generation,
    Template,
    NotFound,
    Conflict,
    Permission,
    Transient,
    Unsupported,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidEvent => "invalid_event",
            Self::Generation => "generation",
            Self::Template => "template",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Permission => "permission",
            Self::Transient => "transient",
            Self::Unsupported => "unsupported",
        }
    }
}

impl From<&ClientError> for ErrorKind {
    fn from(error: &ClientError) -> Self {
        match error {
            ClientError::NotFound { .. } => Self::NotFound,
            ClientError::Conflict { .. } => Self::Conflict,
            ClientError::Permission { .. } => Self::Permission,
            ClientError::Transient { .. } => Self::Transient,
            ClientError::Unsupported { .. } => Self::Unsupported,
        }
    }
}

/// Errors handling a single event.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The payload is malformed or incomplete.
    #[error("Invalid event: {0}")]
    Event(#[from] EventError),

    /// Reading downstream state failed.
    #[error("Upstream PR #{upstream_number}: repository error: {source}")]
    Repository {
        upstream_number: u64,
        #[source]
        source: ClientError,
    },

    /// Fetching a tree for the diff failed.
    #[error("Upstream PR #{upstream_number}: failed to fetch tree '{reference}': {source}")]
    Tree {
        upstream_number: u64,
        reference: String,
        #[source]
        source: ClientError,
    },

    /// The generator failed.
    #[error("Upstream PR #{upstream_number}: generation failed: {source}")]
    Generation {
        upstream_number: u64,
        #[source]
        source: GenerationError,
    },

    /// Applying the resolved action failed.
    #[error("Upstream PR #{upstream_number}: {action} failed: {source}")]
    Execution {
        upstream_number: u64,
        action: &'static str,
        #[source]
        source: ExecutionError,
    },

    /// The event exceeded its deadline.
    #[error("Upstream PR #{upstream_number}: timed out after {timeout_secs} seconds")]
    Timeout {
        upstream_number: u64,
        timeout_secs: u64,
    },
}

impl SyncError {
    pub(crate) fn from_diff(upstream_number: u64, error: DiffError) -> Self {
        match error {
            DiffError::Generation(source) => Self::Generation {
                upstream_number,
                source,
            },
            DiffError::Repository { reference, source } => Self::Tree {
                upstream_number,
                reference,
                source,
            },
        }
    }

    /// Failure class.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Event(_) => ErrorKind::InvalidEvent,
            Self::Repository { source, .. } | Self::Tree { source, .. } => source.into(),
            Self::Generation { .. } => ErrorKind::Generation,
            Self::Execution { source, .. } => match source {
                ExecutionError::Repository { source, .. } => source.into(),
                ExecutionError::Template(_) => ErrorKind::Template,
                ExecutionError::MissingPullRequest { .. } => ErrorKind::NotFound,
            },
            Self::Timeout { .. } => ErrorKind::Transient,
        }
    }

    /// Upstream pull request the failure belongs to, if known.
    #[must_use]
    pub fn upstream_number(&self) -> Option<u64> {
        match self {
            Self::Event(_) => None,
            Self::Repository {
                upstream_number, ..
            }
            | Self::Tree {
                upstream_number, ..
            }
            | Self::Generation {
                upstream_number, ..
            }
            | Self::Execution {
                upstream_number, ..
            }
            | Self::Timeout {
                upstream_number, ..
            } => Some(*upstream_number),
        }
    }

    /// Whether redelivering the event may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
