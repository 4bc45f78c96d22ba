//! Repository client error types.

use thiserror::Error;

/// Errors surfaced by a [`RepositoryClient`](super::RepositoryClient).
///
/// The variants are what callers branch on: `Conflict` is recoverable by
/// re-reading state, `Transient` may succeed on redelivery, `Permission`
/// needs an operator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The branch, ref, pull request or repository does not exist.
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// The write raced with existing state, e.g. the branch already exists.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Credentials lack access or scope.
    #[error("Permission denied: {message}")]
    Permission { message: String },

    /// Network failure, server error or rate limiting.
    #[error("Transient failure: {message}")]
    Transient { message: String },

    /// Repository content that cannot be read or written faithfully, such as
    /// a truncated tree listing.
    #[error("Unsupported repository content: {message}")]
    Unsupported { message: String },
}

impl ClientError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission {
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Whether redelivering the event may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Maps an HTTP status and GitHub error message to a [`ClientError`].
pub(crate) fn classify_status(status: u16, message: &str) -> ClientError {
    let lowered = message.to_lowercase();
    match status {
        404 => ClientError::not_found(message),
        403 | 429 if lowered.contains("rate limit") => ClientError::transient(message),
        401 | 403 => ClientError::permission(message),
        409 | 422 => ClientError::conflict(message),
        _ => ClientError::transient(format!("HTTP {status}: {message}")),
    }
}

impl From<octocrab::Error> for ClientError {
    fn from(error: octocrab::Error) -> Self {
        match &error {
            octocrab::Error::GitHub { source, .. } => {
                classify_status(source.status_code.as_u16(), &source.message)
            }
            _ => ClientError::transient(error.to_string()),
        }
    }
}
