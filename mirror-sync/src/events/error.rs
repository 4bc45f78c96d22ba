//! Event parsing error types.

use thiserror::Error;

/// Errors that can occur while reading an inbound event.
#[derive(Debug, Error)]
pub enum EventError {
    /// The payload is not valid JSON or does not match the event shape.
    #[error("Malformed event payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A pull request event lacks a field the engine needs.
    #[error("Pull request event is missing '{field}'")]
    MissingField { field: &'static str },
}
