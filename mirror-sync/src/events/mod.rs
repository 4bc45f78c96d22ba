//! Inbound pull request events.
//!
//! Events arrive in a normalized JSON form:
//!
//! ```json
//! {"type": "pull_request", "action": "opened", "repository": "upstream",
//!  "pull_request": {"number": 5, "head_ref": "feature", "head_sha": "abc123",
//!                   "merged": false, "state": "open", "title": "Add X"}}
//! ```
//!
//! Native GitHub webhooks are converted into this form by
//! [`InboundEvent::from_webhook`]. [`classify`] turns an inbound event into an
//! [`UpstreamPrEvent`] or explains why it is ignored.

mod error;
mod upstream;
mod webhook;

pub use error::EventError;
pub use upstream::{PrEventKind, PullRequestState, UpstreamPrEvent, UpstreamPullRequest};

use crate::config::RepositoryId;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Event type handled by the engine.
pub const PULL_REQUEST_EVENT: &str = "pull_request";

/// Which side of the mirror an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryRole {
    Upstream,
    Downstream,
    /// Any repository outside the mirroring relationship.
    #[serde(other)]
    Other,
}

/// Pull request fields carried by an inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPullRequest {
    pub number: u64,
    #[serde(default)]
    pub head_ref: String,
    #[serde(default)]
    pub head_sha: String,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub base_ref: Option<String>,
}

/// A raw event as forwarded by the event receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Event type, e.g. `pull_request`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event action, e.g. `opened`.
    #[serde(default)]
    pub action: String,
    /// Repository the event originated from.
    pub repository: RepositoryRole,
    /// Pull request snapshot; absent for non pull request events.
    #[serde(default)]
    pub pull_request: Option<EventPullRequest>,
}

impl InboundEvent {
    /// Parses a normalized event from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Malformed`] if the text is not a valid event.
    pub fn from_json(payload: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// How raw payloads are encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadFormat {
    /// The normalized form accepted by [`InboundEvent::from_json`].
    Normalized,
    /// A GitHub webhook body; carries the `X-GitHub-Event` name.
    GitHub { event_name: String },
}

impl PayloadFormat {
    /// Parses one payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Malformed`] if the payload cannot be parsed.
    pub fn parse(
        &self,
        payload: &str,
        upstream: &RepositoryId,
        downstream: &RepositoryId,
    ) -> Result<InboundEvent, EventError> {
        match self {
            Self::Normalized => InboundEvent::from_json(payload),
            Self::GitHub { event_name } => {
                InboundEvent::from_webhook(event_name, payload, upstream, downstream)
            }
        }
    }
}

/// Result of classifying an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The event concerns an upstream pull request and must be handled.
    Upstream(UpstreamPrEvent),
    /// The event is outside the engine's concern.
    Ignored { reason: String },
}

/// Decides whether an inbound event is an upstream pull request transition.
///
/// Unknown types and actions, events from any repository but the upstream
/// one, and pull requests that target a branch other than `base_branch`
/// (when configured) are ignored rather than treated as errors.
///
/// # Errors
///
/// Returns [`EventError::MissingField`] when a relevant pull request event
/// lacks data needed to act on it.
pub fn classify(
    event: &InboundEvent,
    base_branch: Option<&str>,
) -> Result<Classification, EventError> {
    if event.event_type != PULL_REQUEST_EVENT {
        return Ok(ignored(format!("unsupported event type '{}'", event.event_type)));
    }

    if event.repository != RepositoryRole::Upstream {
        return Ok(ignored(format!(
            "event from {:?} repository",
            event.repository
        )));
    }

    let Some(raw) = &event.pull_request else {
        return Err(EventError::MissingField {
            field: "pull_request",
        });
    };

    let kind = match event.action.as_str() {
        "open" | "opened" => PrEventKind::Opened,
        "synchronize" | "synchronized" => PrEventKind::Synchronized,
        "closed" if raw.merged => PrEventKind::Merged,
        "closed" => PrEventKind::Closed,
        "reopened" => PrEventKind::Reopened,
        "edited" => PrEventKind::Edited,
        other => return Ok(ignored(format!("unsupported action '{other}'"))),
    };

    if let (Some(expected), Some(actual)) = (base_branch, raw.base_ref.as_deref()) {
        if expected != actual {
            return Ok(ignored(format!(
                "pull request #{} targets '{actual}' instead of '{expected}'",
                raw.number
            )));
        }
    }

    if kind.needs_diff() && raw.head_sha.trim().is_empty() {
        return Err(EventError::MissingField { field: "head_sha" });
    }

    let state = if raw.merged {
        PullRequestState::Merged
    } else if raw.state.as_deref() == Some("closed") || kind == PrEventKind::Closed {
        PullRequestState::Closed
    } else {
        PullRequestState::Open
    };

    Ok(Classification::Upstream(UpstreamPrEvent {
        kind,
        pull_request: UpstreamPullRequest {
            number: raw.number,
            head_ref: raw.head_ref.clone(),
            head_sha: raw.head_sha.clone(),
            state,
            title: raw.title.clone(),
            html_url: raw.html_url.clone(),
            base_ref: raw.base_ref.clone(),
        },
    }))
}

fn ignored(reason: String) -> Classification {
    debug!(reason = %reason, "Ignoring event");
    Classification::Ignored { reason }
}
