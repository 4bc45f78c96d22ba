//! Upstream pull request snapshots.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestState {
    Open,
    Closed,
    Merged,
}

impl PullRequestState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Merged => "merged",
        }
    }
}

/// An upstream pull request as observed in an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamPullRequest {
    /// Pull request number in the upstream repository.
    pub number: u64,
    /// Head branch name.
    pub head_ref: String,
    /// Head commit SHA.
    pub head_sha: String,
    /// State at the time of the event.
    pub state: PullRequestState,
    /// Pull request title.
    pub title: String,
    /// Web URL, when the event carried one.
    pub html_url: Option<String>,
    /// Branch the pull request targets, when the event carried one.
    pub base_ref: Option<String>,
}

/// Lifecycle transition reported by an upstream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrEventKind {
    Opened,
    Synchronized,
    /// Closed without merging.
    Closed,
    Merged,
    Reopened,
    /// Title or body edited.
    Edited,
}

impl PrEventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Synchronized => "synchronized",
            Self::Closed => "closed",
            Self::Merged => "merged",
            Self::Reopened => "reopened",
            Self::Edited => "edited",
        }
    }

    /// Whether handling this event requires running the generator.
    #[must_use]
    pub fn needs_diff(self) -> bool {
        matches!(self, Self::Opened | Self::Synchronized | Self::Reopened)
    }
}

/// An upstream pull request event the engine acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamPrEvent {
    pub kind: PrEventKind,
    pub pull_request: UpstreamPullRequest,
}

impl UpstreamPrEvent {
    /// Upstream pull request number.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.pull_request.number
    }
}
