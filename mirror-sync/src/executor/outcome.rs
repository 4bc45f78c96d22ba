//! Action outcome types.

use serde::Serialize;

/// What applying an action actually changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// A downstream pull request was opened.
    Created {
        /// Downstream PR number.
        number: u64,
        /// Downstream PR URL.
        url: String,
    },

    /// A commit was pushed to the mirror branch.
    Updated {
        /// New commit SHA.
        commit: String,
    },

    /// The mirror branch and pull request already matched.
    AlreadyUpToDate,

    /// The downstream pull request was closed.
    Closed,

    /// The downstream pull request was reopened.
    Reopened,

    /// A comment was posted.
    Commented,

    /// The downstream pull request title was changed.
    Retitled,

    /// The pull request was already in the requested state.
    AlreadyInState,

    /// Nothing was done.
    Skipped {
        /// Reason for skipping.
        reason: String,
    },

    /// Dry run; the action was only logged.
    DryRun,
}

impl ActionOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Updated { .. } => "updated",
            Self::AlreadyUpToDate => "already_up_to_date",
            Self::Closed => "closed",
            Self::Reopened => "reopened",
            Self::Commented => "commented",
            Self::Retitled => "retitled",
            Self::AlreadyInState => "already_in_state",
            Self::Skipped { .. } => "skipped",
            Self::DryRun => "dry_run",
        }
    }

    /// Whether the downstream repository was written to.
    #[must_use]
    pub fn changed_downstream(&self) -> bool {
        matches!(
            self,
            Self::Created { .. }
                | Self::Updated { .. }
                | Self::Closed
                | Self::Reopened
                | Self::Commented
                | Self::Retitled
        )
    }
}
