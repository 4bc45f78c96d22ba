//! Downstream actions.

use crate::events::UpstreamPullRequest;
use crate::tree::FileTree;

/// What the executor should do for one upstream event.
///
/// Each variant carries everything needed to apply it, so the executor never
/// has to look at the event again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Nothing to do.
    NoOp { reason: String },

    /// Create the mirror branch with `tree` and open a pull request for it.
    CreateBranchAndPr {
        branch: String,
        tree: FileTree,
        upstream: UpstreamPullRequest,
    },

    /// Commit `tree` to the existing mirror branch.
    UpdateBranch {
        branch: String,
        tree: FileTree,
        upstream: UpstreamPullRequest,
    },

    /// Close downstream pull request `number`.
    CloseDownstreamPr {
        number: u64,
        upstream: UpstreamPullRequest,
    },

    /// Reopen downstream pull request `number`.
    ReopenDownstreamPr {
        number: u64,
        upstream: UpstreamPullRequest,
    },

    /// Tell reviewers of `number` that the upstream pull request was merged.
    PostMergeComment {
        number: u64,
        upstream: UpstreamPullRequest,
    },

    /// Bring the title of `number` in line with the upstream title.
    SyncTitle {
        number: u64,
        upstream: UpstreamPullRequest,
    },
}

impl Action {
    pub(crate) fn no_op(reason: impl Into<String>) -> Self {
        Self::NoOp {
            reason: reason.into(),
        }
    }

    /// Short name for logs and summaries.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoOp { .. } => "no_op",
            Self::CreateBranchAndPr { .. } => "create_branch_and_pr",
            Self::UpdateBranch { .. } => "update_branch",
            Self::CloseDownstreamPr { .. } => "close_downstream_pr",
            Self::ReopenDownstreamPr { .. } => "reopen_downstream_pr",
            Self::PostMergeComment { .. } => "post_merge_comment",
            Self::SyncTitle { .. } => "sync_title",
        }
    }
}
