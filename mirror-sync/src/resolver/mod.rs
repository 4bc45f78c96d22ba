//! Sync state resolver.
//!
//! [`resolve`] maps an upstream event, the freshly computed diff and the
//! current [`SyncLink`] to exactly one [`Action`]. It performs no I/O.

mod action;

pub use action::Action;

use crate::events::{PrEventKind, UpstreamPrEvent};
use crate::generator::GeneratedDiff;
use crate::link::SyncLink;
use crate::naming::MirrorNaming;

/// Decides the downstream action for an upstream event.
///
/// A missing `diff` counts as "no change". Divergence of an existing mirror
/// branch shows up as a change, because the diff is computed against the
/// mirror branch whenever it has a pull request.
#[must_use]
pub fn resolve(
    event: &UpstreamPrEvent,
    diff: Option<&GeneratedDiff>,
    link: Option<&SyncLink>,
    naming: &MirrorNaming,
) -> Action {
    let upstream = &event.pull_request;
    let changed = diff.filter(|d| d.changed);
    let linked_pr = link.and_then(|l| l.pull_request.as_ref());

    match (event.kind, link) {
        (PrEventKind::Opened | PrEventKind::Synchronized, None) => match changed {
            Some(diff) => Action::CreateBranchAndPr {
                branch: naming.branch_name(upstream.number),
                tree: diff.tree.clone(),
                upstream: upstream.clone(),
            },
            None => Action::no_op("generated code is unchanged"),
        },

        (PrEventKind::Opened | PrEventKind::Synchronized, Some(link)) => match changed {
            Some(diff) => Action::UpdateBranch {
                branch: link.branch.clone(),
                tree: diff.tree.clone(),
                upstream: upstream.clone(),
            },
            None => Action::no_op("mirror branch is up to date"),
        },

        (PrEventKind::Reopened, None) => match changed {
            Some(diff) => Action::CreateBranchAndPr {
                branch: naming.branch_name(upstream.number),
                tree: diff.tree.clone(),
                upstream: upstream.clone(),
            },
            None => Action::no_op("generated code is unchanged"),
        },

        (_, None) => Action::no_op("no downstream counterpart"),

        (PrEventKind::Closed, Some(_)) => match linked_pr {
            Some(pr) => Action::CloseDownstreamPr {
                number: pr.number,
                upstream: upstream.clone(),
            },
            None => Action::no_op("mirror branch has no pull request"),
        },

        (PrEventKind::Reopened, Some(link)) => match (linked_pr, changed) {
            (Some(pr), _) => Action::ReopenDownstreamPr {
                number: pr.number,
                upstream: upstream.clone(),
            },
            (None, Some(diff)) => Action::UpdateBranch {
                branch: link.branch.clone(),
                tree: diff.tree.clone(),
                upstream: upstream.clone(),
            },
            (None, None) => Action::no_op("generated code is unchanged"),
        },

        (PrEventKind::Merged, Some(_)) => match linked_pr {
            Some(pr) => Action::PostMergeComment {
                number: pr.number,
                upstream: upstream.clone(),
            },
            None => Action::no_op("mirror branch has no pull request"),
        },

        (PrEventKind::Edited, Some(_)) => match linked_pr {
            Some(pr) => Action::SyncTitle {
                number: pr.number,
                upstream: upstream.clone(),
            },
            None => Action::no_op("mirror branch has no pull request"),
        },
    }
}
