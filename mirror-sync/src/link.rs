//! Discovery of the downstream counterpart of an upstream pull request.

use crate::client::{ClientError, DownstreamPullRequest, RepositoryClient};
use crate::config::RepositoryId;
use crate::naming::MirrorNaming;
use tracing::debug;

/// Downstream state mirroring one upstream pull request.
///
/// Never stored: it is rebuilt from the downstream repository whenever an
/// event needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLink {
    pub upstream_number: u64,
    /// Mirror branch name.
    pub branch: String,
    /// Whether the mirror branch currently exists.
    pub branch_exists: bool,
    /// Most recent pull request whose head is the mirror branch.
    pub pull_request: Option<DownstreamPullRequest>,
}

/// Looks up the mirror branch and its pull request.
///
/// Returns `None` when neither exists.
///
/// # Errors
///
/// Propagates client errors other than "not found".
pub async fn discover_link<C>(
    client: &C,
    repo: &RepositoryId,
    naming: &MirrorNaming,
    upstream_number: u64,
) -> Result<Option<SyncLink>, ClientError>
where
    C: RepositoryClient + ?Sized,
{
    let branch = naming.branch_name(upstream_number);

    let branch_exists = client.get_branch(repo, &branch).await?.is_some();
    let pull_request = client.get_pull_request_by_branch(repo, &branch).await?;

    debug!(
        branch = %branch,
        branch_exists,
        downstream_pr = pull_request.as_ref().map(|pr| pr.number),
        "Discovered sync link"
    );

    if !branch_exists && pull_request.is_none() {
        return Ok(None);
    }

    Ok(Some(SyncLink {
        upstream_number,
        branch,
        branch_exists,
        pull_request,
    }))
}
