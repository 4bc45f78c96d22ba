//! Access to the two mirrored repositories.
//!
//! [`RepositoryClient`] is the only way the engine reads or writes remote
//! state. [`GitHubClient`] implements it with octocrab;
//! [`InMemoryRepositories`] keeps everything in memory for tests.

mod error;
mod github;
mod memory;
pub mod rate_limit;

pub use error::ClientError;
pub use github::GitHubClient;
pub use memory::InMemoryRepositories;

use crate::config::RepositoryId;
use crate::events::PullRequestState;
use crate::tree::FileTree;
use async_trait::async_trait;
use serde::Serialize;

/// A branch and the commit it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub name: String,
    pub sha: String,
}

/// A pull request in the downstream repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownstreamPullRequest {
    pub number: u64,
    /// Head branch.
    pub head_ref: String,
    pub state: PullRequestState,
    pub title: String,
    pub html_url: String,
}

/// An issue or pull request comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub id: u64,
    pub body: String,
}

/// Parameters for opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
}

/// State a pull request can be moved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    Open,
    Closed,
}

impl TargetState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

/// Branch, tree, pull request and comment operations on a repository host.
///
/// Implementations must report missing objects as [`ClientError::NotFound`]
/// (or `Ok(None)` for lookups), write races as [`ClientError::Conflict`],
/// credential problems as [`ClientError::Permission`] and everything
/// retryable as [`ClientError::Transient`].
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Returns the repository's default branch name.
    async fn default_branch(&self, repo: &RepositoryId) -> Result<String, ClientError>;

    /// Looks up a branch.
    async fn get_branch(&self, repo: &RepositoryId, name: &str)
        -> Result<Option<Branch>, ClientError>;

    /// Creates `name` pointing at the head of `from`.
    ///
    /// Fails with [`ClientError::Conflict`] if `name` already exists.
    async fn create_branch(
        &self,
        repo: &RepositoryId,
        name: &str,
        from: &str,
    ) -> Result<Branch, ClientError>;

    /// Commits `tree` as the complete content of `branch` on top of its head
    /// and moves the branch to the new commit. Returns the commit SHA.
    async fn update_branch_content(
        &self,
        repo: &RepositoryId,
        branch: &str,
        tree: &FileTree,
        message: &str,
    ) -> Result<String, ClientError>;

    /// Deletes a branch.
    async fn delete_branch(&self, repo: &RepositoryId, name: &str) -> Result<(), ClientError>;

    /// Reads the full file tree at a branch name or commit SHA.
    async fn get_tree(&self, repo: &RepositoryId, reference: &str)
        -> Result<FileTree, ClientError>;

    /// Returns the most recent pull request, in any state, whose head is `branch`.
    async fn get_pull_request_by_branch(
        &self,
        repo: &RepositoryId,
        branch: &str,
    ) -> Result<Option<DownstreamPullRequest>, ClientError>;

    /// Opens a pull request.
    ///
    /// Fails with [`ClientError::Conflict`] if one already exists for the head.
    async fn create_pull_request(
        &self,
        repo: &RepositoryId,
        request: &NewPullRequest,
    ) -> Result<DownstreamPullRequest, ClientError>;

    /// Opens or closes a pull request.
    async fn set_pull_request_state(
        &self,
        repo: &RepositoryId,
        number: u64,
        state: TargetState,
    ) -> Result<(), ClientError>;

    /// Changes a pull request's title.
    async fn update_pull_request_title(
        &self,
        repo: &RepositoryId,
        number: u64,
        title: &str,
    ) -> Result<(), ClientError>;

    /// Lists all comments on a pull request's conversation.
    async fn list_comments(&self, repo: &RepositoryId, number: u64)
        -> Result<Vec<Comment>, ClientError>;

    /// Posts a comment on a pull request's conversation.
    async fn post_comment(
        &self,
        repo: &RepositoryId,
        number: u64,
        body: &str,
    ) -> Result<Comment, ClientError>;
}
