//! In-memory repository host for testing.
//!
//! [`InMemoryRepositories`] models just enough of a repository host to run
//! the engine end to end: branches holding file trees, commits addressable by
//! SHA, pull requests with comments.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No persistence
//! - **Single-process only**: State lives behind an `Arc<RwLock<_>>` shared by clones

use super::{
    Branch, ClientError, Comment, DownstreamPullRequest, NewPullRequest, RepositoryClient,
    TargetState,
};
use crate::config::RepositoryId;
use crate::events::PullRequestState;
use crate::tree::FileTree;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
struct BranchState {
    head: String,
}

#[derive(Debug, Clone)]
struct PullState {
    pr: DownstreamPullRequest,
    base: String,
    body: String,
    comments: Vec<Comment>,
}

#[derive(Debug, Default)]
struct RepositoryState {
    default_branch: String,
    branches: BTreeMap<String, BranchState>,
    commits: HashMap<String, FileTree>,
    pulls: Vec<PullState>,
}

#[derive(Debug, Default)]
struct State {
    repositories: HashMap<RepositoryId, RepositoryState>,
    next_id: u64,
    writes: usize,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn next_sha(&mut self) -> String {
        format!("{:040x}", self.next_id())
    }

    fn repository(&self, repo: &RepositoryId) -> Result<&RepositoryState, ClientError> {
        self.repositories
            .get(repo)
            .ok_or_else(|| ClientError::not_found(format!("repository {repo}")))
    }

    fn repository_mut(&mut self, repo: &RepositoryId) -> Result<&mut RepositoryState, ClientError> {
        self.repositories
            .get_mut(repo)
            .ok_or_else(|| ClientError::not_found(format!("repository {repo}")))
    }
}

impl RepositoryState {
    fn resolve(&self, reference: &str) -> Option<&FileTree> {
        let sha = self
            .branches
            .get(reference)
            .map_or(reference, |branch| branch.head.as_str());
        self.commits.get(sha)
    }

    fn pull(&self, number: u64) -> Result<&PullState, ClientError> {
        self.pulls
            .iter()
            .find(|p| p.pr.number == number)
            .ok_or_else(|| ClientError::not_found(format!("pull request #{number}")))
    }

    fn pull_mut(&mut self, number: u64) -> Result<&mut PullState, ClientError> {
        self.pulls
            .iter_mut()
            .find(|p| p.pr.number == number)
            .ok_or_else(|| ClientError::not_found(format!("pull request #{number}")))
    }
}

/// Shared in-memory state for any number of repositories.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepositories {
    state: Arc<RwLock<State>>,
    failures: Arc<Mutex<HashMap<String, VecDeque<ClientError>>>>,
}

/// Converts a lock poison error to a client error.
fn poison_err<T>(_: PoisonError<T>) -> ClientError {
    ClientError::transient("in-memory repository lock poisoned")
}

impl InMemoryRepositories {
    /// Creates an empty host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, ClientError> {
        self.state.read().map_err(poison_err)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, ClientError> {
        self.state.write().map_err(poison_err)
    }

    fn take_failure(&self, operation: &str) -> Result<(), ClientError> {
        let mut failures = self.failures.lock().map_err(poison_err)?;
        match failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn read_or_panic(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_or_panic(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a repository whose default branch holds `tree`.
    pub fn add_repository(&self, repo: &RepositoryId, default_branch: &str, tree: FileTree) {
        let mut state = self.write_or_panic();
        let sha = state.next_sha();
        let mut repository = RepositoryState {
            default_branch: default_branch.to_string(),
            ..RepositoryState::default()
        };
        repository.commits.insert(sha.clone(), tree);
        repository
            .branches
            .insert(default_branch.to_string(), BranchState { head: sha });
        state.repositories.insert(repo.clone(), repository);
    }

    /// Records a commit with a caller-chosen SHA, e.g. an upstream PR head.
    pub fn add_commit(&self, repo: &RepositoryId, sha: &str, tree: FileTree) {
        let mut state = self.write_or_panic();
        if let Some(repository) = state.repositories.get_mut(repo) {
            repository.commits.insert(sha.to_string(), tree);
        }
    }

    /// Points `branch` at a new commit holding `tree`, creating it if needed.
    pub fn push_branch(&self, repo: &RepositoryId, branch: &str, tree: FileTree) {
        let mut state = self.write_or_panic();
        let sha = state.next_sha();
        if let Some(repository) = state.repositories.get_mut(repo) {
            repository.commits.insert(sha.clone(), tree);
            repository
                .branches
                .insert(branch.to_string(), BranchState { head: sha });
        }
    }

    /// Marks a pull request as merged, as a maintainer would.
    pub fn merge_pull_request(&self, repo: &RepositoryId, number: u64) {
        let mut state = self.write_or_panic();
        if let Some(pull) = state
            .repositories
            .get_mut(repo)
            .and_then(|r| r.pulls.iter_mut().find(|p| p.pr.number == number))
        {
            pull.pr.state = PullRequestState::Merged;
        }
    }

    /// Makes the next call of `operation` (a trait method name) fail with `error`.
    pub fn fail_next(&self, operation: &str, error: ClientError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(operation.to_string())
            .or_default()
            .push_back(error);
    }

    /// Branch names in a repository.
    #[must_use]
    pub fn branches(&self, repo: &RepositoryId) -> Vec<String> {
        self.read_or_panic()
            .repositories
            .get(repo)
            .map(|r| r.branches.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Tree at a branch or commit.
    #[must_use]
    pub fn tree_at(&self, repo: &RepositoryId, reference: &str) -> Option<FileTree> {
        self.read_or_panic()
            .repositories
            .get(repo)
            .and_then(|r| r.resolve(reference).cloned())
    }

    /// All pull requests in a repository.
    #[must_use]
    pub fn pull_requests(&self, repo: &RepositoryId) -> Vec<DownstreamPullRequest> {
        self.read_or_panic()
            .repositories
            .get(repo)
            .map(|r| r.pulls.iter().map(|p| p.pr.clone()).collect())
            .unwrap_or_default()
    }

    /// Body and base branch of a pull request.
    #[must_use]
    pub fn pull_request_details(&self, repo: &RepositoryId, number: u64) -> Option<(String, String)> {
        self.read_or_panic().repositories.get(repo).and_then(|r| {
            r.pulls
                .iter()
                .find(|p| p.pr.number == number)
                .map(|p| (p.body.clone(), p.base.clone()))
        })
    }

    /// Comments on a pull request.
    #[must_use]
    pub fn comments(&self, repo: &RepositoryId, number: u64) -> Vec<Comment> {
        self.read_or_panic()
            .repositories
            .get(repo)
            .and_then(|r| r.pulls.iter().find(|p| p.pr.number == number))
            .map(|p| p.comments.clone())
            .unwrap_or_default()
    }

    /// Number of successful write operations so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.read_or_panic().writes
    }
}

#[async_trait]
impl RepositoryClient for InMemoryRepositories {
    async fn default_branch(&self, repo: &RepositoryId) -> Result<String, ClientError> {
        self.take_failure("default_branch")?;
        let state = self.read()?;
        Ok(state.repository(repo)?.default_branch.clone())
    }

    async fn get_branch(
        &self,
        repo: &RepositoryId,
        name: &str,
    ) -> Result<Option<Branch>, ClientError> {
        self.take_failure("get_branch")?;
        let state = self.read()?;
        Ok(state.repository(repo)?.branches.get(name).map(|b| Branch {
            name: name.to_string(),
            sha: b.head.clone(),
        }))
    }

    async fn create_branch(
        &self,
        repo: &RepositoryId,
        name: &str,
        from: &str,
    ) -> Result<Branch, ClientError> {
        self.take_failure("create_branch")?;
        let mut state = self.write()?;
        let repository = state.repository_mut(repo)?;

        if repository.branches.contains_key(name) {
            return Err(ClientError::conflict("Reference already exists"));
        }
        let head = repository
            .branches
            .get(from)
            .map(|b| b.head.clone())
            .ok_or_else(|| ClientError::not_found(format!("branch '{from}' in {repo}")))?;

        repository
            .branches
            .insert(name.to_string(), BranchState { head: head.clone() });
        state.writes += 1;
        Ok(Branch {
            name: name.to_string(),
            sha: head,
        })
    }

    async fn update_branch_content(
        &self,
        repo: &RepositoryId,
        branch: &str,
        tree: &FileTree,
        _message: &str,
    ) -> Result<String, ClientError> {
        self.take_failure("update_branch_content")?;
        let mut state = self.write()?;
        let sha = state.next_sha();
        let repository = state.repository_mut(repo)?;

        let Some(branch_state) = repository.branches.get_mut(branch) else {
            return Err(ClientError::not_found(format!("branch '{branch}' in {repo}")));
        };
        branch_state.head = sha.clone();
        repository.commits.insert(sha.clone(), tree.clone());
        state.writes += 1;
        Ok(sha)
    }

    async fn delete_branch(&self, repo: &RepositoryId, name: &str) -> Result<(), ClientError> {
        self.take_failure("delete_branch")?;
        let mut state = self.write()?;
        if state.repository_mut(repo)?.branches.remove(name).is_none() {
            return Err(ClientError::not_found(format!("branch '{name}' in {repo}")));
        }
        state.writes += 1;
        Ok(())
    }

    async fn get_tree(
        &self,
        repo: &RepositoryId,
        reference: &str,
    ) -> Result<FileTree, ClientError> {
        self.take_failure("get_tree")?;
        let state = self.read()?;
        state
            .repository(repo)?
            .resolve(reference)
            .cloned()
            .ok_or_else(|| ClientError::not_found(format!("ref '{reference}' in {repo}")))
    }

    async fn get_pull_request_by_branch(
        &self,
        repo: &RepositoryId,
        branch: &str,
    ) -> Result<Option<DownstreamPullRequest>, ClientError> {
        self.take_failure("get_pull_request_by_branch")?;
        let state = self.read()?;
        Ok(state
            .repository(repo)?
            .pulls
            .iter()
            .filter(|p| p.pr.head_ref == branch)
            .max_by_key(|p| p.pr.number)
            .map(|p| p.pr.clone()))
    }

    async fn create_pull_request(
        &self,
        repo: &RepositoryId,
        request: &NewPullRequest,
    ) -> Result<DownstreamPullRequest, ClientError> {
        self.take_failure("create_pull_request")?;
        let mut state = self.write()?;
        let number = state.next_id();
        let repository = state.repository_mut(repo)?;

        if !repository.branches.contains_key(&request.head) {
            return Err(ClientError::conflict(format!(
                "head branch '{}' does not exist",
                request.head
            )));
        }
        if repository
            .pulls
            .iter()
            .any(|p| p.pr.head_ref == request.head && p.pr.state == PullRequestState::Open)
        {
            return Err(ClientError::conflict(format!(
                "A pull request already exists for {}",
                request.head
            )));
        }

        let pr = DownstreamPullRequest {
            number,
            head_ref: request.head.clone(),
            state: PullRequestState::Open,
            title: request.title.clone(),
            html_url: format!("https://github.com/{repo}/pull/{number}"),
        };
        repository.pulls.push(PullState {
            pr: pr.clone(),
            base: request.base.clone(),
            body: request.body.clone(),
            comments: Vec::new(),
        });
        state.writes += 1;
        Ok(pr)
    }

    async fn set_pull_request_state(
        &self,
        repo: &RepositoryId,
        number: u64,
        target: TargetState,
    ) -> Result<(), ClientError> {
        self.take_failure("set_pull_request_state")?;
        let mut state = self.write()?;
        let pull = state.repository_mut(repo)?.pull_mut(number)?;

        if pull.pr.state == PullRequestState::Merged {
            return Err(ClientError::conflict("pull request is already merged"));
        }
        pull.pr.state = match target {
            TargetState::Open => PullRequestState::Open,
            TargetState::Closed => PullRequestState::Closed,
        };
        state.writes += 1;
        Ok(())
    }

    async fn update_pull_request_title(
        &self,
        repo: &RepositoryId,
        number: u64,
        title: &str,
    ) -> Result<(), ClientError> {
        self.take_failure("update_pull_request_title")?;
        let mut state = self.write()?;
        state.repository_mut(repo)?.pull_mut(number)?.pr.title = title.to_string();
        state.writes += 1;
        Ok(())
    }

    async fn list_comments(
        &self,
        repo: &RepositoryId,
        number: u64,
    ) -> Result<Vec<Comment>, ClientError> {
        self.take_failure("list_comments")?;
        let state = self.read()?;
        Ok(state.repository(repo)?.pull(number)?.comments.clone())
    }

    async fn post_comment(
        &self,
        repo: &RepositoryId,
        number: u64,
        body: &str,
    ) -> Result<Comment, ClientError> {
        self.take_failure("post_comment")?;
        let mut state = self.write()?;
        let id = state.next_id();
        let comment = Comment {
            id,
            body: body.to_string(),
        };
        state
            .repository_mut(repo)?
            .pull_mut(number)?
            .comments
            .push(comment.clone());
        state.writes += 1;
        Ok(comment)
    }
}
