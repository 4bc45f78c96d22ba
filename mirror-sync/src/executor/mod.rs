//! Action executor.
//!
//! Applies a resolved [`Action`] to the downstream repository. Every action
//! re-reads the downstream state it depends on and writes only what is
//! missing, so applying the same action twice has the effect of applying it
//! once.

mod error;
mod outcome;

pub use error::ExecutionError;
pub use outcome::ActionOutcome;

use crate::client::{DownstreamPullRequest, NewPullRequest, RepositoryClient, TargetState};
use crate::context::SyncContext;
use crate::events::{PullRequestState, UpstreamPullRequest};
use crate::resolver::Action;
use crate::templates::{TemplateData, TemplateKind};
use crate::tree::FileTree;
use tracing::{debug, info, warn};

/// Hidden marker identifying the merge notice for an upstream pull request.
#[must_use]
pub fn merge_marker(upstream_number: u64) -> String {
    format!("<!-- mirror-sync:merged:{upstream_number} -->")
}

/// Hidden marker identifying a close or reopen notice.
#[must_use]
pub fn state_marker(upstream_number: u64, state: TargetState) -> String {
    format!("<!-- mirror-sync:{}:{upstream_number} -->", state.as_str())
}

/// Applies actions against the downstream repository.
pub struct Executor<'a, C: ?Sized> {
    client: &'a C,
    context: &'a SyncContext,
    default_branch: &'a str,
    dry_run: bool,
}

impl<'a, C> Executor<'a, C>
where
    C: RepositoryClient + ?Sized,
{
    /// `default_branch` is the downstream branch mirror branches start from
    /// and pull requests target.
    #[must_use]
    pub fn new(client: &'a C, context: &'a SyncContext, default_branch: &'a str) -> Self {
        Self {
            client,
            context,
            default_branch,
            dry_run: false,
        }
    }

    /// Logs actions instead of applying them.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Applies `action`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when a repository call fails, a template
    /// cannot be rendered, or the targeted pull request disappeared.
    pub async fn apply(&self, action: &Action) -> Result<ActionOutcome, ExecutionError> {
        match action {
            Action::NoOp { reason } => {
                debug!(reason = %reason, "Nothing to apply");
                Ok(ActionOutcome::Skipped {
                    reason: reason.clone(),
                })
            }
            _ if self.dry_run => {
                info!(action = action.name(), "[DRY RUN] Would apply action");
                Ok(ActionOutcome::DryRun)
            }
            Action::CreateBranchAndPr {
                branch,
                tree,
                upstream,
            } => {
                self.create_branch(branch).await?;
                self.sync_branch(branch, tree, upstream).await
            }
            Action::UpdateBranch {
                branch,
                tree,
                upstream,
            } => {
                if self
                    .client
                    .get_branch(&self.context.downstream, branch)
                    .await
                    .map_err(ExecutionError::repository("read mirror branch"))?
                    .is_none()
                {
                    warn!(branch = %branch, "Mirror branch is missing, recreating");
                    self.create_branch(branch).await?;
                }
                self.sync_branch(branch, tree, upstream).await
            }
            Action::CloseDownstreamPr { number, upstream } => {
                self.transition(*number, upstream, TargetState::Closed).await
            }
            Action::ReopenDownstreamPr { number, upstream } => {
                self.transition(*number, upstream, TargetState::Open).await
            }
            Action::PostMergeComment { number, upstream } => {
                self.post_merge_comment(*number, upstream).await
            }
            Action::SyncTitle { number, upstream } => self.sync_title(*number, upstream).await,
        }
    }

    fn template_data(&self, upstream: &UpstreamPullRequest) -> TemplateData {
        TemplateData::new(
            &self.context.upstream,
            &self.context.downstream,
            upstream,
            &self.context.naming.branch_name(upstream.number),
        )
    }

    /// Creates the mirror branch from the default branch. An existing branch
    /// is left as is.
    async fn create_branch(&self, branch: &str) -> Result<(), ExecutionError> {
        match self
            .client
            .create_branch(&self.context.downstream, branch, self.default_branch)
            .await
        {
            Ok(created) => {
                info!(branch = %branch, sha = %created.sha, "Created mirror branch");
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                info!(branch = %branch, "Mirror branch already exists, updating it instead");
                Ok(())
            }
            Err(e) => Err(ExecutionError::Repository {
                operation: "create mirror branch",
                source: e,
            }),
        }
    }

    /// Brings the branch content to `tree` and makes sure a pull request
    /// exists for it.
    async fn sync_branch(
        &self,
        branch: &str,
        tree: &FileTree,
        upstream: &UpstreamPullRequest,
    ) -> Result<ActionOutcome, ExecutionError> {
        let repo = &self.context.downstream;
        let data = self.template_data(upstream);

        let current = self
            .client
            .get_tree(repo, branch)
            .await
            .map_err(ExecutionError::repository("read mirror branch tree"))?;

        let commit = if current.same_content(tree) {
            debug!(branch = %branch, "Mirror branch already holds the generated tree");
            None
        } else {
            let message = self
                .context
                .renderer
                .render(TemplateKind::CommitMessage, &data)?;
            let sha = self
                .client
                .update_branch_content(repo, branch, tree, &message)
                .await
                .map_err(ExecutionError::repository("commit generated tree"))?;
            info!(branch = %branch, commit = %sha, "Pushed generated tree");
            Some(sha)
        };

        let (pr, created) = self.ensure_pull_request(branch, &data).await?;

        Ok(match (created, commit) {
            (true, _) => ActionOutcome::Created {
                number: pr.number,
                url: pr.html_url,
            },
            (false, Some(commit)) => ActionOutcome::Updated { commit },
            (false, None) => ActionOutcome::AlreadyUpToDate,
        })
    }

    /// Returns the pull request for `branch`, opening one when there is none.
    ///
    /// An open or closed pull request is reused. A merged one is not.
    async fn ensure_pull_request(
        &self,
        branch: &str,
        data: &TemplateData,
    ) -> Result<(DownstreamPullRequest, bool), ExecutionError> {
        let repo = &self.context.downstream;

        if let Some(pr) = self.find_pull_request(branch).await? {
            if pr.state != PullRequestState::Merged {
                debug!(downstream_pr = pr.number, state = pr.state.as_str(), "Reusing pull request");
                return Ok((pr, false));
            }
        }

        let request = NewPullRequest {
            head: branch.to_string(),
            base: self.default_branch.to_string(),
            title: self.context.renderer.render_title(data)?,
            body: self.context.renderer.render(TemplateKind::PrBody, data)?,
        };

        match self.client.create_pull_request(repo, &request).await {
            Ok(pr) => {
                info!(downstream_pr = pr.number, url = %pr.html_url, "Opened downstream pull request");
                Ok((pr, true))
            }
            Err(e) if e.is_conflict() => {
                info!(branch = %branch, "Pull request already exists, re-reading it");
                match self.find_pull_request(branch).await? {
                    Some(pr) => Ok((pr, false)),
                    None => Err(ExecutionError::Repository {
                        operation: "open downstream pull request",
                        source: e,
                    }),
                }
            }
            Err(e) => Err(ExecutionError::Repository {
                operation: "open downstream pull request",
                source: e,
            }),
        }
    }

    async fn find_pull_request(
        &self,
        branch: &str,
    ) -> Result<Option<DownstreamPullRequest>, ExecutionError> {
        self.client
            .get_pull_request_by_branch(&self.context.downstream, branch)
            .await
            .map_err(ExecutionError::repository("look up downstream pull request"))
    }

    /// Re-reads pull request `number` through the mirror branch.
    async fn current_pull_request(
        &self,
        number: u64,
        upstream: &UpstreamPullRequest,
    ) -> Result<DownstreamPullRequest, ExecutionError> {
        let branch = self.context.naming.branch_name(upstream.number);
        match self.find_pull_request(&branch).await? {
            Some(pr) if pr.number == number => Ok(pr),
            _ => Err(ExecutionError::MissingPullRequest { number, branch }),
        }
    }

    /// Moves the pull request to `target` and leaves a notice.
    ///
    /// The notice is keyed by a hidden marker, so a delivery that changed
    /// the state but failed to comment is completed on redelivery.
    async fn transition(
        &self,
        number: u64,
        upstream: &UpstreamPullRequest,
        target: TargetState,
    ) -> Result<ActionOutcome, ExecutionError> {
        let pr = self.current_pull_request(number, upstream).await?;
        if pr.state == PullRequestState::Merged {
            info!(downstream_pr = number, "Downstream pull request is merged, leaving it");
            return Ok(ActionOutcome::Skipped {
                reason: format!("downstream pull request #{number} is merged"),
            });
        }

        let (wanted, comment, outcome) = match target {
            TargetState::Closed => (
                PullRequestState::Closed,
                TemplateKind::CloseComment,
                ActionOutcome::Closed,
            ),
            TargetState::Open => (
                PullRequestState::Open,
                TemplateKind::ReopenComment,
                ActionOutcome::Reopened,
            ),
        };

        let repo = &self.context.downstream;
        let changed = pr.state != wanted;
        if changed {
            self.client
                .set_pull_request_state(repo, number, target)
                .await
                .map_err(ExecutionError::repository("change pull request state"))?;
            info!(downstream_pr = number, state = target.as_str(), "Changed pull request state");
        }

        if self.latest_state_notice(number, upstream.number).await? == Some(target) {
            debug!(downstream_pr = number, state = wanted.as_str(), "Already in target state");
            return Ok(if changed {
                outcome
            } else {
                ActionOutcome::AlreadyInState
            });
        }

        let text = self
            .context
            .renderer
            .render(comment, &self.template_data(upstream))?;
        let body = format!("{}\n\n{}", text.trim_end(), state_marker(upstream.number, target));
        self.client
            .post_comment(repo, number, &body)
            .await
            .map_err(ExecutionError::repository("post state notice"))?;

        Ok(if changed {
            outcome
        } else {
            ActionOutcome::Commented
        })
    }

    /// State named by the most recent close or reopen notice, if any.
    async fn latest_state_notice(
        &self,
        number: u64,
        upstream_number: u64,
    ) -> Result<Option<TargetState>, ExecutionError> {
        let comments = self
            .client
            .list_comments(&self.context.downstream, number)
            .await
            .map_err(ExecutionError::repository("list comments"))?;

        let closed = state_marker(upstream_number, TargetState::Closed);
        let open = state_marker(upstream_number, TargetState::Open);
        Ok(comments.iter().rev().find_map(|c| {
            if c.body.contains(&closed) {
                Some(TargetState::Closed)
            } else if c.body.contains(&open) {
                Some(TargetState::Open)
            } else {
                None
            }
        }))
    }

    async fn post_merge_comment(
        &self,
        number: u64,
        upstream: &UpstreamPullRequest,
    ) -> Result<ActionOutcome, ExecutionError> {
        let repo = &self.context.downstream;
        let marker = merge_marker(upstream.number);

        let comments = self
            .client
            .list_comments(repo, number)
            .await
            .map_err(ExecutionError::repository("list comments"))?;

        if comments.iter().any(|c| c.body.contains(&marker)) {
            debug!(downstream_pr = number, "Merge notice already posted");
            return Ok(ActionOutcome::AlreadyInState);
        }

        let text = self
            .context
            .renderer
            .render(TemplateKind::MergeComment, &self.template_data(upstream))?;
        let body = format!("{}\n\n{marker}", text.trim_end());

        self.client
            .post_comment(repo, number, &body)
            .await
            .map_err(ExecutionError::repository("post merge notice"))?;
        info!(downstream_pr = number, "Posted merge notice");

        Ok(ActionOutcome::Commented)
    }

    async fn sync_title(
        &self,
        number: u64,
        upstream: &UpstreamPullRequest,
    ) -> Result<ActionOutcome, ExecutionError> {
        let pr = self.current_pull_request(number, upstream).await?;
        let title = self
            .context
            .renderer
            .render_title(&self.template_data(upstream))?;

        if pr.title == title {
            debug!(downstream_pr = number, "Title already in sync");
            return Ok(ActionOutcome::AlreadyUpToDate);
        }

        self.client
            .update_pull_request_title(&self.context.downstream, number, &title)
            .await
            .map_err(ExecutionError::repository("update pull request title"))?;
        info!(downstream_pr = number, title = %title, "Updated pull request title");

        Ok(ActionOutcome::Retitled)
    }
}
