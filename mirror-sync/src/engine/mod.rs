//! Event pipeline.
//!
//! For each inbound event the engine classifies it, discovers the
//! [`SyncLink`](crate::link::SyncLink), computes the generation diff when the
//! transition needs one, resolves an [`Action`](crate::resolver::Action) and
//! applies it. Events are handled strictly one after another.

mod error;

pub use error::{ErrorKind, SyncError};

use crate::client::RepositoryClient;
use crate::context::SyncContext;
use crate::events::{classify, Classification, InboundEvent, PrEventKind, UpstreamPrEvent};
use crate::executor::Executor;
use crate::generator::{compute_diff, DiffRequest, Generator};
use crate::link::discover_link;
use crate::resolver::resolve;
use crate::summary::{EventOutcome, RunSummary};
use tokio::sync::{mpsc, OnceCell};
use tracing::{error, info, info_span, warn, Instrument};

/// Mirrors upstream pull request events into the downstream repository.
pub struct SyncEngine<C, G> {
    client: C,
    generator: G,
    context: SyncContext,
    dry_run: bool,
    default_branch: OnceCell<String>,
}

impl<C, G> SyncEngine<C, G>
where
    C: RepositoryClient,
    G: Generator,
{
    #[must_use]
    pub fn new(client: C, generator: G, context: SyncContext) -> Self {
        Self {
            client,
            generator,
            context,
            dry_run: false,
            default_branch: OnceCell::new(),
        }
    }

    /// Resolves actions but only logs them.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    #[must_use]
    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    #[must_use]
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Handles one inbound event to completion.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] when the payload is malformed, a repository
    /// call or the generator fails, or the event exceeds its deadline.
    pub async fn handle(&self, event: &InboundEvent) -> Result<EventOutcome, SyncError> {
        let event = match classify(event, self.context.base_branch())? {
            Classification::Upstream(event) => event,
            Classification::Ignored { reason } => {
                info!(reason = %reason, "Ignoring event");
                return Ok(EventOutcome::Ignored { reason });
            }
        };

        let number = event.number();
        let span = info_span!(
            "handle_event",
            upstream_pr = number,
            event = event.kind.as_str()
        );
        let timeout = self.context.config.sync.event_timeout();

        match tokio::time::timeout(timeout, self.process(&event))
            .instrument(span)
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                upstream_number: number,
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    async fn process(&self, event: &UpstreamPrEvent) -> Result<EventOutcome, SyncError> {
        let number = event.number();
        let repository_error = |source| SyncError::Repository {
            upstream_number: number,
            source,
        };

        let default_branch = self.default_branch().await.map_err(repository_error)?;
        let link = discover_link(
            &self.client,
            &self.context.downstream,
            &self.context.naming,
            number,
        )
        .await
        .map_err(repository_error)?;

        let reopening_linked_pr =
            event.kind == PrEventKind::Reopened && link.as_ref().is_some_and(|l| l.pull_request.is_some());

        let diff = if event.kind.needs_diff() && !reopening_linked_pr {
            // A mirror branch without a pull request is compared like a fresh
            // one, so that a diff against the default branch recreates the PR.
            let compare_ref = link
                .as_ref()
                .filter(|l| l.branch_exists && l.pull_request.is_some())
                .map_or(default_branch, |l| l.branch.as_str());
            let request = DiffRequest {
                upstream: &self.context.upstream,
                head_sha: &event.pull_request.head_sha,
                downstream: &self.context.downstream,
                compare_ref,
            };
            Some(
                compute_diff(&self.client, &self.generator, request)
                    .await
                    .map_err(|e| SyncError::from_diff(number, e))?,
            )
        } else {
            None
        };

        let action = resolve(event, diff.as_ref(), link.as_ref(), &self.context.naming);
        info!(action = action.name(), "Resolved action");

        let outcome = Executor::new(&self.client, &self.context, default_branch)
            .with_dry_run(self.dry_run)
            .apply(&action)
            .await
            .map_err(|source| SyncError::Execution {
                upstream_number: number,
                action: action.name(),
                source,
            })?;

        info!(
            action = action.name(),
            outcome = outcome.as_str(),
            "Event handled"
        );

        Ok(EventOutcome::Applied {
            upstream_number: number,
            event: event.kind,
            action: action.name(),
            outcome,
        })
    }

    /// Downstream default branch, from configuration or queried once.
    async fn default_branch(&self) -> Result<&str, crate::client::ClientError> {
        if let Some(branch) = &self.context.config.downstream.default_branch {
            return Ok(branch);
        }
        let branch = self
            .default_branch
            .get_or_try_init(|| self.client.default_branch(&self.context.downstream))
            .await?;
        Ok(branch)
    }

    /// Handles events from `events` one at a time until the channel closes.
    ///
    /// Failures are logged and recorded; they never stop the loop.
    pub async fn run(&self, mut events: mpsc::Receiver<InboundEvent>) -> RunSummary {
        let mut summary = RunSummary::new(self.dry_run);

        while let Some(event) = events.recv().await {
            let result = self.handle(&event).await;
            if let Err(e) = &result {
                report_failure(e);
            }
            summary.record_result(&result);
        }

        info!(
            received = summary.events_received,
            applied = summary.actions_applied,
            failed = summary.events_failed,
            "Event stream closed"
        );
        summary
    }
}

/// Logs a failed event, as a warning when redelivery may succeed.
pub(crate) fn report_failure(error: &SyncError) {
    if error.is_retryable() {
        warn!(
            upstream_pr = ?error.upstream_number(),
            kind = error.kind().as_str(),
            error = %error,
            "Event failed, redelivery may succeed"
        );
    } else {
        error!(
            upstream_pr = ?error.upstream_number(),
            kind = error.kind().as_str(),
            error = %error,
            "Event failed"
        );
    }
}
