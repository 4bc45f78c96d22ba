//! Run summary types.

use super::EventOutcome;
use crate::engine::{ErrorKind, SyncError};
use serde::Serialize;
use std::collections::VecDeque;

/// Failed events kept in a [`RunSummary`]; older ones are only counted.
pub const MAX_RECORDED_FAILURES: usize = 100;

/// An event that could not be handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEvent {
    /// Upstream pull request number, when the payload got that far.
    pub upstream_number: Option<u64>,
    pub kind: ErrorKind,
    /// Whether redelivering the event may succeed.
    pub retryable: bool,
    pub error: String,
}

/// Summary of a complete run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Number of events received.
    pub events_received: usize,

    /// Number of events ignored (wrong repository, action or base branch).
    pub events_ignored: usize,

    /// Number of actions that wrote to the downstream repository.
    pub actions_applied: usize,

    /// Number of handled events that needed no downstream write.
    pub actions_unchanged: usize,

    /// Number of events that failed.
    pub events_failed: usize,

    /// The most recent failed events, oldest first. At most
    /// [`MAX_RECORDED_FAILURES`]; `events_failed` has the full count.
    pub failures: VecDeque<FailedEvent>,

    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl RunSummary {
    /// Creates a new empty summary.
    #[must_use]
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    /// Updates the summary with the result of one event.
    pub fn record_result(&mut self, result: &Result<EventOutcome, SyncError>) {
        self.events_received += 1;
        match result {
            Ok(EventOutcome::Ignored { .. }) => self.events_ignored += 1,
            Ok(EventOutcome::Applied { outcome, .. }) => {
                if outcome.changed_downstream() {
                    self.actions_applied += 1;
                } else {
                    self.actions_unchanged += 1;
                }
            }
            Err(error) => {
                self.events_failed += 1;
                self.push_failure(FailedEvent {
                    upstream_number: error.upstream_number(),
                    kind: error.kind(),
                    retryable: error.is_retryable(),
                    error: error.to_string(),
                });
            }
        }
    }

    /// Adds the counts and failures of `other` to this summary.
    pub fn merge(&mut self, other: RunSummary) {
        self.events_received += other.events_received;
        self.events_ignored += other.events_ignored;
        self.actions_applied += other.actions_applied;
        self.actions_unchanged += other.actions_unchanged;
        self.events_failed += other.events_failed;
        for failure in other.failures {
            self.push_failure(failure);
        }
    }

    /// Number of failed events no longer listed in `failures`.
    #[must_use]
    pub fn failures_omitted(&self) -> usize {
        self.events_failed.saturating_sub(self.failures.len())
    }

    fn push_failure(&mut self, failure: FailedEvent) {
        if self.failures.len() == MAX_RECORDED_FAILURES {
            self.failures.pop_front();
        }
        self.failures.push_back(failure);
    }

    /// Returns true if any failures occurred.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.events_failed > 0
    }

    /// Returns true if all operations were successful.
    #[must_use]
    pub fn all_success(&self) -> bool {
        self.events_failed == 0
    }
}
