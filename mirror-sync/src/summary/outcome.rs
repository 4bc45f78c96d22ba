//! Per-event outcome types.

use crate::events::PrEventKind;
use crate::executor::ActionOutcome;
use serde::Serialize;

/// Result of handling one inbound event successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum EventOutcome {
    /// The event is outside the engine's concern.
    Ignored {
        /// Reason for ignoring.
        reason: String,
    },

    /// An action was resolved and applied.
    Applied {
        /// Upstream pull request number.
        upstream_number: u64,
        /// Upstream transition.
        event: PrEventKind,
        /// Name of the resolved action.
        action: &'static str,
        /// What applying it changed.
        outcome: ActionOutcome,
    },
}

impl EventOutcome {
    /// Upstream pull request number, if the event was handled.
    #[must_use]
    pub fn upstream_number(&self) -> Option<u64> {
        match self {
            Self::Ignored { .. } => None,
            Self::Applied {
                upstream_number, ..
            } => Some(*upstream_number),
        }
    }
}
