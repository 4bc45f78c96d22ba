//! Run summary types and helpers.

mod outcome;
mod run_summary;

pub use outcome::EventOutcome;
pub use run_summary::{FailedEvent, RunSummary, MAX_RECORDED_FAILURES};
