//! Deterministic naming of mirror branches.
//!
//! The mirror branch for an upstream pull request is derived from nothing but
//! the pull request number. This is what lets the bot rediscover the link
//! between both repositories without storing anything.

use bstr::ByteSlice;
use thiserror::Error;

/// Prefix used when the configuration does not set one.
pub const DEFAULT_BRANCH_PREFIX: &str = "sync/pr-";

/// Errors for invalid naming configuration.
#[derive(Debug, Error)]
pub enum NamingError {
    /// The prefix does not produce valid git branch names.
    #[error("Invalid branch prefix '{prefix}': {message}")]
    InvalidPrefix { prefix: String, message: String },
}

/// Maps upstream pull request numbers to mirror branch names.
///
/// With the default prefix, upstream PR #5 maps to `sync/pr-5`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorNaming {
    prefix: String,
}

impl Default for MirrorNaming {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_BRANCH_PREFIX.to_string(),
        }
    }
}

impl MirrorNaming {
    /// Creates a naming scheme, checking that `prefix` yields valid refs.
    ///
    /// # Errors
    ///
    /// Returns [`NamingError::InvalidPrefix`] if the prefix is empty or the
    /// resulting `refs/heads/...` name is rejected by git's rules.
    pub fn new(prefix: impl Into<String>) -> Result<Self, NamingError> {
        let prefix = prefix.into();
        if prefix.trim().is_empty() {
            return Err(NamingError::InvalidPrefix {
                prefix,
                message: "prefix is empty".to_string(),
            });
        }

        let sample = format!("refs/heads/{prefix}1");
        if let Err(e) = gix_validate::reference::name(sample.as_bytes().as_bstr()) {
            return Err(NamingError::InvalidPrefix {
                prefix,
                message: e.to_string(),
            });
        }

        Ok(Self { prefix })
    }

    /// Returns the configured prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Mirror branch name for an upstream pull request.
    #[must_use]
    pub fn branch_name(&self, upstream_number: u64) -> String {
        format!("{}{}", self.prefix, upstream_number)
    }
}
