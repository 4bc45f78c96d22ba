//! Repository identities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A GitHub repository identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryId {
    /// Repository owner (user or organization).
    pub owner: String,

    /// Repository name.
    pub name: String,
}

impl RepositoryId {
    /// Creates a repository identity.
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Full repository name in "owner/name" format.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Returns true if `full_name` refers to this repository.
    ///
    /// GitHub treats owner and repository names case-insensitively.
    #[must_use]
    pub fn matches(&self, full_name: &str) -> bool {
        full_name.eq_ignore_ascii_case(&self.full_name())
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
