//! Everything an event needs besides the repository client and generator.

use crate::config::{RepositoryId, SyncConfig};
use crate::naming::{MirrorNaming, NamingError};
use crate::templates::{TemplateError, TemplateRenderer};
use thiserror::Error;

/// Errors building a [`SyncContext`] from configuration.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Validated configuration, branch naming and compiled templates.
///
/// Built once and passed explicitly to everything that needs it.
#[derive(Debug)]
pub struct SyncContext {
    pub config: SyncConfig,
    pub upstream: RepositoryId,
    pub downstream: RepositoryId,
    pub naming: MirrorNaming,
    pub renderer: TemplateRenderer,
}

impl SyncContext {
    /// Compiles templates and branch naming from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] on an invalid branch prefix or template.
    pub fn new(config: SyncConfig) -> Result<Self, ContextError> {
        let naming = MirrorNaming::new(&config.sync.branch_prefix)?;
        let renderer = TemplateRenderer::new(&config.templates)?;
        Ok(Self {
            upstream: config.upstream.clone(),
            downstream: config.downstream_repository(),
            config,
            naming,
            renderer,
        })
    }

    /// Upstream base branch filter, if configured.
    #[must_use]
    pub fn base_branch(&self) -> Option<&str> {
        self.config.sync.base_branch.as_deref()
    }
}
