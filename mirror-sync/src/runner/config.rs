//! Runner configuration.

use crate::events::PayloadFormat;
use std::path::{Path, PathBuf};

/// Command line level settings for a run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Path to the TOML configuration file.
    config_path: PathBuf,
    /// GitHub token used for API calls.
    token: String,
    /// Whether to resolve actions without applying them.
    dry_run: bool,
    /// Encoding of incoming payloads.
    format: PayloadFormat,
}

impl RunnerConfig {
    /// Creates a new configuration for a run.
    pub fn new(config_path: PathBuf, token: String, dry_run: bool) -> Self {
        Self {
            config_path,
            token,
            dry_run,
            format: PayloadFormat::Normalized,
        }
    }

    /// Sets the payload encoding.
    pub fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    /// Returns the configuration file path.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Returns the configured GitHub token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns whether dry-run mode is enabled.
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Returns the payload encoding.
    pub fn format(&self) -> &PayloadFormat {
        &self.format
    }
}
