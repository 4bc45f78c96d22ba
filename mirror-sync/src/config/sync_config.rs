//! The `mirror-sync.toml` configuration file.

use crate::config::{ConfigError, RepositoryId, TemplatesConfig};
use crate::naming::{MirrorNaming, DEFAULT_BRANCH_PREFIX};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Overrides `generator.timeout-secs` when set to a positive integer.
pub const GENERATOR_TIMEOUT_ENV: &str = "MIRROR_SYNC_GENERATOR_TIMEOUT_SECS";

/// Complete bot configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SyncConfig {
    /// Repository with the hand-written source.
    pub upstream: RepositoryId,

    /// Repository with the generated code.
    pub downstream: DownstreamConfig,

    /// Mirroring behaviour.
    #[serde(default)]
    pub sync: SyncSettings,

    /// How to run the code generator.
    pub generator: GeneratorSettings,

    /// Texts written to the downstream repository.
    #[serde(default)]
    pub templates: TemplatesConfig,

    /// GitHub API settings.
    #[serde(default)]
    pub github: GitHubSettings,
}

/// The `[downstream]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DownstreamConfig {
    /// Repository owner.
    pub owner: String,

    /// Repository name.
    pub name: String,

    /// Branch mirror branches are created from and pull requests target.
    /// Queried from the API when absent.
    pub default_branch: Option<String>,
}

impl DownstreamConfig {
    /// Returns the downstream repository identity.
    #[must_use]
    pub fn repository(&self) -> RepositoryId {
        RepositoryId::new(&self.owner, &self.name)
    }
}

/// The `[sync]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SyncSettings {
    /// Prefix of mirror branch names; the upstream PR number is appended.
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,

    /// Only upstream pull requests targeting this branch are mirrored.
    pub base_branch: Option<String>,

    /// Deadline for handling a single event.
    #[serde(default = "default_event_timeout_secs")]
    pub event_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            branch_prefix: default_branch_prefix(),
            base_branch: None,
            event_timeout_secs: default_event_timeout_secs(),
        }
    }
}

impl SyncSettings {
    /// Returns the per-event deadline.
    #[must_use]
    pub fn event_timeout(&self) -> Duration {
        Duration::from_secs(self.event_timeout_secs)
    }
}

/// The `[generator]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GeneratorSettings {
    /// Program and arguments. `{upstream}` and `{workspace}` are substituted.
    pub command: Vec<String>,

    /// Maximum generator runtime.
    #[serde(default = "default_generator_timeout_secs")]
    pub timeout_secs: u64,

    /// Path components or prefixes left out of the generated tree.
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl GeneratorSettings {
    /// Returns the generator timeout, honouring [`GENERATOR_TIMEOUT_ENV`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        if let Ok(val) = std::env::var(GENERATOR_TIMEOUT_ENV) {
            match val.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => return Duration::from_secs(secs),
                _ => warn!(
                    value = %val,
                    "Ignoring invalid {GENERATOR_TIMEOUT_ENV}"
                ),
            }
        }
        Duration::from_secs(self.timeout_secs)
    }
}

/// The `[github]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitHubSettings {
    /// API base URL for GitHub Enterprise installations.
    pub api_base_url: Option<String>,
}

fn default_branch_prefix() -> String {
    DEFAULT_BRANCH_PREFIX.to_string()
}

fn default_event_timeout_secs() -> u64 {
    900
}

fn default_generator_timeout_secs() -> u64 {
    600
}

impl SyncConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is missing, unreadable, malformed,
    /// or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading configuration");

        if !path.exists() {
            return Err(ConfigError::MissingFile {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::parse(&content, path)
    }

    /// Parses and validates configuration text. `origin` is only used in errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the content is malformed or invalid.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlError {
            path: origin.display().to_string(),
            source: e,
        })?;
        config.validate(origin)?;
        Ok(config)
    }

    /// Returns the downstream repository identity.
    #[must_use]
    pub fn downstream_repository(&self) -> RepositoryId {
        self.downstream.repository()
    }

    /// Validates values serde cannot check.
    fn validate(&self, origin: &Path) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::ValidationError {
            path: origin.display().to_string(),
            message,
        };

        for (section, owner, name) in [
            ("upstream", &self.upstream.owner, &self.upstream.name),
            ("downstream", &self.downstream.owner, &self.downstream.name),
        ] {
            if owner.trim().is_empty() || name.trim().is_empty() {
                return Err(invalid(format!("[{section}] owner and name are required")));
            }
        }

        if self.upstream == self.downstream_repository() {
            return Err(invalid(
                "upstream and downstream must be different repositories".to_string(),
            ));
        }

        if let Some(branch) = &self.downstream.default_branch {
            if branch.trim().is_empty() {
                return Err(invalid("downstream default-branch is empty".to_string()));
            }
        }

        MirrorNaming::new(&self.sync.branch_prefix).map_err(|e| invalid(e.to_string()))?;

        if self.sync.event_timeout_secs == 0 {
            return Err(invalid("sync.event-timeout-secs must be positive".to_string()));
        }

        if self.generator.command.is_empty() || self.generator.command[0].trim().is_empty() {
            return Err(invalid("generator.command must name a program".to_string()));
        }

        if self.generator.timeout_secs == 0 {
            return Err(invalid("generator.timeout-secs must be positive".to_string()));
        }

        if let Some(api_base_url) = &self.github.api_base_url {
            if Url::parse(api_base_url).is_err() {
                return Err(invalid(format!(
                    "github.api-base-url is not a valid URL: {api_base_url}"
                )));
            }
        }

        Ok(())
    }
}
