//! Configuration loading.
//!
//! This module parses the TOML file describing the two mirrored
//! repositories, the generator command and the texts the bot writes.
//! Credentials are never part of the file.

mod error;
mod repository;
mod sync_config;
mod templates;

pub use error::ConfigError;
pub use repository::RepositoryId;
pub use sync_config::{
    DownstreamConfig, GeneratorSettings, GitHubSettings, SyncConfig, SyncSettings,
    GENERATOR_TIMEOUT_ENV,
};
pub use templates::{
    default_close_comment, default_commit_message, default_merge_comment, default_pr_body,
    default_pr_title, default_reopen_comment, TemplatesConfig,
};
