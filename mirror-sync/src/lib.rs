#![doc = include_str!(concat!("../", env!("CARGO_PKG_README")))]

pub mod client;
pub mod config;
pub mod context;
pub mod engine;
pub mod events;
pub mod executor;
pub mod generator;
pub mod link;
pub mod naming;
pub mod resolver;
pub mod runner;
pub mod summary;
pub mod templates;
pub mod tree;

pub use client::{
    Branch, ClientError, Comment, DownstreamPullRequest, GitHubClient, InMemoryRepositories,
    NewPullRequest, RepositoryClient, TargetState,
};
pub use config::{ConfigError, RepositoryId, SyncConfig, TemplatesConfig};
pub use context::{ContextError, SyncContext};
pub use engine::{ErrorKind, SyncEngine, SyncError};
pub use events::{
    classify, Classification, EventError, InboundEvent, PayloadFormat, PrEventKind,
    PullRequestState, UpstreamPrEvent, UpstreamPullRequest,
};
pub use executor::{merge_marker, state_marker, ActionOutcome, ExecutionError, Executor};
pub use generator::{
    compute_diff, CommandGenerator, DiffError, DiffRequest, GeneratedDiff, GenerationError,
    Generator,
};
pub use link::{discover_link, SyncLink};
pub use naming::{MirrorNaming, NamingError};
pub use resolver::{resolve, Action};
pub use runner::{Runner, RunnerConfig, RunnerError};
pub use summary::{EventOutcome, FailedEvent, RunSummary, MAX_RECORDED_FAILURES};
pub use templates::{TemplateError, TemplateRenderer};
pub use tree::{ChangeKind, FileEntry, FileMode, FileTree, TreeChange};
