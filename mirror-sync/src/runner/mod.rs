//! Wires configuration, the GitHub client and the generator into an engine
//! and feeds it raw payloads.

mod config;
mod error;

pub use config::RunnerConfig;
pub use error::RunnerError;

use crate::client::{GitHubClient, RepositoryClient};
use crate::config::SyncConfig;
use crate::context::SyncContext;
use crate::engine::{report_failure, SyncEngine, SyncError};
use crate::events::PayloadFormat;
use crate::generator::{CommandGenerator, Generator};
use crate::summary::RunSummary;
use tokio::sync::mpsc;
use tracing::{error, info};

const EVENT_QUEUE: usize = 32;

/// Drives a [`SyncEngine`] from a stream of raw payloads.
pub struct Runner<C, G> {
    engine: SyncEngine<C, G>,
    format: PayloadFormat,
}

impl Runner<GitHubClient, CommandGenerator> {
    /// Builds a runner talking to GitHub from the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] if the configuration cannot be loaded or the
    /// client cannot be created.
    pub fn new(config: &RunnerConfig) -> Result<Self, RunnerError> {
        info!(path = %config.config_path().display(), "Loading configuration");
        let sync_config = SyncConfig::load(config.config_path())?;

        let client = GitHubClient::new(config.token(), sync_config.github.api_base_url.as_deref())?;
        let generator = CommandGenerator::from_settings(&sync_config.generator);
        let context = SyncContext::new(sync_config)?;

        info!(
            upstream = %context.upstream,
            downstream = %context.downstream,
            dry_run = config.dry_run(),
            "Mirroring pull requests"
        );

        let engine = SyncEngine::new(client, generator, context).with_dry_run(config.dry_run());
        Ok(Self::with_engine(engine, config.format().clone()))
    }
}

impl<C, G> Runner<C, G>
where
    C: RepositoryClient,
    G: Generator,
{
    #[must_use]
    pub fn with_engine(engine: SyncEngine<C, G>, format: PayloadFormat) -> Self {
        Self { engine, format }
    }

    #[must_use]
    pub fn engine(&self) -> &SyncEngine<C, G> {
        &self.engine
    }

    /// Parses and handles a single payload.
    ///
    /// A blank payload yields an empty summary.
    pub async fn handle_payload(&self, payload: &str) -> RunSummary {
        let mut summary = RunSummary::new(self.engine.is_dry_run());
        if payload.trim().is_empty() {
            return summary;
        }

        let context = self.engine.context();
        let result = match self
            .format
            .parse(payload, &context.upstream, &context.downstream)
        {
            Ok(event) => self.engine.handle(&event).await,
            Err(e) => Err(SyncError::Event(e)),
        };
        if let Err(e) = &result {
            report_failure(e);
        }
        summary.record_result(&result);
        summary
    }

    /// Parses payloads from `payloads` and handles them in arrival order.
    ///
    /// Blank payloads are skipped. Payloads that fail to parse are logged
    /// and counted as failed events.
    pub async fn run(&self, mut payloads: mpsc::Receiver<String>) -> RunSummary {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE);
        let context = self.engine.context();
        let dry_run = self.engine.is_dry_run();

        let parse = async move {
            let mut rejected = RunSummary::new(dry_run);
            while let Some(payload) = payloads.recv().await {
                if payload.trim().is_empty() {
                    continue;
                }
                match self
                    .format
                    .parse(&payload, &context.upstream, &context.downstream)
                {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "Rejected payload");
                        rejected.record_result(&Err(SyncError::Event(e)));
                    }
                }
            }
            rejected
        };

        let (mut summary, rejected) = tokio::join!(self.engine.run(rx), parse);
        summary.merge(rejected);
        summary
    }
}
