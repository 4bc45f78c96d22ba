//! CLI for mirror-sync.
//!
//! Reads pull request event payloads from a file or stdin and mirrors the
//! upstream pull requests they describe into the downstream repository.

use clap::{Parser, Subcommand};
use mirror_sync::{PayloadFormat, RunSummary, Runner, RunnerConfig, RunnerError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Mirror upstream pull requests into a repository of generated code.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file.
    #[arg(long, default_value = "mirror-sync.toml")]
    config: PathBuf,

    /// GitHub token with write access to the downstream repository.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: String,

    /// Resolve actions without changing the downstream repository.
    #[arg(long)]
    dry_run: bool,

    /// Print the summary as JSON.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Handle a single payload.
    Handle {
        /// Payload file, or `-` for stdin.
        payload: PathBuf,

        /// Treat the payload as a GitHub webhook body for this
        /// `X-GitHub-Event` name.
        #[arg(long)]
        github_event: Option<String>,
    },

    /// Handle newline-delimited payloads from stdin until it closes.
    Listen {
        /// Treat payloads as GitHub webhook bodies for this event name.
        #[arg(long)]
        github_event: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    init_tracing();

    // Parse arguments
    let args = Args::parse();

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed");
    }

    let json = args.json;
    match run(args).await {
        Ok(summary) => {
            print_summary(&summary, json);

            if summary.has_failures() {
                ExitCode::from(1)
            } else {
                ExitCode::from(0)
            }
        }
        Err(e) => {
            error!(error = %e, "Critical failure");
            ExitCode::from(2)
        }
    }
}

/// Initializes tracing with environment filter support.
///
/// Sets up the global tracing subscriber with:
/// - Compact log formatting (single-line output)
/// - Log level filtering via `RUST_LOG` env var (defaults to "info")
fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn payload_format(github_event: Option<String>) -> PayloadFormat {
    match github_event {
        Some(event_name) => PayloadFormat::GitHub { event_name },
        None => PayloadFormat::Normalized,
    }
}

/// Main execution logic.
async fn run(args: Args) -> Result<RunSummary, RunnerError> {
    let github_event = match &args.command {
        Command::Handle { github_event, .. } | Command::Listen { github_event } => {
            github_event.clone()
        }
    };
    let config = RunnerConfig::new(args.config, args.token, args.dry_run)
        .with_format(payload_format(github_event));
    let runner = Runner::new(&config)?;

    match args.command {
        Command::Handle { payload, .. } => {
            let body = read_payload(&payload).await?;
            Ok(runner.handle_payload(&body).await)
        }
        Command::Listen { .. } => {
            let (tx, rx) = mpsc::channel(16);
            let reader = tokio::spawn(forward_stdin_lines(tx));
            let summary = runner.run(rx).await;
            match reader.await {
                Ok(Ok(())) => Ok(summary),
                Ok(Err(source)) => Err(RunnerError::Input {
                    source_name: "stdin".to_string(),
                    source,
                }),
                Err(e) => Err(RunnerError::Input {
                    source_name: "stdin".to_string(),
                    source: std::io::Error::other(e),
                }),
            }
        }
    }
}

async fn read_payload(path: &Path) -> Result<String, RunnerError> {
    let source_name = path.display().to_string();
    let result = if source_name == "-" {
        let mut body = String::new();
        tokio::io::stdin()
            .read_to_string(&mut body)
            .await
            .map(|_| body)
    } else {
        tokio::fs::read_to_string(path).await
    };
    result.map_err(|source| RunnerError::Input {
        source_name,
        source,
    })
}

async fn forward_stdin_lines(tx: mpsc::Sender<String>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if tx.send(line).await.is_err() {
            break;
        }
    }
    Ok(())
}

/// Prints the final run summary.
fn print_summary(summary: &RunSummary, json: bool) {
    if json {
        match serde_json::to_string_pretty(summary) {
            Ok(text) => println!("{text}"),
            Err(e) => error!(error = %e, "Failed to serialize summary"),
        }
        return;
    }

    println!("\nSummary:");
    println!(
        "  Mode: {}",
        if summary.dry_run { "Dry Run" } else { "Live" }
    );
    println!("  Events received: {}", summary.events_received);
    println!("  Events ignored: {}", summary.events_ignored);
    println!("  Actions applied: {}", summary.actions_applied);
    println!("  Already in sync: {}", summary.actions_unchanged);
    println!("  Events failed: {}", summary.events_failed);

    if summary.failures_omitted() > 0 {
        println!("    ({} earlier failures not listed)", summary.failures_omitted());
    }
    for failure in &summary.failures {
        let pr = failure
            .upstream_number
            .map_or_else(|| "-".to_string(), |n| format!("#{n}"));
        println!(
            "    {pr} [{}{}] {}",
            failure.kind.as_str(),
            if failure.retryable { ", retryable" } else { "" },
            failure.error
        );
    }
}
