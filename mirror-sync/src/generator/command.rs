//! Generator backed by an external command.

use super::{GenerationError, Generator};
use crate::config::GeneratorSettings;
use crate::tree::{is_ignored, FileMode, FileTree};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Environment variable holding the upstream checkout path.
pub const UPSTREAM_DIR_ENV: &str = "MIRROR_SYNC_UPSTREAM_DIR";

/// Environment variable holding the downstream workspace path.
pub const WORKSPACE_DIR_ENV: &str = "MIRROR_SYNC_WORKSPACE_DIR";

const STDERR_LIMIT: usize = 4096;

/// Runs a generator program inside a downstream workspace.
///
/// The downstream tree is written to a temporary directory that becomes the
/// working directory of the command. The upstream tree is written to a second
/// temporary directory. `{upstream}` and `{workspace}` in arguments are
/// replaced with those paths, which are also exported as
/// [`UPSTREAM_DIR_ENV`] and [`WORKSPACE_DIR_ENV`]. Whatever the workspace
/// holds once the command exits is the candidate tree, except that
/// submodules and ignored paths of the downstream tree are kept as they are.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: Vec<String>,
    timeout: Duration,
    ignore: Vec<String>,
}

impl CommandGenerator {
    #[must_use]
    pub fn new(command: Vec<String>, timeout: Duration, ignore: Vec<String>) -> Self {
        Self {
            command,
            timeout,
            ignore,
        }
    }

    /// Builds a generator from the `[generator]` section.
    #[must_use]
    pub fn from_settings(settings: &GeneratorSettings) -> Self {
        Self::new(
            settings.command.clone(),
            settings.timeout(),
            settings.ignore.clone(),
        )
    }

    async fn run(&self, upstream_dir: &Path, workspace: &Path) -> Result<(), GenerationError> {
        let Some((program, args)) = self.command.split_first() else {
            return Err(GenerationError::EmptyCommand);
        };
        if program.trim().is_empty() {
            return Err(GenerationError::EmptyCommand);
        }

        let upstream = upstream_dir.display().to_string();
        let work = workspace.display().to_string();
        let args: Vec<String> = args
            .iter()
            .map(|arg| {
                arg.replace("{upstream}", &upstream)
                    .replace("{workspace}", &work)
            })
            .collect();

        debug!(program = %program, ?args, "Running generator");

        let child = Command::new(program)
            .args(&args)
            .current_dir(workspace)
            .env(UPSTREAM_DIR_ENV, upstream_dir)
            .env(WORKSPACE_DIR_ENV, workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GenerationError::Spawn {
                program: program.clone(),
                source: e,
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| GenerationError::workspace("waiting for generator", e))?,
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Generator timed out");
                return Err(GenerationError::Timeout {
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            return Err(GenerationError::CommandFailed {
                program: program.clone(),
                status: output.status.to_string(),
                stderr: truncate(String::from_utf8_lossy(&output.stderr).trim()),
            });
        }

        debug!(
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "Generator finished"
        );
        Ok(())
    }
}

#[async_trait]
impl Generator for CommandGenerator {
    async fn generate(
        &self,
        upstream: &FileTree,
        downstream: &FileTree,
    ) -> Result<FileTree, GenerationError> {
        let upstream_dir = tempfile::tempdir()
            .map_err(|e| GenerationError::workspace("creating upstream directory", e))?;
        let workspace = tempfile::tempdir()
            .map_err(|e| GenerationError::workspace("creating workspace directory", e))?;

        upstream
            .write_to(upstream_dir.path())
            .map_err(|e| GenerationError::workspace("writing upstream tree", e))?;
        downstream
            .write_to(workspace.path())
            .map_err(|e| GenerationError::workspace("writing downstream tree", e))?;

        self.run(upstream_dir.path(), workspace.path()).await?;

        let mut candidate = FileTree::read_from(workspace.path(), &self.ignore)
            .map_err(|e| GenerationError::workspace("reading generated tree", e))?;
        candidate.carry_over(downstream, |path, entry| {
            entry.mode == FileMode::Submodule || is_ignored(path, &self.ignore)
        });
        Ok(candidate)
    }
}

fn truncate(text: &str) -> String {
    if text.len() <= STDERR_LIMIT {
        return text.to_string();
    }
    let mut end = STDERR_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::tree::FileEntry;

    fn sh(script: &str) -> CommandGenerator {
        CommandGenerator::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            Duration::from_secs(30),
            vec!["__pycache__".to_string()],
        )
    }

    #[tokio::test]
    async fn candidate_tree_is_the_workspace_after_the_run() {
        let generator = sh("cp \"$MIRROR_SYNC_UPSTREAM_DIR/schema.txt\" generated.txt && rm stale.txt");
        let upstream: FileTree = [("schema.txt", "v2")].into_iter().collect();
        let downstream: FileTree = [("generated.txt", "v1"), ("stale.txt", "old"), ("keep.txt", "k")]
            .into_iter()
            .collect();

        let candidate = generator.generate(&upstream, &downstream).await.unwrap();

        let expected: FileTree = [("generated.txt", "v2"), ("keep.txt", "k")].into_iter().collect();
        assert!(candidate.same_content(&expected));
    }

    #[tokio::test]
    async fn substitutes_placeholders_in_arguments() {
        let generator = CommandGenerator::new(
            vec![
                "cp".to_string(),
                "{upstream}/a.txt".to_string(),
                "{workspace}/b.txt".to_string(),
            ],
            Duration::from_secs(30),
            Vec::new(),
        );
        let upstream: FileTree = [("a.txt", "hello")].into_iter().collect();

        let candidate = generator.generate(&upstream, &FileTree::new()).await.unwrap();

        assert_eq!(candidate.get("b.txt").unwrap().content, b"hello");
    }

    #[tokio::test]
    async fn skips_ignored_paths() {
        let generator = sh("mkdir -p __pycache__ && echo x > __pycache__/m.pyc && echo y > out.txt");

        let candidate = generator
            .generate(&FileTree::new(), &FileTree::new())
            .await
            .unwrap();

        assert_eq!(candidate.len(), 1);
        assert!(candidate.get("out.txt").is_some());
    }

    #[tokio::test]
    async fn keeps_links_submodules_and_committed_ignored_paths() {
        let generator = sh("echo y > out.txt");
        let mut downstream: FileTree = [("out.txt", "x"), ("__pycache__/m.pyc", "cached")]
            .into_iter()
            .collect();
        downstream.insert_entry(
            "latest",
            FileEntry {
                content: b"out.txt".to_vec(),
                mode: FileMode::Symlink,
            },
        );
        downstream.insert_entry(
            "vendor/lib",
            FileEntry {
                content: b"0123456789abcdef0123456789abcdef01234567".to_vec(),
                mode: FileMode::Submodule,
            },
        );

        let candidate = generator.generate(&FileTree::new(), &downstream).await.unwrap();

        let changes = downstream.changes_to(&candidate);
        assert_eq!(changes.len(), 1, "{changes:?}");
        assert_eq!(changes[0].path, "out.txt");
        assert_eq!(candidate.get("latest").unwrap().mode, FileMode::Symlink);
        assert_eq!(candidate.get("vendor/lib").unwrap().mode, FileMode::Submodule);
        assert_eq!(candidate.get("__pycache__/m.pyc").unwrap().content, b"cached");
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failure() {
        let result = sh("echo broken >&2; exit 3")
            .generate(&FileTree::new(), &FileTree::new())
            .await;

        match result {
            Err(GenerationError::CommandFailed { stderr, .. }) => assert_eq!(stderr, "broken"),
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_failure() {
        let generator = CommandGenerator::new(
            vec!["mirror-sync-no-such-program".to_string()],
            Duration::from_secs(5),
            Vec::new(),
        );

        let result = generator.generate(&FileTree::new(), &FileTree::new()).await;
        assert!(matches!(result, Err(GenerationError::Spawn { .. })));
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let generator = CommandGenerator::new(Vec::new(), Duration::from_secs(5), Vec::new());

        let result = generator.generate(&FileTree::new(), &FileTree::new()).await;
        assert!(matches!(result, Err(GenerationError::EmptyCommand)));
    }

    #[tokio::test]
    async fn slow_generator_times_out() {
        let generator = CommandGenerator::new(
            vec!["sleep".to_string(), "10".to_string()],
            Duration::from_millis(200),
            Vec::new(),
        );

        let result = generator.generate(&FileTree::new(), &FileTree::new()).await;
        assert!(matches!(result, Err(GenerationError::Timeout { .. })));
    }

    #[test]
    fn truncates_long_stderr_on_char_boundary() {
        let long = "é".repeat(STDERR_LIMIT);
        let truncated = truncate(&long);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= STDERR_LIMIT + 3);
    }
}
