//! Generation differ.
//!
//! Regenerates the downstream tree for an upstream revision and compares it
//! with what the downstream repository currently holds.

mod command;
mod error;

pub use command::{CommandGenerator, UPSTREAM_DIR_ENV, WORKSPACE_DIR_ENV};
pub use error::{DiffError, GenerationError};

use crate::client::RepositoryClient;
use crate::config::RepositoryId;
use crate::tree::{FileTree, TreeChange};
use async_trait::async_trait;
use tracing::{debug, info};

/// Produces the downstream tree for an upstream tree.
///
/// Implementations must be deterministic: the same inputs always yield the
/// same output.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the candidate downstream tree.
    ///
    /// `downstream` is the tree the generator runs on top of, so generated
    /// output can live alongside hand-maintained downstream files.
    async fn generate(
        &self,
        upstream: &FileTree,
        downstream: &FileTree,
    ) -> Result<FileTree, GenerationError>;
}

/// Inputs of a single diff computation.
#[derive(Debug, Clone, Copy)]
pub struct DiffRequest<'a> {
    pub upstream: &'a RepositoryId,
    /// Upstream commit to generate from.
    pub head_sha: &'a str,
    pub downstream: &'a RepositoryId,
    /// Downstream ref to compare against: the mirror branch when it
    /// exists, otherwise the default branch.
    pub compare_ref: &'a str,
}

/// Outcome of regenerating the downstream tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedDiff {
    /// Whether the candidate differs from the compared tree.
    pub changed: bool,
    /// Candidate downstream tree.
    pub tree: FileTree,
    /// Paths that differ, sorted.
    pub changes: Vec<TreeChange>,
    /// Downstream ref the candidate was compared against.
    pub compared_against: String,
}

impl GeneratedDiff {
    /// Compares a candidate tree with the current one.
    #[must_use]
    pub fn between(current: &FileTree, candidate: FileTree, compared_against: &str) -> Self {
        let changes = current.changes_to(&candidate);
        Self {
            changed: !changes.is_empty(),
            tree: candidate,
            changes,
            compared_against: compared_against.to_string(),
        }
    }
}

/// Runs the generator for `request` and compares the result.
///
/// # Errors
///
/// Returns [`DiffError::Repository`] when a tree cannot be fetched and
/// [`DiffError::Generation`] when the generator fails.
pub async fn compute_diff<C, G>(
    client: &C,
    generator: &G,
    request: DiffRequest<'_>,
) -> Result<GeneratedDiff, DiffError>
where
    C: RepositoryClient + ?Sized,
    G: Generator + ?Sized,
{
    let fetch_error = |reference: &str| {
        let reference = reference.to_string();
        move |source| DiffError::Repository { reference, source }
    };

    let upstream_tree = client
        .get_tree(request.upstream, request.head_sha)
        .await
        .map_err(fetch_error(request.head_sha))?;
    let current = client
        .get_tree(request.downstream, request.compare_ref)
        .await
        .map_err(fetch_error(request.compare_ref))?;

    debug!(
        upstream_files = upstream_tree.len(),
        downstream_files = current.len(),
        compare_ref = %request.compare_ref,
        "Running generator"
    );

    let candidate = generator.generate(&upstream_tree, &current).await?;
    let diff = GeneratedDiff::between(&current, candidate, request.compare_ref);

    info!(
        changed = diff.changed,
        changed_paths = diff.changes.len(),
        compare_ref = %diff.compared_against,
        "Computed generation diff"
    );

    Ok(diff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, InMemoryRepositories};
    use crate::tree::ChangeKind;

    /// Copies every upstream file under `gen/`, keeping other downstream files.
    struct CopyGenerator;

    #[async_trait]
    impl Generator for CopyGenerator {
        async fn generate(
            &self,
            upstream: &FileTree,
            downstream: &FileTree,
        ) -> Result<FileTree, GenerationError> {
            let mut out = downstream.clone();
            for (path, entry) in upstream.iter() {
                out.insert_entry(format!("gen/{path}"), entry.clone());
            }
            Ok(out)
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn generate(&self, _: &FileTree, _: &FileTree) -> Result<FileTree, GenerationError> {
            Err(GenerationError::CommandFailed {
                program: "generate".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "bad schema".to_string(),
            })
        }
    }

    fn upstream() -> RepositoryId {
        RepositoryId::new("acme", "toolkit")
    }

    fn downstream() -> RepositoryId {
        RepositoryId::new("acme", "toolkit-generated")
    }

    fn host() -> InMemoryRepositories {
        let host = InMemoryRepositories::new();
        host.add_repository(&upstream(), "main", FileTree::new());
        host.add_commit(&upstream(), "abc123", [("api.txt", "v1")].into_iter().collect());
        host.add_repository(
            &downstream(),
            "main",
            [("README.md", "readme"), ("gen/api.txt", "v0")].into_iter().collect(),
        );
        host
    }

    fn request<'a>(up: &'a RepositoryId, down: &'a RepositoryId, sha: &'a str) -> DiffRequest<'a> {
        DiffRequest {
            upstream: up,
            head_sha: sha,
            downstream: down,
            compare_ref: "main",
        }
    }

    #[tokio::test]
    async fn reports_changed_paths() {
        let (up, down) = (upstream(), downstream());
        let diff = compute_diff(&host(), &CopyGenerator, request(&up, &down, "abc123"))
            .await
            .unwrap();

        assert!(diff.changed);
        assert_eq!(diff.compared_against, "main");
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].path, "gen/api.txt");
        assert_eq!(diff.changes[0].kind, ChangeKind::Modified);
    }

    #[tokio::test]
    async fn identical_output_is_unchanged() {
        let host = host();
        let (up, down) = (upstream(), downstream());
        host.add_commit(&up, "same", [("api.txt", "v0")].into_iter().collect());

        let diff = compute_diff(&host, &CopyGenerator, request(&up, &down, "same"))
            .await
            .unwrap();

        assert!(!diff.changed);
        assert!(diff.changes.is_empty());
    }

    #[tokio::test]
    async fn generator_failure_is_not_an_empty_diff() {
        let (up, down) = (upstream(), downstream());
        let result = compute_diff(&host(), &FailingGenerator, request(&up, &down, "abc123")).await;

        assert!(matches!(result, Err(DiffError::Generation(_))));
    }

    #[tokio::test]
    async fn missing_upstream_commit_is_a_repository_error() {
        let (up, down) = (upstream(), downstream());
        let result = compute_diff(&host(), &CopyGenerator, request(&up, &down, "nope")).await;

        match result {
            Err(DiffError::Repository { reference, source }) => {
                assert_eq!(reference, "nope");
                assert!(matches!(source, ClientError::NotFound { .. }));
            }
            other => panic!("expected repository error, got {other:?}"),
        }
    }
}
