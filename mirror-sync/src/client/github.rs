//! GitHub implementation of [`RepositoryClient`] built on octocrab.
//!
//! Trees are read through the git trees and blobs APIs and written as a new
//! tree + commit followed by a forced ref update, so no local clone is needed.

use super::rate_limit::ensure_core_rate_limit;
use super::{
    Branch, ClientError, Comment, DownstreamPullRequest, NewPullRequest, RepositoryClient,
    TargetState,
};
use crate::config::RepositoryId;
use crate::events::PullRequestState;
use crate::tree::{FileEntry, FileMode, FileTree};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::stream::{self, StreamExt, TryStreamExt};
use octocrab::params::repos::Reference;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Blobs fetched concurrently while reading a tree.
const BLOB_CONCURRENCY: usize = 8;

/// Results per page for list endpoints.
const PAGE_SIZE: u8 = 100;

#[derive(Debug, Deserialize)]
struct RepoResponse {
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ShaResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    mode: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

/// A tree listing entry once its content source is known.
#[derive(Debug, PartialEq, Eq)]
enum ListedEntry {
    /// Content has to be fetched from a blob.
    Blob {
        path: String,
        mode: FileMode,
        sha: String,
    },
    /// Content is carried by the listing itself.
    Inline { path: String, entry: FileEntry },
}

/// Turns a recursive tree listing into the entries of a [`FileTree`].
///
/// A truncated listing or an entry that cannot be represented is an error:
/// committing a tree built from it would delete the missing paths.
fn listed_entries(listing: TreeResponse, reference: &str) -> Result<Vec<ListedEntry>, ClientError> {
    if listing.truncated {
        return Err(ClientError::unsupported(format!(
            "tree listing for '{reference}' was truncated by GitHub"
        )));
    }

    let mut entries = Vec::with_capacity(listing.tree.len());
    for item in listing.tree {
        match (item.kind.as_str(), FileMode::from_git_mode(&item.mode)) {
            ("tree", _) => {}
            ("commit", Some(FileMode::Submodule)) => entries.push(ListedEntry::Inline {
                path: item.path,
                entry: FileEntry {
                    content: item.sha.into_bytes(),
                    mode: FileMode::Submodule,
                },
            }),
            ("blob", Some(mode)) if mode != FileMode::Submodule => {
                entries.push(ListedEntry::Blob {
                    path: item.path,
                    mode,
                    sha: item.sha,
                });
            }
            (kind, _) => {
                return Err(ClientError::unsupported(format!(
                    "'{}' in '{reference}' has type {kind} and mode {}",
                    item.path, item.mode
                )))
            }
        }
    }
    Ok(entries)
}

/// Tree entry for `entry` that needs no blob upload, if there is one.
///
/// Text and submodules are sent inline; other content goes through a blob.
fn inline_tree_entry(path: &str, entry: &FileEntry) -> Option<NewTreeEntry> {
    let (content, sha) = match entry.mode {
        FileMode::Submodule => (
            None,
            Some(String::from_utf8_lossy(&entry.content).into_owned()),
        ),
        _ => (Some(std::str::from_utf8(&entry.content).ok()?.to_string()), None),
    };
    Some(NewTreeEntry {
        path: path.to_string(),
        mode: entry.mode.git_mode(),
        kind: entry.mode.git_type(),
        content,
        sha,
    })
}

/// Whether a page of a list endpoint was the last one.
fn is_last_page(batch_len: usize) -> bool {
    batch_len < usize::from(PAGE_SIZE)
}

#[derive(Debug, Deserialize)]
struct BlobResponse {
    content: String,
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    number: u64,
    #[serde(default)]
    title: String,
    state: String,
    merged_at: Option<String>,
    html_url: Option<String>,
    head: PullHead,
}

#[derive(Debug, Deserialize)]
struct PullHead {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    id: u64,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Serialize)]
struct NewRef<'a> {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: &'a str,
}

#[derive(Serialize)]
struct UpdateRef<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Serialize)]
struct NewBlob {
    content: String,
    encoding: &'static str,
}

#[derive(Serialize)]
struct NewTree {
    tree: Vec<NewTreeEntry>,
}

#[derive(Serialize)]
struct NewTreeEntry {
    path: String,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

#[derive(Serialize)]
struct NewCommit<'a> {
    message: &'a str,
    tree: &'a str,
    parents: Vec<&'a str>,
}

#[derive(Serialize)]
struct CreatePull<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
}

#[derive(Serialize)]
struct PullQuery<'a> {
    state: &'a str,
    head: String,
    sort: &'a str,
    direction: &'a str,
    per_page: u8,
}

#[derive(Serialize)]
struct TreeQuery {
    recursive: u8,
}

#[derive(Serialize)]
struct PageQuery {
    per_page: u8,
    page: u32,
}

#[derive(Serialize)]
struct StatePatch<'a> {
    state: &'a str,
}

#[derive(Serialize)]
struct TitlePatch<'a> {
    title: &'a str,
}

#[derive(Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

/// [`RepositoryClient`] talking to the GitHub REST API.
#[derive(Clone)]
pub struct GitHubClient {
    octocrab: Octocrab,
}

impl GitHubClient {
    /// Builds a client authenticated with a token.
    ///
    /// `api_base_url` points the client at a GitHub Enterprise installation.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the octocrab client cannot be built.
    pub fn new(token: &str, api_base_url: Option<&str>) -> Result<Self, ClientError> {
        let mut builder = Octocrab::builder().personal_token(token.to_string());
        if let Some(base) = api_base_url {
            builder = builder.base_uri(base)?;
        }
        Ok(Self::from_octocrab(builder.build()?))
    }

    /// Wraps an existing octocrab instance.
    #[must_use]
    pub fn from_octocrab(octocrab: Octocrab) -> Self {
        Self { octocrab }
    }

    fn repo_route(repo: &RepositoryId, rest: &str) -> String {
        format!("/repos/{}/{}{}", repo.owner, repo.name, rest)
    }

    async fn create_blob(&self, repo: &RepositoryId, content: &[u8]) -> Result<String, ClientError> {
        let blob: ShaResponse = self
            .octocrab
            .post(
                Self::repo_route(repo, "/git/blobs"),
                Some(&NewBlob {
                    content: STANDARD.encode(content),
                    encoding: "base64",
                }),
            )
            .await?;
        Ok(blob.sha)
    }

    async fn get_blob(&self, repo: &RepositoryId, sha: &str) -> Result<Vec<u8>, ClientError> {
        let blob: BlobResponse = self
            .octocrab
            .get(
                Self::repo_route(repo, &format!("/git/blobs/{sha}")),
                None::<&()>,
            )
            .await?;

        if blob.encoding == "base64" {
            let compact: String = blob
                .content
                .chars()
                .filter(|c| !c.is_ascii_whitespace())
                .collect();
            STANDARD
                .decode(compact)
                .map_err(|e| ClientError::transient(format!("Invalid blob {sha}: {e}")))
        } else {
            Ok(blob.content.into_bytes())
        }
    }
}

impl PullResponse {
    /// Picks the newest pull request whose head is exactly `branch`.
    fn latest_for_branch(
        pulls: Vec<Self>,
        branch: &str,
        repo: &RepositoryId,
    ) -> Option<DownstreamPullRequest> {
        pulls
            .into_iter()
            .filter(|pr| pr.head.ref_name == branch)
            .max_by_key(|pr| pr.number)
            .map(|pr| pr.into_downstream(repo))
    }

    fn into_downstream(self, repo: &RepositoryId) -> DownstreamPullRequest {
        let state = if self.merged_at.is_some() {
            PullRequestState::Merged
        } else if self.state == "closed" {
            PullRequestState::Closed
        } else {
            PullRequestState::Open
        };
        let html_url = self
            .html_url
            .unwrap_or_else(|| format!("https://github.com/{}/pull/{}", repo, self.number));

        DownstreamPullRequest {
            number: self.number,
            head_ref: self.head.ref_name,
            state,
            title: self.title,
            html_url,
        }
    }
}

#[async_trait]
impl RepositoryClient for GitHubClient {
    async fn default_branch(&self, repo: &RepositoryId) -> Result<String, ClientError> {
        let info: RepoResponse = self
            .octocrab
            .get(Self::repo_route(repo, ""), None::<&()>)
            .await?;
        Ok(info.default_branch)
    }

    async fn get_branch(
        &self,
        repo: &RepositoryId,
        name: &str,
    ) -> Result<Option<Branch>, ClientError> {
        let route = Self::repo_route(repo, &format!("/git/ref/heads/{name}"));
        match self.octocrab.get::<RefResponse, _, _>(route, None::<&()>).await {
            Ok(reference) => Ok(Some(Branch {
                name: name.to_string(),
                sha: reference.object.sha,
            })),
            Err(e) => match ClientError::from(e) {
                ClientError::NotFound { .. } => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn create_branch(
        &self,
        repo: &RepositoryId,
        name: &str,
        from: &str,
    ) -> Result<Branch, ClientError> {
        let source = self
            .get_branch(repo, from)
            .await?
            .ok_or_else(|| ClientError::not_found(format!("branch '{from}' in {repo}")))?;

        ensure_core_rate_limit(&self.octocrab).await?;
        let _: serde_json::Value = self
            .octocrab
            .post(
                Self::repo_route(repo, "/git/refs"),
                Some(&NewRef {
                    ref_name: format!("refs/heads/{name}"),
                    sha: &source.sha,
                }),
            )
            .await?;

        debug!(repo = %repo, branch = %name, from = %from, "Created branch");
        Ok(Branch {
            name: name.to_string(),
            sha: source.sha,
        })
    }

    async fn update_branch_content(
        &self,
        repo: &RepositoryId,
        branch: &str,
        tree: &FileTree,
        message: &str,
    ) -> Result<String, ClientError> {
        let head = self
            .get_branch(repo, branch)
            .await?
            .ok_or_else(|| ClientError::not_found(format!("branch '{branch}' in {repo}")))?;

        ensure_core_rate_limit(&self.octocrab).await?;

        let mut entries = Vec::with_capacity(tree.len());
        for (path, entry) in tree.iter() {
            let tree_entry = match inline_tree_entry(path, entry) {
                Some(inline) => inline,
                None => NewTreeEntry {
                    path: path.to_string(),
                    mode: entry.mode.git_mode(),
                    kind: entry.mode.git_type(),
                    content: None,
                    sha: Some(self.create_blob(repo, &entry.content).await?),
                },
            };
            entries.push(tree_entry);
        }

        let new_tree: ShaResponse = self
            .octocrab
            .post(
                Self::repo_route(repo, "/git/trees"),
                Some(&NewTree { tree: entries }),
            )
            .await?;

        let commit: ShaResponse = self
            .octocrab
            .post(
                Self::repo_route(repo, "/git/commits"),
                Some(&NewCommit {
                    message,
                    tree: &new_tree.sha,
                    parents: vec![&head.sha],
                }),
            )
            .await?;

        let _: serde_json::Value = self
            .octocrab
            .patch(
                Self::repo_route(repo, &format!("/git/refs/heads/{branch}")),
                Some(&UpdateRef {
                    sha: &commit.sha,
                    force: true,
                }),
            )
            .await?;

        debug!(repo = %repo, branch = %branch, commit = %commit.sha, "Updated branch content");
        Ok(commit.sha)
    }

    async fn delete_branch(&self, repo: &RepositoryId, name: &str) -> Result<(), ClientError> {
        ensure_core_rate_limit(&self.octocrab).await?;
        self.octocrab
            .repos(&repo.owner, &repo.name)
            .delete_ref(&Reference::Branch(name.to_string()))
            .await?;
        Ok(())
    }

    async fn get_tree(
        &self,
        repo: &RepositoryId,
        reference: &str,
    ) -> Result<FileTree, ClientError> {
        let listing: TreeResponse = self
            .octocrab
            .get(
                Self::repo_route(repo, &format!("/git/trees/{reference}")),
                Some(&TreeQuery { recursive: 1 }),
            )
            .await?;

        let mut tree = FileTree::new();
        let mut blobs = Vec::new();
        for listed in listed_entries(listing, reference)? {
            match listed {
                ListedEntry::Inline { path, entry } => tree.insert_entry(path, entry),
                ListedEntry::Blob { path, mode, sha } => blobs.push((path, mode, sha)),
            }
        }

        let files: Vec<(String, FileEntry)> = stream::iter(blobs)
            .map(|(path, mode, sha)| async move {
                let content = self.get_blob(repo, &sha).await?;
                Ok::<_, ClientError>((path, FileEntry { content, mode }))
            })
            .buffered(BLOB_CONCURRENCY)
            .try_collect()
            .await?;

        for (path, entry) in files {
            tree.insert_entry(path, entry);
        }
        Ok(tree)
    }

    async fn get_pull_request_by_branch(
        &self,
        repo: &RepositoryId,
        branch: &str,
    ) -> Result<Option<DownstreamPullRequest>, ClientError> {
        let pulls: Vec<PullResponse> = self
            .octocrab
            .get(
                Self::repo_route(repo, "/pulls"),
                Some(&PullQuery {
                    state: "all",
                    head: format!("{}:{}", repo.owner, branch),
                    sort: "created",
                    direction: "desc",
                    per_page: PAGE_SIZE,
                }),
            )
            .await?;

        Ok(PullResponse::latest_for_branch(pulls, branch, repo))
    }

    async fn create_pull_request(
        &self,
        repo: &RepositoryId,
        request: &NewPullRequest,
    ) -> Result<DownstreamPullRequest, ClientError> {
        ensure_core_rate_limit(&self.octocrab).await?;
        let pr: PullResponse = self
            .octocrab
            .post(
                Self::repo_route(repo, "/pulls"),
                Some(&CreatePull {
                    title: &request.title,
                    head: &request.head,
                    base: &request.base,
                    body: &request.body,
                }),
            )
            .await?;
        Ok(pr.into_downstream(repo))
    }

    async fn set_pull_request_state(
        &self,
        repo: &RepositoryId,
        number: u64,
        state: TargetState,
    ) -> Result<(), ClientError> {
        ensure_core_rate_limit(&self.octocrab).await?;
        let _: serde_json::Value = self
            .octocrab
            .patch(
                Self::repo_route(repo, &format!("/pulls/{number}")),
                Some(&StatePatch {
                    state: state.as_str(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn update_pull_request_title(
        &self,
        repo: &RepositoryId,
        number: u64,
        title: &str,
    ) -> Result<(), ClientError> {
        ensure_core_rate_limit(&self.octocrab).await?;
        let _: serde_json::Value = self
            .octocrab
            .patch(
                Self::repo_route(repo, &format!("/pulls/{number}")),
                Some(&TitlePatch { title }),
            )
            .await?;
        Ok(())
    }

    async fn list_comments(
        &self,
        repo: &RepositoryId,
        number: u64,
    ) -> Result<Vec<Comment>, ClientError> {
        let route = Self::repo_route(repo, &format!("/issues/{number}/comments"));
        let mut comments = Vec::new();
        let mut page = 1;

        loop {
            let batch: Vec<CommentResponse> = self
                .octocrab
                .get(
                    &route,
                    Some(&PageQuery {
                        per_page: PAGE_SIZE,
                        page,
                    }),
                )
                .await?;
            let done = is_last_page(batch.len());
            comments.extend(batch.into_iter().map(|c| Comment {
                id: c.id,
                body: c.body.unwrap_or_default(),
            }));
            if done {
                break;
            }
            page += 1;
        }

        Ok(comments)
    }

    async fn post_comment(
        &self,
        repo: &RepositoryId,
        number: u64,
        body: &str,
    ) -> Result<Comment, ClientError> {
        ensure_core_rate_limit(&self.octocrab).await?;
        let comment: CommentResponse = self
            .octocrab
            .post(
                Self::repo_route(repo, &format!("/issues/{number}/comments")),
                Some(&CommentBody { body }),
            )
            .await?;
        Ok(Comment {
            id: comment.id,
            body: comment.body.unwrap_or_default(),
        })
    }
}
