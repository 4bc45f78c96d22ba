use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use mirror_sync::{
    merge_marker, state_marker, ActionOutcome, ClientError, ErrorKind, EventOutcome, FileTree,
    GenerationError, Generator, InMemoryRepositories, InboundEvent, PayloadFormat,
    PullRequestState, RepositoryId, Runner, SyncConfig, SyncContext, SyncEngine, SyncError,
    TargetState,
};
use serde_json::json;
use tokio::sync::mpsc;

const CONFIG: &str = r#"
[upstream]
owner = "acme"
name = "toolkit"

[downstream]
owner = "acme"
name = "toolkit-generated"

[sync]
base-branch = "main"

[generator]
command = ["unused"]
"#;

/// Upper-cases every `schema/*` file into `gen/`, replacing previous output.
struct SchemaGenerator;

#[async_trait]
impl Generator for SchemaGenerator {
    async fn generate(
        &self,
        upstream: &FileTree,
        downstream: &FileTree,
    ) -> Result<FileTree, GenerationError> {
        let mut out = FileTree::new();
        for (path, entry) in downstream.iter() {
            if !path.starts_with("gen/") {
                out.insert_entry(path, entry.clone());
            }
        }
        for (path, entry) in upstream.iter() {
            if let Some(name) = path.strip_prefix("schema/") {
                out.insert(format!("gen/{name}"), entry.content.to_ascii_uppercase());
            }
        }
        Ok(out)
    }
}

struct BrokenGenerator;

#[async_trait]
impl Generator for BrokenGenerator {
    async fn generate(&self, _: &FileTree, _: &FileTree) -> Result<FileTree, GenerationError> {
        Err(GenerationError::CommandFailed {
            program: "generator".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "schema error".to_string(),
        })
    }
}

struct SlowGenerator;

#[async_trait]
impl Generator for SlowGenerator {
    async fn generate(&self, _: &FileTree, d: &FileTree) -> Result<FileTree, GenerationError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(d.clone())
    }
}

fn upstream() -> RepositoryId {
    RepositoryId::new("acme", "toolkit")
}

fn downstream() -> RepositoryId {
    RepositoryId::new("acme", "toolkit-generated")
}

fn context(config: &str) -> SyncContext {
    let config = SyncConfig::parse(config, Path::new("mirror-sync.toml")).unwrap();
    SyncContext::new(config).unwrap()
}

/// Upstream commits:
/// - `same`: generates exactly what downstream `main` holds
/// - `abc123`, `def456`, `fff000`: each adds generated output
fn host() -> InMemoryRepositories {
    let host = InMemoryRepositories::new();
    host.add_repository(&upstream(), "main", FileTree::new());
    host.add_commit(
        &upstream(),
        "same",
        [("schema/a.txt", "a")].into_iter().collect(),
    );
    host.add_commit(
        &upstream(),
        "abc123",
        [("schema/a.txt", "a"), ("schema/b.txt", "b")]
            .into_iter()
            .collect(),
    );
    host.add_commit(
        &upstream(),
        "def456",
        [("schema/a.txt", "a"), ("schema/b.txt", "b2")]
            .into_iter()
            .collect(),
    );
    host.add_commit(
        &upstream(),
        "fff000",
        [("schema/a.txt", "a"), ("schema/c.txt", "c")]
            .into_iter()
            .collect(),
    );
    host.add_repository(
        &downstream(),
        "main",
        [("README.md", "generated code"), ("gen/a.txt", "A")]
            .into_iter()
            .collect(),
    );
    host
}

fn engine(host: &InMemoryRepositories) -> SyncEngine<InMemoryRepositories, SchemaGenerator> {
    SyncEngine::new(host.clone(), SchemaGenerator, context(CONFIG))
}

fn event(action: &str, number: u64, sha: &str, merged: bool) -> InboundEvent {
    event_with_title(action, number, sha, merged, "Add X")
}

fn event_with_title(action: &str, number: u64, sha: &str, merged: bool, title: &str) -> InboundEvent {
    InboundEvent::from_json(
        &json!({
            "type": "pull_request",
            "action": action,
            "repository": "upstream",
            "pull_request": {
                "number": number,
                "head_ref": format!("feature-{number}"),
                "head_sha": sha,
                "merged": merged,
                "state": if action == "closed" { "closed" } else { "open" },
                "title": title,
                "html_url": format!("https://github.com/acme/toolkit/pull/{number}"),
                "base_ref": "main"
            }
        })
        .to_string(),
    )
    .unwrap()
}

fn outcome_of(result: EventOutcome) -> ActionOutcome {
    match result {
        EventOutcome::Applied { outcome, .. } => outcome,
        EventOutcome::Ignored { reason } => panic!("unexpectedly ignored: {reason}"),
    }
}

#[tokio::test]
async fn opened_pull_request_gets_a_mirror() {
    let host = host();
    let engine = engine(&host);

    let outcome = outcome_of(engine.handle(&event("opened", 5, "abc123", false)).await.unwrap());

    assert!(matches!(outcome, ActionOutcome::Created { .. }));
    assert!(host.branches(&downstream()).contains(&"sync/pr-5".to_string()));

    let expected: FileTree = [
        ("README.md", "generated code"),
        ("gen/a.txt", "A"),
        ("gen/b.txt", "B"),
    ]
    .into_iter()
    .collect();
    assert_eq!(host.tree_at(&downstream(), "sync/pr-5"), Some(expected));

    let prs = host.pull_requests(&downstream());
    assert_eq!(prs.len(), 1);
    assert_eq!(prs[0].head_ref, "sync/pr-5");
    assert_eq!(prs[0].state, PullRequestState::Open);
    assert!(prs[0].title.contains("#5"));

    let (body, base) = host.pull_request_details(&downstream(), prs[0].number).unwrap();
    assert_eq!(base, "main");
    assert!(body.contains("acme/toolkit#5"));
}

#[tokio::test]
async fn no_diff_means_no_downstream_changes() {
    let host = host();
    let engine = engine(&host);

    let outcome = outcome_of(engine.handle(&event("opened", 6, "same", false)).await.unwrap());

    assert!(matches!(outcome, ActionOutcome::Skipped { .. }));
    assert_eq!(host.branches(&downstream()), vec!["main".to_string()]);
    assert!(host.pull_requests(&downstream()).is_empty());
    assert_eq!(host.write_count(), 0);
}

#[tokio::test]
async fn replayed_events_change_nothing() {
    let host = host();
    let engine = engine(&host);

    let events = [
        event("opened", 5, "abc123", false),
        event("synchronize", 5, "def456", false),
        event("closed", 5, "def456", false),
        event("reopened", 5, "def456", false),
        event("closed", 5, "def456", true),
    ];

    for e in &events {
        engine.handle(e).await.unwrap();
        let writes = host.write_count();
        let comments = host.comments(&downstream(), host.pull_requests(&downstream())[0].number);

        let replay = outcome_of(engine.handle(e).await.unwrap());

        assert!(!replay.changed_downstream(), "{:?} replayed as {replay:?}", e.action);
        assert_eq!(host.write_count(), writes);
        assert_eq!(
            host.comments(&downstream(), host.pull_requests(&downstream())[0].number),
            comments
        );
    }

    assert_eq!(host.pull_requests(&downstream()).len(), 1);
}

#[tokio::test]
async fn synchronize_updates_the_mirror_branch() {
    let host = host();
    let engine = engine(&host);
    engine.handle(&event("opened", 5, "abc123", false)).await.unwrap();

    let outcome =
        outcome_of(engine.handle(&event("synchronize", 5, "def456", false)).await.unwrap());

    assert!(matches!(outcome, ActionOutcome::Updated { .. }));
    let tree = host.tree_at(&downstream(), "sync/pr-5").unwrap();
    assert_eq!(tree.get("gen/b.txt").unwrap().content, b"B2");
    assert_eq!(host.pull_requests(&downstream()).len(), 1);
}

#[tokio::test]
async fn diverged_mirror_branch_is_healed() {
    let host = host();
    let engine = engine(&host);
    engine.handle(&event("opened", 5, "abc123", false)).await.unwrap();
    host.push_branch(
        &downstream(),
        "sync/pr-5",
        [("README.md", "tampered")].into_iter().collect(),
    );

    let outcome =
        outcome_of(engine.handle(&event("synchronize", 5, "abc123", false)).await.unwrap());

    assert!(matches!(outcome, ActionOutcome::Updated { .. }));
    let tree = host.tree_at(&downstream(), "sync/pr-5").unwrap();
    assert_eq!(tree.get("gen/b.txt").unwrap().content, b"B");
}

#[tokio::test]
async fn branch_left_without_pull_request_is_completed() {
    let host = host();
    let engine = engine(&host);
    host.fail_next("create_pull_request", ClientError::transient("502 Bad Gateway"));

    let error = engine
        .handle(&event("opened", 5, "abc123", false))
        .await
        .unwrap_err();
    assert!(error.is_retryable());
    assert!(host.branches(&downstream()).contains(&"sync/pr-5".to_string()));
    assert!(host.pull_requests(&downstream()).is_empty());

    let outcome = outcome_of(engine.handle(&event("opened", 5, "abc123", false)).await.unwrap());

    assert!(matches!(outcome, ActionOutcome::Created { .. }));
    assert_eq!(host.pull_requests(&downstream()).len(), 1);
}

#[tokio::test]
async fn closing_affects_only_the_linked_pull_request() {
    let host = host();
    let engine = engine(&host);
    engine.handle(&event("opened", 41, "abc123", false)).await.unwrap();
    engine.handle(&event("opened", 42, "fff000", false)).await.unwrap();

    let outcome = outcome_of(engine.handle(&event("closed", 42, "fff000", false)).await.unwrap());

    assert_eq!(outcome, ActionOutcome::Closed);
    for pr in host.pull_requests(&downstream()) {
        match pr.head_ref.as_str() {
            "sync/pr-42" => assert_eq!(pr.state, PullRequestState::Closed),
            "sync/pr-41" => assert_eq!(pr.state, PullRequestState::Open),
            other => panic!("unexpected pull request for {other}"),
        }
    }
}

#[tokio::test]
async fn reopening_reuses_the_closed_pull_request() {
    let host = host();
    let engine = engine(&host);
    engine.handle(&event("opened", 5, "abc123", false)).await.unwrap();
    engine.handle(&event("closed", 5, "abc123", false)).await.unwrap();
    let closed = host.pull_requests(&downstream())[0].clone();

    let outcome = outcome_of(engine.handle(&event("reopened", 5, "abc123", false)).await.unwrap());

    assert_eq!(outcome, ActionOutcome::Reopened);
    let prs = host.pull_requests(&downstream());
    assert_eq!(prs.len(), 1);
    assert_eq!(prs[0].number, closed.number);
    assert_eq!(prs[0].state, PullRequestState::Open);
}

#[tokio::test]
async fn reopening_without_mirror_creates_one_when_needed() {
    let host = host();
    let engine = engine(&host);

    let outcome = outcome_of(engine.handle(&event("reopened", 8, "abc123", false)).await.unwrap());

    assert!(matches!(outcome, ActionOutcome::Created { .. }));
    assert!(host.branches(&downstream()).contains(&"sync/pr-8".to_string()));
}

#[tokio::test]
async fn reopening_bare_mirror_branch_recreates_the_pull_request() {
    let host = host();
    let engine = engine(&host);
    host.push_branch(
        &downstream(),
        "sync/pr-9",
        [("README.md", "generated code"), ("gen/a.txt", "A")]
            .into_iter()
            .collect(),
    );

    let outcome = outcome_of(engine.handle(&event("reopened", 9, "abc123", false)).await.unwrap());

    assert!(matches!(outcome, ActionOutcome::Created { .. }));
    let prs = host.pull_requests(&downstream());
    assert_eq!(prs.len(), 1);
    assert_eq!(prs[0].head_ref, "sync/pr-9");
    let tree = host.tree_at(&downstream(), "sync/pr-9").unwrap();
    assert_eq!(tree.get("gen/b.txt").unwrap().content, b"B");
}

#[tokio::test]
async fn close_notice_is_posted_after_failed_delivery() {
    let host = host();
    let engine = engine(&host);
    engine.handle(&event("opened", 5, "abc123", false)).await.unwrap();
    let number = host.pull_requests(&downstream())[0].number;
    host.fail_next("post_comment", ClientError::transient("flaky"));

    let error = engine
        .handle(&event("closed", 5, "abc123", false))
        .await
        .unwrap_err();
    assert!(error.is_retryable());
    assert_eq!(
        host.pull_requests(&downstream())[0].state,
        PullRequestState::Closed
    );
    assert!(host.comments(&downstream(), number).is_empty());

    let outcome = outcome_of(engine.handle(&event("closed", 5, "abc123", false)).await.unwrap());
    let replay = outcome_of(engine.handle(&event("closed", 5, "abc123", false)).await.unwrap());

    assert_eq!(outcome, ActionOutcome::Commented);
    assert_eq!(replay, ActionOutcome::AlreadyInState);
    let comments = host.comments(&downstream(), number);
    assert_eq!(comments.len(), 1);
    assert!(comments[0]
        .body
        .contains(&state_marker(5, TargetState::Closed)));
}

#[tokio::test]
async fn merge_notice_is_posted_once() {
    let host = host();
    let engine = engine(&host);
    engine.handle(&event("opened", 17, "abc123", false)).await.unwrap();
    let number = host.pull_requests(&downstream())[0].number;

    let first = outcome_of(engine.handle(&event("closed", 17, "abc123", true)).await.unwrap());
    let second = outcome_of(engine.handle(&event("closed", 17, "abc123", true)).await.unwrap());

    assert_eq!(first, ActionOutcome::Commented);
    assert_eq!(second, ActionOutcome::AlreadyInState);

    let comments = host.comments(&downstream(), number);
    assert_eq!(comments.len(), 1);
    assert!(comments[0].body.contains(&merge_marker(17)));
    // The downstream pull request is merged by a human.
    assert_eq!(
        host.pull_requests(&downstream())[0].state,
        PullRequestState::Open
    );
}

#[tokio::test]
async fn lifecycle_events_without_mirror_do_nothing() {
    let host = host();
    let engine = engine(&host);

    for e in [
        event("closed", 9, "abc123", false),
        event("closed", 9, "abc123", true),
        event("edited", 9, "abc123", false),
    ] {
        let outcome = outcome_of(engine.handle(&e).await.unwrap());
        assert!(matches!(outcome, ActionOutcome::Skipped { .. }));
    }
    assert_eq!(host.write_count(), 0);
}

#[tokio::test]
async fn edited_title_is_mirrored() {
    let host = host();
    let engine = engine(&host);
    engine.handle(&event("opened", 5, "abc123", false)).await.unwrap();

    let outcome = outcome_of(
        engine
            .handle(&event_with_title("edited", 5, "abc123", false, "Add X and Y"))
            .await
            .unwrap(),
    );

    assert_eq!(outcome, ActionOutcome::Retitled);
    assert_eq!(
        host.pull_requests(&downstream())[0].title,
        "[SYNC BOT] Add X and Y (#5)"
    );
}

#[tokio::test]
async fn unrelated_events_are_ignored() {
    let host = host();
    let engine = engine(&host);

    let mut from_downstream = event("opened", 5, "abc123", false);
    from_downstream.repository = mirror_sync::events::RepositoryRole::Downstream;

    let other_base = InboundEvent::from_json(
        &json!({
            "type": "pull_request",
            "action": "opened",
            "repository": "upstream",
            "pull_request": {"number": 3, "head_sha": "abc123", "base_ref": "release"}
        })
        .to_string(),
    )
    .unwrap();

    let push = InboundEvent::from_json(r#"{"type": "push", "repository": "upstream"}"#).unwrap();

    for e in [from_downstream, other_base, push] {
        assert!(matches!(
            engine.handle(&e).await.unwrap(),
            EventOutcome::Ignored { .. }
        ));
    }
    assert_eq!(host.write_count(), 0);
}

#[tokio::test]
async fn generator_failure_is_reported_and_writes_nothing() {
    let host = host();
    let engine = SyncEngine::new(host.clone(), BrokenGenerator, context(CONFIG));

    let error = engine
        .handle(&event("opened", 5, "abc123", false))
        .await
        .unwrap_err();

    assert!(matches!(error, SyncError::Generation { upstream_number: 5, .. }));
    assert_eq!(error.kind(), ErrorKind::Generation);
    assert!(!error.is_retryable());
    assert_eq!(host.write_count(), 0);
}

#[tokio::test]
async fn slow_events_time_out() {
    let config = CONFIG.replace("base-branch = \"main\"", "event-timeout-secs = 1");
    let host = host();
    let engine = SyncEngine::new(host.clone(), SlowGenerator, context(&config));

    let error = engine
        .handle(&event("opened", 5, "abc123", false))
        .await
        .unwrap_err();

    assert!(matches!(error, SyncError::Timeout { upstream_number: 5, .. }));
    assert!(error.is_retryable());
}

#[tokio::test]
async fn dry_run_leaves_downstream_untouched() {
    let host = host();
    let engine = engine(&host).with_dry_run(true);

    let outcome = outcome_of(engine.handle(&event("opened", 5, "abc123", false)).await.unwrap());

    assert_eq!(outcome, ActionOutcome::DryRun);
    assert_eq!(host.write_count(), 0);
}

#[tokio::test]
async fn default_branch_is_queried_when_not_configured() {
    let host = host();
    let engine = engine(&host);
    host.fail_next("default_branch", ClientError::permission("Bad credentials"));

    let error = engine
        .handle(&event("opened", 5, "abc123", false))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Permission);

    engine.handle(&event("opened", 5, "abc123", false)).await.unwrap();
    assert_eq!(host.pull_requests(&downstream()).len(), 1);
}

#[tokio::test]
async fn run_processes_events_in_order_and_records_failures() {
    let host = host();
    let engine = engine(&host);
    let (tx, rx) = mpsc::channel(8);

    for e in [
        event("opened", 5, "abc123", false),
        event("opened", 6, "missing-sha", false),
        event("closed", 5, "abc123", false),
    ] {
        tx.send(e).await.unwrap();
    }
    drop(tx);

    let summary = engine.run(rx).await;

    assert_eq!(summary.events_received, 3);
    assert_eq!(summary.actions_applied, 2);
    assert_eq!(summary.events_failed, 1);
    assert_eq!(summary.failures[0].upstream_number, Some(6));
    assert_eq!(summary.failures[0].kind, ErrorKind::NotFound);
    assert_eq!(
        host.pull_requests(&downstream())[0].state,
        PullRequestState::Closed
    );
}

#[tokio::test]
async fn runner_parses_payloads_and_counts_rejects() {
    let host = host();
    let runner = Runner::with_engine(engine(&host), PayloadFormat::Normalized);
    let (tx, rx) = mpsc::channel(8);

    let payload = json!({
        "type": "pull_request",
        "action": "opened",
        "repository": "upstream",
        "pull_request": {"number": 5, "head_ref": "f", "head_sha": "abc123", "title": "Add X"}
    })
    .to_string();
    for p in [payload, String::new(), "{not json".to_string()] {
        tx.send(p).await.unwrap();
    }
    drop(tx);

    let summary = runner.run(rx).await;

    assert_eq!(summary.events_received, 2);
    assert_eq!(summary.actions_applied, 1);
    assert_eq!(summary.events_failed, 1);
    assert_eq!(summary.failures[0].kind, ErrorKind::InvalidEvent);
    assert!(summary.has_failures());
}

#[tokio::test]
async fn runner_accepts_github_webhooks() {
    let host = host();
    let runner = Runner::with_engine(
        engine(&host),
        PayloadFormat::GitHub {
            event_name: "pull_request".to_string(),
        },
    );
    let (tx, rx) = mpsc::channel(1);

    let webhook = json!({
        "action": "opened",
        "repository": {"full_name": "acme/toolkit"},
        "pull_request": {
            "number": 5,
            "title": "Add X",
            "state": "open",
            "merged": false,
            "html_url": "https://github.com/acme/toolkit/pull/5",
            "head": {"ref": "feature", "sha": "abc123"},
            "base": {"ref": "main", "sha": "0000"}
        }
    })
    .to_string();
    tx.send(webhook).await.unwrap();
    drop(tx);

    let summary = runner.run(rx).await;

    assert!(summary.all_success());
    assert_eq!(summary.actions_applied, 1);
    assert_eq!(host.pull_requests(&downstream()).len(), 1);
}

#[tokio::test]
async fn single_payloads_are_summarized_without_a_channel() {
    let host = host();
    let runner = Runner::with_engine(engine(&host), PayloadFormat::Normalized);
    let payload = json!({
        "type": "pull_request",
        "action": "opened",
        "repository": "upstream",
        "pull_request": {"number": 5, "head_ref": "f", "head_sha": "abc123", "title": "Add X"}
    })
    .to_string();

    let applied = runner.handle_payload(&payload).await;
    let rejected = runner.handle_payload("{not json").await;
    let blank = runner.handle_payload("  \n").await;

    assert!(applied.all_success());
    assert_eq!(applied.actions_applied, 1);
    assert_eq!(rejected.events_failed, 1);
    assert_eq!(rejected.failures[0].kind, ErrorKind::InvalidEvent);
    assert_eq!(blank.events_received, 0);
    assert!(!blank.has_failures());
}
