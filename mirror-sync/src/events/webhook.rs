//! Conversion of native GitHub webhook deliveries.

use super::{EventError, EventPullRequest, InboundEvent, RepositoryRole};
use crate::config::RepositoryId;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    action: String,
    repository: Option<WebhookRepository>,
    pull_request: Option<WebhookPullRequest>,
}

#[derive(Debug, Deserialize)]
struct WebhookRepository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct WebhookPullRequest {
    number: u64,
    #[serde(default)]
    title: String,
    html_url: Option<String>,
    state: Option<String>,
    #[serde(default)]
    merged: Option<bool>,
    head: WebhookRef,
    base: Option<WebhookRef>,
}

#[derive(Debug, Deserialize)]
struct WebhookRef {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: String,
}

impl InboundEvent {
    /// Converts a GitHub webhook delivery into a normalized event.
    ///
    /// `event_name` is the `X-GitHub-Event` header value. The originating
    /// repository is matched against the configured identities.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Malformed`] if `body` is not a valid webhook payload.
    pub fn from_webhook(
        event_name: &str,
        body: &str,
        upstream: &RepositoryId,
        downstream: &RepositoryId,
    ) -> Result<Self, EventError> {
        let payload: WebhookPayload = serde_json::from_str(body)?;

        let repository = match payload.repository.as_ref().map(|r| r.full_name.as_str()) {
            Some(name) if upstream.matches(name) => RepositoryRole::Upstream,
            Some(name) if downstream.matches(name) => RepositoryRole::Downstream,
            _ => RepositoryRole::Other,
        };

        let pull_request = payload.pull_request.map(|pr| EventPullRequest {
            number: pr.number,
            head_ref: pr.head.ref_name,
            head_sha: pr.head.sha,
            merged: pr.merged.unwrap_or(false),
            state: pr.state,
            title: pr.title,
            html_url: pr.html_url,
            base_ref: pr.base.map(|b| b.ref_name),
        });

        Ok(Self {
            event_type: event_name.to_string(),
            action: payload.action,
            repository,
            pull_request,
        })
    }
}
