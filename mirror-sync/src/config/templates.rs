//! Handlebars sources for everything the bot writes downstream.

use serde::Deserialize;

/// Template sources from the `[templates]` section.
///
/// Every key is optional; missing keys fall back to the built-in defaults.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct TemplatesConfig {
    /// Title of the downstream pull request.
    #[serde(default = "default_pr_title")]
    pub pr_title: String,

    /// Body of the downstream pull request.
    #[serde(default = "default_pr_body")]
    pub pr_body: String,

    /// Message of every commit pushed to a mirror branch.
    #[serde(default = "default_commit_message")]
    pub commit_message: String,

    /// Comment posted when the upstream pull request is merged.
    #[serde(default = "default_merge_comment")]
    pub merge_comment: String,

    /// Comment posted after closing the downstream pull request.
    #[serde(default = "default_close_comment")]
    pub close_comment: String,

    /// Comment posted after reopening the downstream pull request.
    #[serde(default = "default_reopen_comment")]
    pub reopen_comment: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            pr_title: default_pr_title(),
            pr_body: default_pr_body(),
            commit_message: default_commit_message(),
            merge_comment: default_merge_comment(),
            close_comment: default_close_comment(),
            reopen_comment: default_reopen_comment(),
        }
    }
}

pub fn default_pr_title() -> String {
    "[SYNC BOT] {{title}} (#{{number}})".to_string()
}

pub fn default_pr_body() -> String {
    "This pull request mirrors the generated changes of \
{{upstream_repo}}#{{number}}{{#if html_url}} ({{html_url}}){{/if}}.\n\n\
It is updated automatically whenever the upstream pull request changes. \
Merge it manually once the upstream pull request has been merged.\n"
        .to_string()
}

pub fn default_commit_message() -> String {
    "[SYNC BOT] Sync with {{upstream_repo}}#{{number}}\n\n{{head_ref}}:{{head_sha}}".to_string()
}

pub fn default_merge_comment() -> String {
    "The corresponding {{upstream_repo}} pull request #{{number}} was merged\
{{#if html_url}} ({{html_url}}){{/if}}. This pull request is ready for a manual merge."
        .to_string()
}

pub fn default_close_comment() -> String {
    "The corresponding {{upstream_repo}} pull request #{{number}} was closed\
{{#if html_url}} ({{html_url}}){{/if}}."
        .to_string()
}

pub fn default_reopen_comment() -> String {
    "The corresponding {{upstream_repo}} pull request #{{number}} was reopened\
{{#if html_url}} ({{html_url}}){{/if}}."
        .to_string()
}
