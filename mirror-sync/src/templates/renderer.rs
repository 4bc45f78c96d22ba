//! Template renderer.

use super::TemplateError;
use crate::config::{RepositoryId, TemplatesConfig};
use crate::events::UpstreamPullRequest;
use handlebars::{
    no_escape, Context, Handlebars, Helper, HelperResult, Output, RenderContext,
};
use serde::Serialize;

/// Creates a configured Handlebars registry with custom helpers.
///
/// The registry is configured with:
/// - No HTML escaping (for markdown output)
/// - Strict mode (catches missing variables)
/// - `eq` helper for equality comparisons
#[must_use]
pub fn create_handlebars_registry() -> Handlebars<'static> {
    let mut hbs = Handlebars::new();

    // Disable HTML escaping for markdown output
    hbs.register_escape_fn(no_escape);

    // Enable strict mode to catch missing variables
    hbs.set_strict_mode(true);

    hbs.register_helper("eq", Box::new(eq_helper));

    hbs
}

/// Helper function for equality comparison in templates.
///
/// Usage: `{{#if (eq variable "value")}}...{{/if}}`
fn eq_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let param1 = h.param(0).and_then(|v| v.value().as_str());
    let param2 = h.param(1).and_then(|v| v.value().as_str());

    let result = match (param1, param2) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };

    out.write(if result { "true" } else { "" })?;
    Ok(())
}

/// The configurable templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    PrTitle,
    PrBody,
    CommitMessage,
    MergeComment,
    CloseComment,
    ReopenComment,
}

impl TemplateKind {
    pub const ALL: [Self; 6] = [
        Self::PrTitle,
        Self::PrBody,
        Self::CommitMessage,
        Self::MergeComment,
        Self::CloseComment,
        Self::ReopenComment,
    ];

    /// Configuration key of the template.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::PrTitle => "pr-title",
            Self::PrBody => "pr-body",
            Self::CommitMessage => "commit-message",
            Self::MergeComment => "merge-comment",
            Self::CloseComment => "close-comment",
            Self::ReopenComment => "reopen-comment",
        }
    }

    fn source(self, config: &TemplatesConfig) -> &str {
        match self {
            Self::PrTitle => &config.pr_title,
            Self::PrBody => &config.pr_body,
            Self::CommitMessage => &config.commit_message,
            Self::MergeComment => &config.merge_comment,
            Self::CloseComment => &config.close_comment,
            Self::ReopenComment => &config.reopen_comment,
        }
    }
}

/// Variables available to every template.
///
/// Optional upstream fields are rendered as empty strings so that
/// `{{#if html_url}}` works under strict mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateData {
    pub upstream_repo: String,
    pub downstream_repo: String,
    pub number: u64,
    pub title: String,
    pub head_ref: String,
    pub head_sha: String,
    pub html_url: String,
    pub base_ref: String,
    /// Mirror branch name.
    pub branch: String,
}

impl TemplateData {
    #[must_use]
    pub fn new(
        upstream: &RepositoryId,
        downstream: &RepositoryId,
        pull_request: &UpstreamPullRequest,
        branch: &str,
    ) -> Self {
        Self {
            upstream_repo: upstream.full_name(),
            downstream_repo: downstream.full_name(),
            number: pull_request.number,
            title: pull_request.title.clone(),
            head_ref: pull_request.head_ref.clone(),
            head_sha: pull_request.head_sha.clone(),
            html_url: pull_request.html_url.clone().unwrap_or_default(),
            base_ref: pull_request.base_ref.clone().unwrap_or_default(),
            branch: branch.to_string(),
        }
    }
}

/// Renders the configured templates.
pub struct TemplateRenderer {
    handlebars: Handlebars<'static>,
}

impl std::fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateRenderer").finish_non_exhaustive()
    }
}

impl TemplateRenderer {
    /// Compiles every template in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::RegistrationError`] for a template with
    /// invalid syntax.
    pub fn new(config: &TemplatesConfig) -> Result<Self, TemplateError> {
        let mut handlebars = create_handlebars_registry();
        for kind in TemplateKind::ALL {
            handlebars
                .register_template_string(kind.name(), kind.source(config))
                .map_err(|e| TemplateError::RegistrationError {
                    name: kind.name(),
                    source: Box::new(e),
                })?;
        }
        Ok(Self { handlebars })
    }

    /// Renders one template.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::RenderError`] if rendering fails, e.g. on an
    /// unknown variable.
    pub fn render(&self, kind: TemplateKind, data: &TemplateData) -> Result<String, TemplateError> {
        self.handlebars
            .render(kind.name(), data)
            .map_err(|e| TemplateError::RenderError {
                name: kind.name(),
                source: e,
            })
    }

    /// Renders the pull request title, trimmed to a single line.
    ///
    /// # Errors
    ///
    /// See [`TemplateRenderer::render`].
    pub fn render_title(&self, data: &TemplateData) -> Result<String, TemplateError> {
        let title = self.render(TemplateKind::PrTitle, data)?;
        Ok(title.lines().map(str::trim).collect::<Vec<_>>().join(" ").trim().to_string())
    }
}
