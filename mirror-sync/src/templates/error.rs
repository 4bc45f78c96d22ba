//! Template rendering error types.

/// Template rendering error.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// Handlebars rendering error.
    #[error("Failed to render template '{name}': {source}")]
    RenderError {
        name: &'static str,
        #[source]
        source: handlebars::RenderError,
    },

    /// Template registration error.
    #[error("Invalid template '{name}': {source}")]
    RegistrationError {
        name: &'static str,
        #[source]
        source: Box<handlebars::TemplateError>,
    },
}
