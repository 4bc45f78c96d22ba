//! Template rendering using Handlebars.
//!
//! Every text the bot writes downstream (pull request titles and bodies,
//! commit messages, notice comments) comes from a configurable template.

mod error;
mod renderer;

pub use error::TemplateError;
pub use renderer::{create_handlebars_registry, TemplateData, TemplateKind, TemplateRenderer};
