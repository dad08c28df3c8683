//! Rewrites the `### Contexte` section of a session report from its YAML front matter.

pub mod attributes;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod front_matter;
pub mod rewrite;
pub mod section;

pub use diagnostics::{DiagnosticSink, RecordingSink, TracingSink, Warning};
pub use error::ContexteError;
pub use rewrite::{RewriteOptions, RewriteReport, rewrite_document, rewrite_file};
