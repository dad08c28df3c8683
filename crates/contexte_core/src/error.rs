use std::io;
use std::path::PathBuf;

/// Fatal outcomes of the rewrite pipeline. Any of these aborts before the file is written.
#[derive(Debug, thiserror::Error)]
pub enum ContexteError {
    #[error("failed to read {}: {source}", path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("front matter not found (expected a `---` fenced block at the top of the file)")]
    FrontMatterMissing,

    #[error("invalid front matter: {0}")]
    SchemaInvalid(String),

    #[error("section `{0}` not found in the markdown body")]
    SectionNotFound(String),

    #[error("section `{section}` already has content; use --force to overwrite it")]
    SectionAlreadyPopulated { section: String },

    #[error("failed to write {}: {source}", path.display())]
    FileUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ContexteError {
    /// Short machine-friendly name, used in structured logs and JSON reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FileUnreadable { .. } => "file_unreadable",
            Self::FrontMatterMissing => "front_matter_missing",
            Self::SchemaInvalid(_) => "schema_invalid",
            Self::SectionNotFound(_) => "section_not_found",
            Self::SectionAlreadyPopulated { .. } => "section_already_populated",
            Self::FileUnwritable { .. } => "file_unwritable",
            Self::Config(_) => "config",
        }
    }
}

pub type Result<T, E = ContexteError> = std::result::Result<T, E>;
