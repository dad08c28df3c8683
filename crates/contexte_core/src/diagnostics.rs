//! Diagnostic sink injected into the pipeline.
//!
//! The core never logs through a global. Every stage that has something to say takes a
//! `&mut dyn DiagnosticSink`; the binary hands in [`TracingSink`], tests hand in
//! [`RecordingSink`].

use std::fmt;

use serde::Serialize;

use crate::error::ContexteError;

/// Non-fatal conditions. Processing continues after any of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Neither the file name nor the canonical alias carried a date.
    DateUnresolved { file_name: String, alias: String },
    /// A marker heading appears more than once; the first one is used.
    DuplicateMarker { marker: String, occurrences: usize },
    /// A populated section was replaced because the force flag was set.
    SectionOverwritten { section: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DateUnresolved { file_name, alias } => write!(
                f,
                "no date found in file name `{file_name}` nor in alias `{alias}`; the context sentence will have no date"
            ),
            Self::DuplicateMarker {
                marker,
                occurrences,
            } => write!(
                f,
                "marker `{marker}` appears {occurrences} times; using the first one"
            ),
            Self::SectionOverwritten { section } => {
                write!(f, "existing content of section `{section}` was overwritten")
            }
        }
    }
}

/// Progress milestones of one rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    FrontMatterParsed { alias: String },
    DateResolved { date: String, source: &'static str },
    SectionSpliced { section: String, replaced_bytes: usize },
    FileWritten { path: String },
    FileUnchanged { path: String },
    DryRun { path: String },
}

pub trait DiagnosticSink {
    fn warn(&mut self, warning: Warning);
    fn progress(&mut self, progress: Progress);
    fn fail(&mut self, error: &ContexteError);
}

/// Forwards everything to `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn warn(&mut self, warning: Warning) {
        match &warning {
            Warning::DateUnresolved { file_name, alias } => {
                tracing::warn!(file = %file_name, alias = %alias, "{warning}");
            }
            Warning::DuplicateMarker { marker, .. } => {
                tracing::warn!(marker = %marker, "{warning}");
            }
            Warning::SectionOverwritten { section } => {
                tracing::warn!(section = %section, "{warning}");
            }
        }
    }

    fn progress(&mut self, progress: Progress) {
        match progress {
            Progress::FrontMatterParsed { alias } => {
                tracing::debug!(alias = %alias, "front matter parsed");
            }
            Progress::DateResolved { date, source } => {
                tracing::debug!(date = %date, source, "date resolved");
            }
            Progress::SectionSpliced {
                section,
                replaced_bytes,
            } => {
                tracing::debug!(section = %section, replaced_bytes, "section spliced");
            }
            Progress::FileWritten { path } => {
                tracing::info!(file = %path, "file successfully written");
            }
            Progress::FileUnchanged { path } => {
                tracing::info!(file = %path, "file already up to date");
            }
            Progress::DryRun { path } => {
                tracing::info!(file = %path, "dry run, file left untouched");
            }
        }
    }

    fn fail(&mut self, error: &ContexteError) {
        tracing::error!(kind = error.kind(), "{error}");
    }
}

/// Keeps every event in memory. Used by tests and by the orchestrator to build its report.
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    pub warnings: Vec<Warning>,
    pub progress: Vec<Progress>,
    pub failures: Vec<String>,
}

impl DiagnosticSink for RecordingSink {
    fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning);
    }

    fn progress(&mut self, progress: Progress) {
        self.progress.push(progress);
    }

    fn fail(&mut self, error: &ContexteError) {
        self.failures.push(error.kind().to_string());
    }
}

/// Records warnings for the report while forwarding every event to an inner sink.
pub(crate) struct TeeSink<'a> {
    inner: &'a mut dyn DiagnosticSink,
    pub(crate) warnings: Vec<Warning>,
}

impl<'a> TeeSink<'a> {
    pub(crate) fn new(inner: &'a mut dyn DiagnosticSink) -> Self {
        Self {
            inner,
            warnings: Vec::new(),
        }
    }
}

impl DiagnosticSink for TeeSink<'_> {
    fn warn(&mut self, warning: Warning) {
        self.warnings.push(warning.clone());
        self.inner.warn(warning);
    }

    fn progress(&mut self, progress: Progress) {
        self.inner.progress(progress);
    }

    fn fail(&mut self, error: &ContexteError) {
        self.inner.fail(error);
    }
}
