use std::fs;
use std::path::Path;

use serde::Serialize;
use similar::TextDiff;

use crate::attributes::{DerivedAttributes, build_final_attributes};
use crate::diagnostics::{DiagnosticSink, Progress, TeeSink, Warning};
use crate::error::{ContexteError, Result};
use crate::front_matter::{decode, render_block, split_document};
use crate::section::{SectionMarkers, context_sentence, format_stats, rewrite_section};

#[derive(Debug, Clone, Default)]
pub struct RewriteOptions {
    pub force: bool,
    pub dry_run: bool,
    pub markers: SectionMarkers,
}

/// New document assembled in memory, not yet written anywhere.
#[derive(Debug, Clone)]
pub struct Rewrite {
    pub content: String,
    pub attributes: DerivedAttributes,
}

#[derive(Debug, Clone, Serialize)]
pub struct RewriteReport {
    pub path: String,
    pub date: String,
    pub description: String,
    pub stats: String,
    pub changed: bool,
    pub written: bool,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    pub warnings: Vec<Warning>,
}

pub fn rewrite_document(
    file_name: &str,
    raw_text: &str,
    options: &RewriteOptions,
    sink: &mut dyn DiagnosticSink,
) -> Result<Rewrite> {
    let document = split_document(raw_text)?;
    let front_matter = decode(&document.front_matter)?;
    sink.progress(Progress::FrontMatterParsed {
        alias: front_matter.canonical_alias().to_string(),
    });

    let attributes = build_final_attributes(file_name, &front_matter, sink);
    let sentence = context_sentence(&attributes);
    let body = rewrite_section(
        &document.body,
        &sentence,
        &options.markers,
        options.force,
        sink,
    )?;
    let mut block = render_block(&attributes.to_mapping()?)?;
    if uses_crlf(raw_text) {
        block = block.replace('\n', "\r\n");
    }

    Ok(Rewrite {
        content: format!("{block}{body}"),
        attributes,
    })
}

/// Read, rewrite and write back one file. Nothing is written unless the whole pipeline
/// succeeded; fatal outcomes are reported to `sink` before being returned.
pub fn rewrite_file(
    path: &Path,
    options: &RewriteOptions,
    sink: &mut dyn DiagnosticSink,
) -> Result<RewriteReport> {
    let mut tee = TeeSink::new(sink);
    let outcome = run_rewrite(path, options, &mut tee);
    if let Err(error) = &outcome {
        tee.fail(error);
    }
    outcome.map(|report| RewriteReport {
        warnings: tee.warnings,
        ..report
    })
}

fn run_rewrite(
    path: &Path,
    options: &RewriteOptions,
    sink: &mut dyn DiagnosticSink,
) -> Result<RewriteReport> {
    let original = fs::read_to_string(path).map_err(|source| ContexteError::FileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let rewrite = rewrite_document(&file_name, &original, options, sink)?;
    let changed = rewrite.content != original;
    let display_path = normalize_path(path);

    let diff = options
        .dry_run
        .then(|| unified_diff(&original, &rewrite.content, &display_path));
    let written = if options.dry_run {
        sink.progress(Progress::DryRun {
            path: display_path.clone(),
        });
        false
    } else if !changed {
        sink.progress(Progress::FileUnchanged {
            path: display_path.clone(),
        });
        false
    } else {
        fs::write(path, &rewrite.content).map_err(|source| ContexteError::FileUnwritable {
            path: path.to_path_buf(),
            source,
        })?;
        sink.progress(Progress::FileWritten {
            path: display_path.clone(),
        });
        true
    };

    Ok(RewriteReport {
        path: display_path,
        stats: format_stats(&rewrite.attributes.counters),
        date: rewrite.attributes.date,
        description: rewrite.attributes.description,
        changed,
        written,
        dry_run: options.dry_run,
        diff,
        warnings: Vec::new(),
    })
}

pub fn unified_diff(old: &str, new: &str, name: &str) -> String {
    TextDiff::from_lines(old, new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{name}"), &format!("b/{name}"))
        .to_string()
}

/// The opening fence line decides the line ending of the rewritten block.
fn uses_crlf(raw_text: &str) -> bool {
    raw_text
        .split_once('\n')
        .is_some_and(|(first, _)| first.ends_with('\r'))
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
