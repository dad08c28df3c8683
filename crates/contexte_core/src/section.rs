//! Bounded splice of the generated context between the Contexte and Objectifs headings.
//!
//! The search runs as an explicit state machine:
//! `SearchingContexte -> FoundContexte -> SearchingObjectifs -> FoundBoth -> Abort | Splice`.
//! A section counts as populated when the text between the end of the Contexte marker line and
//! the start of the Objectifs marker holds any non-whitespace character. Populated sections are
//! only replaced when forced.

use crate::attributes::{Counters, DerivedAttributes, STAT_COLUMNS};
use crate::diagnostics::{DiagnosticSink, Progress, Warning};
use crate::error::{ContexteError, Result};

pub const DEFAULT_CONTEXTE_HEADING: &str = "### Contexte";
pub const DEFAULT_OBJECTIFS_HEADING: &str = "### Objectifs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionMarkers {
    /// Must end its line, with either `\n` or `\r\n`.
    pub contexte: String,
    pub objectifs: String,
}

impl Default for SectionMarkers {
    fn default() -> Self {
        Self::from_headings(DEFAULT_CONTEXTE_HEADING, DEFAULT_OBJECTIFS_HEADING)
    }
}

impl SectionMarkers {
    pub fn from_headings(contexte: &str, objectifs: &str) -> Self {
        Self {
            contexte: contexte.trim_end().to_string(),
            objectifs: objectifs.trim_end().to_string(),
        }
    }

    pub fn contexte_name(&self) -> String {
        heading_name(&self.contexte)
    }

    pub fn objectifs_name(&self) -> String {
        heading_name(&self.objectifs)
    }
}

fn heading_name(marker: &str) -> String {
    marker.trim().trim_start_matches('#').trim().to_string()
}

/// A heading occurrence that ends its line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MarkerLine {
    start: usize,
    /// Just past the line ending.
    end: usize,
}

fn marker_lines<'b>(body: &'b str, heading: &'b str) -> impl Iterator<Item = MarkerLine> + 'b {
    body.match_indices(heading).filter_map(move |(start, _)| {
        let after = start + heading.len();
        let rest = &body[after..];
        let ending = if rest.starts_with("\r\n") {
            2
        } else if rest.starts_with('\n') {
            1
        } else {
            return None;
        };
        Some(MarkerLine {
            start,
            end: after + ending,
        })
    })
}

/// Byte range of the existing section content inside the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionSpan {
    pub content_start: usize,
    pub content_end: usize,
    pub populated: bool,
    /// The Contexte heading ends in `\r\n`; the spliced text follows it.
    pub crlf: bool,
}

impl SectionSpan {
    pub fn len(&self) -> usize {
        self.content_end - self.content_start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    ContexteMissing,
    ObjectifsMissing,
    AlreadyPopulated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionState {
    SearchingContexte,
    FoundContexte {
        marker_start: usize,
        content_start: usize,
    },
    SearchingObjectifs {
        content_start: usize,
    },
    FoundBoth(SectionSpan),
    Abort(AbortReason),
    Splice(SectionSpan),
}

impl SectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Abort(_) | Self::Splice(_))
    }
}

pub struct SectionScanner<'a> {
    body: &'a str,
    markers: &'a SectionMarkers,
    force: bool,
}

impl<'a> SectionScanner<'a> {
    pub fn new(body: &'a str, markers: &'a SectionMarkers, force: bool) -> Self {
        Self {
            body,
            markers,
            force,
        }
    }

    /// One transition. Terminal states are returned unchanged.
    pub fn advance(&self, state: SectionState, sink: &mut dyn DiagnosticSink) -> SectionState {
        match state {
            SectionState::SearchingContexte => {
                match marker_lines(self.body, &self.markers.contexte).next() {
                    Some(marker) => SectionState::FoundContexte {
                        marker_start: marker.start,
                        content_start: marker.end,
                    },
                    None => SectionState::Abort(AbortReason::ContexteMissing),
                }
            }
            SectionState::FoundContexte {
                marker_start,
                content_start,
            } => {
                let occurrences =
                    marker_lines(&self.body[marker_start..], &self.markers.contexte).count();
                if occurrences > 1 {
                    sink.warn(Warning::DuplicateMarker {
                        marker: self.markers.contexte.trim_end().to_string(),
                        occurrences,
                    });
                }
                SectionState::SearchingObjectifs { content_start }
            }
            SectionState::SearchingObjectifs { content_start } => {
                match self.body[content_start..].find(&self.markers.objectifs) {
                    Some(offset) => {
                        let content_end = content_start + offset;
                        SectionState::FoundBoth(SectionSpan {
                            content_start,
                            content_end,
                            populated: !self.body[content_start..content_end].trim().is_empty(),
                            crlf: self.body[..content_start].ends_with("\r\n"),
                        })
                    }
                    None => SectionState::Abort(AbortReason::ObjectifsMissing),
                }
            }
            SectionState::FoundBoth(span) => {
                if span.populated && !self.force {
                    SectionState::Abort(AbortReason::AlreadyPopulated)
                } else {
                    if span.populated {
                        sink.warn(Warning::SectionOverwritten {
                            section: self.markers.contexte_name(),
                        });
                    }
                    SectionState::Splice(span)
                }
            }
            terminal => terminal,
        }
    }

    /// Run the machine to a terminal state and turn an abort into its error.
    pub fn locate(&self, sink: &mut dyn DiagnosticSink) -> Result<SectionSpan> {
        let mut state = SectionState::SearchingContexte;
        while !state.is_terminal() {
            state = self.advance(state, sink);
        }
        match state {
            SectionState::Splice(span) => Ok(span),
            SectionState::Abort(reason) => Err(self.abort_error(reason)),
            _ => unreachable!("loop exits on terminal states only"),
        }
    }

    fn abort_error(&self, reason: AbortReason) -> ContexteError {
        match reason {
            AbortReason::ContexteMissing => {
                ContexteError::SectionNotFound(self.markers.contexte_name())
            }
            AbortReason::ObjectifsMissing => {
                ContexteError::SectionNotFound(self.markers.objectifs_name())
            }
            AbortReason::AlreadyPopulated => ContexteError::SectionAlreadyPopulated {
                section: self.markers.contexte_name(),
            },
        }
    }
}

/// Replace the span with `sentence` and one blank line. Everything from the Objectifs marker on
/// is kept verbatim.
pub fn splice(body: &str, span: SectionSpan, sentence: &str) -> String {
    let mut output = String::with_capacity(body.len() + sentence.len() + 2);
    output.push_str(&body[..span.content_start]);
    if span.crlf {
        output.push_str(&sentence.replace('\n', "\r\n"));
        output.push_str("\r\n");
    } else {
        output.push_str(sentence);
        output.push('\n');
    }
    output.push_str(&body[span.content_end..]);
    output
}

pub fn rewrite_section(
    body: &str,
    sentence: &str,
    markers: &SectionMarkers,
    force: bool,
    sink: &mut dyn DiagnosticSink,
) -> Result<String> {
    let span = SectionScanner::new(body, markers, force).locate(sink)?;
    sink.progress(Progress::SectionSpliced {
        section: markers.contexte_name(),
        replaced_bytes: span.len(),
    });
    Ok(splice(body, span, sentence))
}

pub fn stats_table(counters: &Counters) -> String {
    let header = STAT_COLUMNS.join(" | ");
    let separator = vec!["---"; STAT_COLUMNS.len()].join(" | ");
    let values = counters
        .stat_values()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ");
    format!("| {header} |\n| {separator} |\n| {values} |\n")
}

/// Non-zero stats joined by `/`, e.g. `10/5/3/2`.
pub fn format_stats(counters: &Counters) -> String {
    counters
        .stat_values()
        .iter()
        .filter(|value| value.as_f64() != Some(0.0))
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

pub fn context_sentence(attributes: &DerivedAttributes) -> String {
    let lead = if attributes.date.is_empty() {
        attributes.description.clone()
    } else {
        format!("{} {}", attributes.date, attributes.description)
    };
    format!("{lead}.\n\n{}", stats_table(&attributes.counters))
}
