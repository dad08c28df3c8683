use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Serialize;
use serde_yaml::{Mapping, Number};

use crate::diagnostics::{DiagnosticSink, Progress, Warning};
use crate::error::Result;
use crate::front_matter::{RawFrontMatter, to_mapping};

/// Columns of the stats table, in display order. `date_prevus` and `instant_dates` are kept in
/// the front matter but not shown.
pub const STAT_COLUMNS: [&str; 7] = ["sets", "marquants", "propals", "close", "kc", "pull", "fc"];

/// Session counters as written in the front matter. Any YAML number is accepted, so integers
/// stay integers and fractions survive a rewrite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Counters {
    pub sets: Number,
    pub marquants: Number,
    pub propals: Number,
    pub close: Number,
    pub date_prevus: Number,
    pub instant_dates: Number,
    pub kc: Number,
    pub pull: Number,
    pub fc: Number,
}

impl Default for Counters {
    fn default() -> Self {
        let zero = Number::from(0);
        Self {
            sets: zero.clone(),
            marquants: zero.clone(),
            propals: zero.clone(),
            close: zero.clone(),
            date_prevus: zero.clone(),
            instant_dates: zero.clone(),
            kc: zero.clone(),
            pull: zero.clone(),
            fc: zero,
        }
    }
}

impl Counters {
    pub fn from_raw(raw: &RawFrontMatter) -> Self {
        let count = |value: &Option<Number>| value.clone().unwrap_or_else(|| Number::from(0));
        Self {
            sets: count(&raw.sets),
            marquants: count(&raw.marquants),
            propals: count(&raw.propals),
            close: count(&raw.close),
            date_prevus: count(&raw.date_prevus),
            instant_dates: count(&raw.instant_dates),
            kc: count(&raw.kc),
            pull: count(&raw.pull),
            fc: count(&raw.fc),
        }
    }

    /// Values of [`STAT_COLUMNS`], in order.
    pub fn stat_values(&self) -> [&Number; 7] {
        [
            &self.sets,
            &self.marquants,
            &self.propals,
            &self.close,
            &self.kc,
            &self.pull,
            &self.fc,
        ]
    }
}

/// Normalized attributes written back to the front matter. Field order is the output key order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedAttributes {
    pub aliases: Vec<String>,
    pub city: String,
    pub wings: Vec<String>,
    #[serde(flatten)]
    pub counters: Counters,
    /// `dd/mm/yyyy`, or empty when no date could be resolved.
    pub date: String,
    pub description: String,
    #[serde(skip)]
    pub extra: Mapping,
}

impl DerivedAttributes {
    pub fn to_mapping(&self) -> Result<Mapping> {
        let mut mapping = to_mapping(self)?;
        for (key, value) in &self.extra {
            mapping.insert(key.clone(), value.clone());
        }
        Ok(mapping)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSource {
    FileName,
    Alias,
}

impl DateSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileName => "file_name",
            Self::Alias => "alias",
        }
    }
}

fn iso_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|[^0-9])([0-9]{4})-([0-9]{1,2})-([0-9]{1,2})(?:[^0-9]|$)")
            .expect("regex for year-month-day dates")
    })
}

fn french_date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?:^|[^0-9])([0-9]{1,2})/([0-9]{1,2})/([0-9]{4})(?:[^0-9]|$)")
            .expect("regex for day/month/year dates")
    })
}

fn session_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b[Ss]ession\b").expect("regex for session token"))
}

fn whitespace_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s{2,}").expect("regex for whitespace runs"))
}

/// First `yyyy-m-d` date in `source`, reordered as `dd/mm/yyyy`.
pub fn extract_date(source: &str) -> Option<String> {
    let captures = iso_date_pattern().captures(source)?;
    let group = |index: usize| captures.get(index).map(|m| m.as_str()).unwrap_or_default();
    Some(format!(
        "{:0>2}/{:0>2}/{}",
        group(3),
        group(2),
        group(1)
    ))
}

/// True if `source` holds a date in either `yyyy-m-d` or `d/m/yyyy` form.
pub fn contains_date(source: &str) -> bool {
    iso_date_pattern().is_match(source) || french_date_pattern().is_match(source)
}

pub fn remove_date_from_alias(alias: &str) -> String {
    let without_date = match iso_date_pattern().captures(alias) {
        Some(captures) => {
            let (start, end) = date_span(&captures);
            format!("{}{}", &alias[..start], &alias[end..])
        }
        None => alias.to_string(),
    };
    collapse_whitespace(&without_date)
}

// The pattern also consumes one boundary character on each side; only the date itself goes.
fn date_span(captures: &Captures<'_>) -> (usize, usize) {
    let start = captures.get(1).map(|m| m.start()).unwrap_or_default();
    let end = captures.get(3).map(|m| m.end()).unwrap_or(start);
    (start, end)
}

fn collapse_whitespace(value: &str) -> String {
    whitespace_run_pattern()
        .replace_all(value, " ")
        .trim()
        .to_string()
}

fn resolve_date(file_name: &str, alias: &str) -> Option<(String, DateSource)> {
    extract_date(file_name)
        .map(|date| (date, DateSource::FileName))
        .or_else(|| extract_date(alias).map(|date| (date, DateSource::Alias)))
}

/// File name first, then alias. Empty, with a warning, when neither carries a date.
pub fn derive_date(file_name: &str, alias: &str) -> (String, Option<Warning>) {
    match resolve_date(file_name, alias) {
        Some((date, _)) => (date, None),
        None => (String::new(), Some(unresolved_date(file_name, alias))),
    }
}

fn unresolved_date(file_name: &str, alias: &str) -> Warning {
    Warning::DateUnresolved {
        file_name: file_name.to_string(),
        alias: alias.to_string(),
    }
}

/// Alias stripped of its date and of the `Session` token.
pub fn session_name(alias: &str) -> String {
    let without_date = remove_date_from_alias(alias);
    collapse_whitespace(&session_token_pattern().replace_all(&without_date, ""))
}

/// "A", "A et B", "A, B et C". `None` for an empty list.
pub fn format_wings(wings: &[String]) -> Option<String> {
    match wings {
        [] => None,
        [only] => Some(only.clone()),
        [head @ .., last] => Some(format!("{} et {last}", head.join(", "))),
    }
}

pub fn derive_description(alias: &str, city: &str, wings: &[String]) -> String {
    let mut description = String::from("Session");
    let session = session_name(alias);
    if !session.is_empty() {
        description.push(' ');
        description.push_str(&session);
    }
    description.push_str(" à ");
    description.push_str(city);
    if let Some(wings) = format_wings(wings) {
        description.push_str(" avec ");
        description.push_str(&wings);
    }
    description
}

pub fn build_final_attributes(
    file_name: &str,
    raw: &RawFrontMatter,
    sink: &mut dyn DiagnosticSink,
) -> DerivedAttributes {
    let alias = raw.canonical_alias();
    let date = match resolve_date(file_name, alias) {
        Some((date, source)) => {
            sink.progress(Progress::DateResolved {
                date: date.clone(),
                source: source.as_str(),
            });
            date
        }
        None => {
            sink.warn(unresolved_date(file_name, alias));
            String::new()
        }
    };
    let wings = raw.wings.clone().unwrap_or_default();
    let description = derive_description(alias, &raw.city, &wings);

    DerivedAttributes {
        aliases: raw.aliases.clone(),
        city: raw.city.clone(),
        wings,
        counters: Counters::from_raw(raw),
        date,
        description,
        extra: raw.extra.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;

    fn wings(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_string()).collect()
    }

    fn raw(aliases: &[&str], city: &str) -> RawFrontMatter {
        RawFrontMatter {
            aliases: wings(aliases),
            city: city.to_string(),
            ..RawFrontMatter::default()
        }
    }

    #[test]
    fn extract_date_reorders_to_french() {
        assert_eq!(
            extract_date("...2023-03-15...").as_deref(),
            Some("15/03/2023")
        );
        assert_eq!(
            extract_date("report_2023-03-15.md").as_deref(),
            Some("15/03/2023")
        );
    }

    #[test]
    fn extract_date_pads_single_digits() {
        assert_eq!(
            extract_date("Session 2024-7-4 Bastille").as_deref(),
            Some("04/07/2024")
        );
    }

    #[test]
    fn extract_date_returns_none_without_pattern() {
        assert_eq!(extract_date("Session aux Champs"), None);
        assert_eq!(extract_date(""), None);
        assert_eq!(extract_date("15/03/2023"), None);
        assert_eq!(extract_date("2023-03"), None);
        assert_eq!(extract_date("12023-03-15"), None);
        assert_eq!(extract_date("2023-03-155"), None);
    }

    #[test]
    fn extract_date_takes_first_match() {
        assert_eq!(
            extract_date("2022-01-02 then 2023-03-15").as_deref(),
            Some("02/01/2022")
        );
    }

    #[test]
    fn contains_date_accepts_both_orders() {
        assert!(contains_date("2023-03-15"));
        assert!(contains_date("le 15/03/2023"));
        assert!(!contains_date("mars"));
    }

    #[test]
    fn remove_date_collapses_spacing() {
        assert_eq!(
            remove_date_from_alias("Session 2023-03-15 aux Champs"),
            "Session aux Champs"
        );
        assert_eq!(remove_date_from_alias("2023-03-15 Louvre"), "Louvre");
    }

    #[test]
    fn remove_date_without_date_only_trims() {
        assert_eq!(
            remove_date_from_alias("  Session aux Champs "),
            "Session aux Champs"
        );
    }

    #[test]
    fn remove_date_keeps_neighbouring_text() {
        assert_eq!(
            remove_date_from_alias("Session(2023-03-15)Louvre"),
            "Session()Louvre"
        );
    }

    #[test]
    fn derive_date_prefers_file_name() {
        assert_eq!(
            derive_date("report_2023-03-15.md", "Session 2022-01-01 Louvre").0,
            "15/03/2023"
        );
        assert_eq!(
            derive_date("report.md", "Session 2022-01-01 Louvre").0,
            "01/01/2022"
        );
    }

    #[test]
    fn derive_date_warns_when_unresolved() {
        let (date, warning) = derive_date("report.md", "Session Louvre");
        assert_eq!(date, "");
        assert!(matches!(
            warning,
            Some(Warning::DateUnresolved { ref alias, .. }) if alias == "Session Louvre"
        ));
        assert!(derive_date("2023-03-15.md", "Louvre").1.is_none());
    }

    #[test]
    fn wings_formatting() {
        assert_eq!(format_wings(&[]), None);
        assert_eq!(format_wings(&wings(&["A"])).as_deref(), Some("A"));
        assert_eq!(format_wings(&wings(&["A", "B"])).as_deref(), Some("A et B"));
        assert_eq!(
            format_wings(&wings(&["A", "B", "C"])).as_deref(),
            Some("A, B et C")
        );
    }

    #[test]
    fn description_omits_avec_without_wings() {
        assert_eq!(
            derive_description("Session 2023-03-15 Louvre", "Paris", &[]),
            "Session Louvre à Paris"
        );
    }

    #[test]
    fn description_with_wings() {
        assert_eq!(
            derive_description(
                "Session 2023-03-15 aux Champs-Élysées",
                "Paris",
                &wings(&["Gérard", "Victor"])
            ),
            "Session aux Champs-Élysées à Paris avec Gérard et Victor"
        );
        assert_eq!(
            derive_description("Session à Chatelet", "Paris", &wings(&["A", "B", "C"])),
            "Session à Chatelet à Paris avec A, B et C"
        );
    }

    #[test]
    fn description_without_session_name_has_single_spaces() {
        assert_eq!(
            derive_description("Session 2023-03-15", "Paris", &wings(&["A", "B"])),
            "Session à Paris avec A et B"
        );
        assert_eq!(
            derive_description("session 2023-03-15", "Lyon", &[]),
            "Session à Lyon"
        );
    }

    #[test]
    fn city_is_written_as_given() {
        assert_eq!(
            derive_description("Louvre", "Saint-Denis ", &[]),
            "Session Louvre à Saint-Denis "
        );
        assert_eq!(derive_description("Louvre", "", &[]), "Session Louvre à ");
    }

    #[test]
    fn session_token_is_matched_as_a_whole_word() {
        assert_eq!(session_name("Sessions du soir"), "Sessions du soir");
    }

    #[test]
    fn final_attributes_default_counters_to_zero() {
        let mut front_matter = raw(&["Session à Chatelet"], "Paris");
        front_matter.wings = Some(wings(&["wing1", "wing2"]));
        front_matter.sets = Some(Number::from(10));
        front_matter.marquants = Some(Number::from(5));
        front_matter.propals = Some(Number::from(3));
        front_matter.close = Some(Number::from(2));
        let mut sink = RecordingSink::default();

        let attributes =
            build_final_attributes("test-file_2023-03-15.md", &front_matter, &mut sink);

        assert_eq!(attributes.date, "15/03/2023");
        assert_eq!(
            attributes.description,
            "Session à Chatelet à Paris avec wing1 et wing2"
        );
        assert_eq!(
            attributes.counters,
            Counters {
                sets: Number::from(10),
                marquants: Number::from(5),
                propals: Number::from(3),
                close: Number::from(2),
                ..Counters::default()
            }
        );
        assert!(sink.warnings.is_empty());
        assert_eq!(
            sink.progress,
            vec![Progress::DateResolved {
                date: "15/03/2023".to_string(),
                source: "file_name",
            }]
        );
    }

    #[test]
    fn final_attributes_warn_when_date_is_missing() {
        let front_matter = raw(&["Session Louvre"], "Paris");
        let mut sink = RecordingSink::default();

        let attributes = build_final_attributes("notes.md", &front_matter, &mut sink);

        assert_eq!(attributes.date, "");
        assert_eq!(attributes.wings, Vec::<String>::new());
        assert_eq!(
            sink.warnings,
            vec![Warning::DateUnresolved {
                file_name: "notes.md".to_string(),
                alias: "Session Louvre".to_string(),
            }]
        );
    }

    #[test]
    fn stat_values_skip_hidden_counters() {
        let counters = Counters {
            kc: Number::from(4),
            date_prevus: Number::from(9),
            ..Counters::default()
        };
        let values: Vec<String> = counters
            .stat_values()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(values, ["0", "0", "0", "0", "4", "0", "0"]);
    }
}
