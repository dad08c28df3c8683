//! Front matter codec: split the `---` fenced block from the body, validate it against the
//! schema table and write it back in a stable layout.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Number, Value};

use crate::attributes::contains_date;
use crate::error::{ContexteError, Result};

pub const FENCE: &str = "---";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Sequence of strings. `non_empty` rejects `[]`.
    StringList { non_empty: bool },
    Text,
    /// Any YAML number, defaulted to 0 downstream.
    Counter,
    /// String holding a `yyyy-mm-dd` or `dd/mm/yyyy` date somewhere in it.
    Date,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn field(name: &'static str, kind: FieldKind, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required,
    }
}

pub const SCHEMA: &[FieldSpec] = &[
    field("aliases", FieldKind::StringList { non_empty: true }, true),
    field("city", FieldKind::Text, true),
    field("wings", FieldKind::StringList { non_empty: false }, false),
    field("sets", FieldKind::Counter, false),
    field("marquants", FieldKind::Counter, false),
    field("propals", FieldKind::Counter, false),
    field("close", FieldKind::Counter, false),
    field("date_prevus", FieldKind::Counter, false),
    field("instant_dates", FieldKind::Counter, false),
    field("kc", FieldKind::Counter, false),
    field("pull", FieldKind::Counter, false),
    field("fc", FieldKind::Counter, false),
    field("date", FieldKind::Date, false),
];

/// Generated key, recognised on input so reruns do not treat it as user metadata.
const DERIVED_KEYS: [&str; 1] = ["description"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawFrontMatter {
    pub aliases: Vec<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wings: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sets: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marquants: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propals: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub close: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_prevus: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instant_dates: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kc: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fc: Option<Number>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Keys outside the schema, in input order.
    #[serde(skip)]
    pub extra: Mapping,
}

impl RawFrontMatter {
    pub fn canonical_alias(&self) -> &str {
        self.aliases.first().map(String::as_str).unwrap_or_default()
    }

    pub fn to_mapping(&self) -> Result<Mapping> {
        let mut mapping = to_mapping(self)?;
        for (key, value) in &self.extra {
            mapping.insert(key.clone(), value.clone());
        }
        Ok(mapping)
    }
}

/// A document split at its closing fence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownDocument {
    pub front_matter: String,
    pub body: String,
}

pub fn split_document(raw_text: &str) -> Result<MarkdownDocument> {
    let text = raw_text.strip_prefix('\u{feff}').unwrap_or(raw_text);
    let mut lines = LineCursor::new(text);

    match lines.next() {
        Some(line) if is_fence(line.content) => {}
        _ => return Err(ContexteError::FrontMatterMissing),
    }
    let block_start = lines.offset;

    let (block_end, mut body_start) = loop {
        match lines.next() {
            Some(line) if is_fence(line.content) => break (line.start, lines.offset),
            Some(_) => continue,
            None => return Err(ContexteError::FrontMatterMissing),
        }
    };

    if let Some(line) = lines.next()
        && line.content.trim().is_empty()
        && line.terminated
    {
        body_start = lines.offset;
    }

    let block = &text[block_start..block_end];
    let block = block
        .strip_suffix("\r\n")
        .or_else(|| block.strip_suffix('\n'))
        .unwrap_or(block);

    Ok(MarkdownDocument {
        front_matter: block.to_string(),
        body: text[body_start..].to_string(),
    })
}

pub fn strip_front_matter(raw_text: &str) -> Result<String> {
    split_document(raw_text).map(|document| document.body)
}

pub fn parse(raw_text: &str) -> Result<RawFrontMatter> {
    let document = split_document(raw_text)?;
    decode(&document.front_matter)
}

/// Decode and validate the text between the fences.
pub fn decode(block: &str) -> Result<RawFrontMatter> {
    let value: Value = serde_yaml::from_str(block)
        .map_err(|error| ContexteError::SchemaInvalid(format!("malformed YAML: {error}")))?;
    let Value::Mapping(mapping) = value else {
        return Err(ContexteError::SchemaInvalid(
            "front matter must be a mapping of keys to values".to_string(),
        ));
    };

    let mut known = Mapping::new();
    let mut extra = Mapping::new();
    for (key, value) in mapping {
        let name = key.as_str().unwrap_or_default();
        if SCHEMA.iter().any(|spec| spec.name == name) {
            if !value.is_null() {
                known.insert(key, value);
            }
        } else if !DERIVED_KEYS.contains(&name) {
            extra.insert(key, value);
        }
    }

    for spec in SCHEMA {
        match known.get(spec.name) {
            Some(value) => check_field(spec, value)?,
            None if spec.required => {
                return Err(ContexteError::SchemaInvalid(format!(
                    "missing required field `{}`",
                    spec.name
                )));
            }
            None => {}
        }
    }

    let mut front_matter: RawFrontMatter = serde_yaml::from_value(Value::Mapping(known))
        .map_err(|error| ContexteError::SchemaInvalid(error.to_string()))?;
    front_matter.extra = extra;
    Ok(front_matter)
}

fn check_field(spec: &FieldSpec, value: &Value) -> Result<()> {
    let invalid = |expected: &str| {
        Err(ContexteError::SchemaInvalid(format!(
            "field `{}` must be {expected}",
            spec.name
        )))
    };
    match spec.kind {
        FieldKind::StringList { non_empty } => {
            let Some(items) = value.as_sequence() else {
                return invalid("a list of strings");
            };
            if !items.iter().all(Value::is_string) {
                return invalid("a list of strings");
            }
            if non_empty && items.is_empty() {
                return invalid("a non-empty list of strings");
            }
        }
        FieldKind::Text => {
            if !value.is_string() {
                return invalid("a string");
            }
        }
        FieldKind::Counter => {
            if !value.is_number() {
                return invalid("a number");
            }
        }
        FieldKind::Date => match value.as_str() {
            Some(text) if text.is_empty() || contains_date(text) => {}
            _ => return invalid("a string containing a date (yyyy-mm-dd or dd/mm/yyyy)"),
        },
    }
    Ok(())
}

pub fn to_mapping<T: Serialize>(value: &T) -> Result<Mapping> {
    match serde_yaml::to_value(value) {
        Ok(Value::Mapping(mapping)) => Ok(mapping),
        Ok(_) => Err(ContexteError::SchemaInvalid(
            "front matter must serialize to a mapping".to_string(),
        )),
        Err(error) => Err(ContexteError::SchemaInvalid(error.to_string())),
    }
}

/// Render a mapping as front matter lines (fences not included). One key per line, sequences
/// as dash items indented by two spaces. Output is byte-stable for equal input.
pub fn serialize(mapping: &Mapping) -> Result<String> {
    let mut output = String::new();
    for (key, value) in mapping {
        let key = encode_scalar(key)?;
        match value {
            Value::Sequence(items) if items.is_empty() => {
                output.push_str(&format!("{key}: []\n"));
            }
            Value::Mapping(entries) if entries.is_empty() => {
                output.push_str(&format!("{key}: {{}}\n"));
            }
            Value::Sequence(items) if items.iter().all(is_scalar) => {
                output.push_str(&format!("{key}:\n"));
                for item in items {
                    output.push_str(&format!("  - {}\n", encode_scalar(item)?));
                }
            }
            Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => {
                output.push_str(&format!("{key}:\n"));
                for line in encode_yaml(value)?.lines() {
                    output.push_str("  ");
                    output.push_str(line);
                    output.push('\n');
                }
            }
            scalar => {
                output.push_str(&format!("{key}: {}\n", encode_scalar(scalar)?));
            }
        }
    }
    Ok(output)
}

fn is_scalar(value: &Value) -> bool {
    matches!(
        value,
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

fn encode_yaml(value: &Value) -> Result<String> {
    serde_yaml::to_string(value)
        .map_err(|error| ContexteError::SchemaInvalid(format!("cannot encode value: {error}")))
}

// Multi-line strings come out of serde_yaml as block scalars; a JSON string is a valid
// single-line YAML double-quoted scalar.
fn encode_scalar(value: &Value) -> Result<String> {
    let encoded = encode_yaml(value)?;
    let encoded = encoded.trim_end_matches('\n');
    if encoded.contains('\n') {
        return serde_json::to_string(value)
            .map_err(|error| ContexteError::SchemaInvalid(format!("cannot encode value: {error}")));
    }
    Ok(encoded.to_string())
}

/// Full front matter block including both fences and the blank line before the body.
pub fn render_block(mapping: &Mapping) -> Result<String> {
    Ok(format!("{FENCE}\n{}{FENCE}\n\n", serialize(mapping)?))
}

fn is_fence(line: &str) -> bool {
    line.trim_end() == FENCE
}

struct Line<'a> {
    start: usize,
    content: &'a str,
    terminated: bool,
}

/// Walks lines while tracking the byte offset just past the last line returned.
struct LineCursor<'a> {
    text: &'a str,
    offset: usize,
}

impl<'a> LineCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, offset: 0 }
    }
}

impl<'a> Iterator for LineCursor<'a> {
    type Item = Line<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.text.len() {
            return None;
        }
        let start = self.offset;
        let rest = &self.text[start..];
        let (content, consumed, terminated) = match rest.find('\n') {
            Some(index) => (&rest[..index], index + 1, true),
            None => (rest, rest.len(), false),
        };
        self.offset += consumed;
        Some(Line {
            start,
            content: content.strip_suffix('\r').unwrap_or(content),
            terminated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = "---\naliases:\n  - Session 2023-03-15 aux Champs\ncity: Paris\nwings:\n  - A\n  - B\nsets: 10\n---\n\n### Contexte\n### Objectifs\n";

    #[test]
    fn split_extracts_block_and_body() {
        let document = split_document("---\ntitle: Test\n---\nThis is a test file.")
            .expect("split document");
        assert_eq!(document.front_matter, "title: Test");
        assert_eq!(document.body, "This is a test file.");
    }

    #[test]
    fn strip_consumes_exactly_one_blank_line() {
        assert_eq!(
            strip_front_matter("---\na: 1\n---\n\nBody").expect("strip"),
            "Body"
        );
        assert_eq!(
            strip_front_matter("---\na: 1\n---\n\n\nBody").expect("strip"),
            "\nBody"
        );
        assert_eq!(strip_front_matter("---\na: 1\n---\n").expect("strip"), "");
        assert_eq!(strip_front_matter("---\na: 1\n---").expect("strip"), "");
    }

    #[test]
    fn split_handles_crlf_and_bom() {
        let document =
            split_document("\u{feff}---\r\ncity: Paris\r\n---\r\n\r\nBody\r\n").expect("split");
        assert_eq!(document.front_matter, "city: Paris");
        assert_eq!(document.body, "Body\r\n");
    }

    #[test]
    fn missing_fences_are_reported() {
        assert!(matches!(
            split_document("This is a test file."),
            Err(ContexteError::FrontMatterMissing)
        ));
        assert!(matches!(
            split_document("---\ncity: Paris\nno closing fence"),
            Err(ContexteError::FrontMatterMissing)
        ));
        assert!(matches!(
            split_document("intro\n---\ncity: Paris\n---\n"),
            Err(ContexteError::FrontMatterMissing)
        ));
    }

    #[test]
    fn parse_reads_schema_fields() {
        let front_matter = parse(DOCUMENT).expect("parse");
        assert_eq!(front_matter.aliases, vec!["Session 2023-03-15 aux Champs"]);
        assert_eq!(front_matter.city, "Paris");
        assert_eq!(
            front_matter.wings,
            Some(vec!["A".to_string(), "B".to_string()])
        );
        assert_eq!(front_matter.sets, Some(Number::from(10)));
        assert_eq!(front_matter.propals, None);
        assert!(front_matter.extra.is_empty());
    }

    #[test]
    fn decode_keeps_unknown_keys_in_order() {
        let front_matter =
            decode("title: Test\naliases: [alias1, alias2]\ncity: Paris\ntags: [a, b]")
                .expect("decode");
        assert_eq!(front_matter.aliases, vec!["alias1", "alias2"]);
        let keys: Vec<&str> = front_matter
            .extra
            .keys()
            .filter_map(Value::as_str)
            .collect();
        assert_eq!(keys, vec!["title", "tags"]);
    }

    #[test]
    fn decode_rejects_missing_city() {
        let error = decode("aliases: [Session]").expect_err("must fail");
        assert!(matches!(error, ContexteError::SchemaInvalid(_)));
        assert!(error.to_string().contains("city"));
    }

    #[test]
    fn decode_rejects_missing_or_empty_aliases() {
        assert!(matches!(
            decode("title: Test"),
            Err(ContexteError::SchemaInvalid(_))
        ));
        assert!(matches!(
            decode("aliases: []\ncity: Paris"),
            Err(ContexteError::SchemaInvalid(_))
        ));
        assert!(matches!(
            decode("aliases: Session\ncity: Paris"),
            Err(ContexteError::SchemaInvalid(_))
        ));
    }

    #[test]
    fn decode_rejects_non_numeric_counter() {
        let error = decode("aliases: [S]\ncity: Paris\nsets: beaucoup").expect_err("must fail");
        assert!(error.to_string().contains("sets"));
        assert!(matches!(
            decode("aliases: [S]\ncity: Paris\nclose: [1]"),
            Err(ContexteError::SchemaInvalid(_))
        ));
    }

    #[test]
    fn decode_accepts_any_number_as_counter() {
        let front_matter = decode("aliases: [S]\ncity: Paris\nsets: 10.0\npropals: 2.5\nclose: -2")
            .expect("decode");
        assert_eq!(front_matter.sets, Some(Number::from(10.0)));
        assert_eq!(front_matter.propals, Some(Number::from(2.5)));
        assert_eq!(front_matter.close, Some(Number::from(-2)));
    }

    #[test]
    fn decode_treats_null_optional_fields_as_absent() {
        let front_matter = decode("aliases: [S]\ncity: Paris\nsets:\nwings:").expect("decode");
        assert_eq!(front_matter.sets, None);
        assert_eq!(front_matter.wings, None);
    }

    #[test]
    fn decode_validates_date_field() {
        assert!(decode("aliases: [S]\ncity: Paris\ndate: '2023-03-15'").is_ok());
        assert!(decode("aliases: [S]\ncity: Paris\ndate: 15/03/2023").is_ok());
        assert!(matches!(
            decode("aliases: [S]\ncity: Paris\ndate: demain"),
            Err(ContexteError::SchemaInvalid(_))
        ));
    }

    #[test]
    fn decode_drops_previous_description() {
        let front_matter =
            decode("aliases: [S]\ncity: Paris\ndescription: Session à Paris").expect("decode");
        assert!(front_matter.extra.is_empty());
    }

    #[test]
    fn decode_reports_malformed_yaml_and_non_mapping() {
        assert!(matches!(
            decode("aliases: [unclosed"),
            Err(ContexteError::SchemaInvalid(_))
        ));
        assert!(matches!(
            decode("- just\n- a list"),
            Err(ContexteError::SchemaInvalid(_))
        ));
        assert!(matches!(decode(""), Err(ContexteError::SchemaInvalid(_))));
    }

    #[test]
    fn serialize_indents_sequences_and_quotes_scalars() {
        let mut mapping = Mapping::new();
        mapping.insert(
            Value::from("aliases"),
            Value::Sequence(vec![Value::from("Session 2023-03-15")]),
        );
        mapping.insert(Value::from("city"), Value::from("Paris"));
        mapping.insert(Value::from("wings"), Value::Sequence(Vec::new()));
        mapping.insert(Value::from("sets"), Value::from(10u64));
        mapping.insert(Value::from("date"), Value::from(""));
        mapping.insert(Value::from("note"), Value::from("deux\nlignes"));

        let rendered = serialize(&mapping).expect("serialize");
        assert_eq!(
            rendered,
            "aliases:\n  - Session 2023-03-15\ncity: Paris\nwings: []\nsets: 10\ndate: ''\nnote: \"deux\\nlignes\"\n"
        );
    }

    #[test]
    fn serialize_nests_complex_values() {
        let mapping = decode("aliases: [S]\ncity: Paris\nmeta:\n  lieu: Louvre\n  notes: [x, y]")
            .expect("decode")
            .to_mapping()
            .expect("mapping");
        let rendered = serialize(&mapping).expect("serialize");
        assert!(rendered.contains("meta:\n  lieu: Louvre\n"));

        let reparsed = decode(&rendered).expect("decode rendered");
        let meta: Mapping = mapping
            .iter()
            .filter(|(key, _)| key.as_str() == Some("meta"))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        assert_eq!(reparsed.extra, meta);
    }

    #[test]
    fn serialize_round_trips_parsed_front_matter() {
        let source = "---\ntitle: \"Séance: bilan\"\naliases:\n  - Session 2023-03-15 aux Champs\ncity: Paris\nwings: [A, B]\nsets: 10\nclose: 2\ndate: '2023-03-15'\ntags: [terrain]\n---\n\nBody";
        let parsed = parse(source).expect("parse");
        let block = render_block(&parsed.to_mapping().expect("mapping")).expect("render");

        let reparsed = parse(&format!("{block}Body")).expect("reparse");
        assert_eq!(reparsed, parsed);
        assert_eq!(strip_front_matter(&format!("{block}Body")).expect("strip"), "Body");
    }

    #[test]
    fn serialize_is_byte_stable() {
        let parsed = parse(DOCUMENT).expect("parse");
        let mapping = parsed.to_mapping().expect("mapping");
        let first = serialize(&mapping).expect("serialize");
        let second = serialize(&decode(&first).expect("decode").to_mapping().expect("mapping"))
            .expect("serialize");
        assert_eq!(first, second);
    }

    #[test]
    fn schema_table_lists_required_fields() {
        let required: Vec<&str> = SCHEMA
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.name)
            .collect();
        assert_eq!(required, vec!["aliases", "city"]);
    }
}
