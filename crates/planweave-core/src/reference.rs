//! Placeholder grammar
//!
//! Arguments in plan text may embed references to outputs of earlier nodes
//! with the syntax `__&<id>.<field>__`, optionally carrying one bracketed
//! accessor: `__&1.items[0]__` or `__&1.counts["key"]__`. This module
//! recognizes that syntax, blanks it so unresolved text stays structurally
//! parseable, and substitutes concrete values once a source node has run.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::GraphError;
use crate::NodeId;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"__&(\d+)\.(\w+)(?:\[(\d+|"[^"]*")\])?__"#).expect("placeholder pattern is valid")
});

/// One bracketed accessor inside a reference path. At most one level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// Integer index into an ordered sequence field.
    Index(usize),
    /// String key into a mapping field.
    Key(String),
}

/// A recognized occurrence of an output reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataReference {
    /// Id of the node whose output is referenced.
    pub source: NodeId,
    /// Output field name.
    pub field: String,
    /// Optional single accessor into the field.
    pub accessor: Option<Accessor>,
    /// Character span of the whole occurrence in the scanned text.
    pub span: (usize, usize),
}

/// Find every reference occurrence in `text`, with spans. The union of
/// `source` ids over the result is the text's prerequisite set.
pub fn scan(text: &str) -> Vec<DataReference> {
    PLACEHOLDER
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0).expect("group 0 is the whole match");
            let source: NodeId = match caps[1].parse() {
                Ok(id) => id,
                Err(_) => {
                    debug!(raw = %whole.as_str(), "reference id out of range, skipping");
                    return None;
                }
            };
            let accessor = match caps.get(3) {
                None => None,
                Some(m) => {
                    let raw = m.as_str();
                    if let Some(key) = raw.strip_prefix('"') {
                        Some(Accessor::Key(
                            key.strip_suffix('"').unwrap_or(key).to_string(),
                        ))
                    } else {
                        match raw.parse::<usize>() {
                            Ok(index) => Some(Accessor::Index(index)),
                            Err(_) => {
                                debug!(raw = %whole.as_str(), "reference index out of range, skipping");
                                return None;
                            }
                        }
                    }
                }
            };
            Some(DataReference {
                source,
                field: caps[2].to_string(),
                accessor,
                span: (whole.start(), whole.end()),
            })
        })
        .collect()
}

/// Replace every reference occurrence with a JSON `null` literal so the
/// text can be structurally decoded before any results exist.
pub fn blank(text: &str) -> String {
    PLACEHOLDER.replace_all(text, "null").into_owned()
}

/// Replace every occurrence bound to `source` with the string form of its
/// resolved value, escaped so the surrounding text stays JSON-embeddable.
/// Occurrences bound to other ids are left untouched, so applying this once
/// per prerequisite fully resolves a line — and re-applying it for the same
/// source is a no-op.
pub fn substitute(
    text: &str,
    source: NodeId,
    output: &Map<String, Value>,
) -> Result<String, GraphError> {
    let mut resolved = String::with_capacity(text.len());
    let mut cursor = 0;
    for reference in scan(text) {
        if reference.source != source {
            continue;
        }
        let value = resolve(&reference, output)?;
        resolved.push_str(&text[cursor..reference.span.0]);
        resolved.push_str(&escape_embedded(&value_text(&value)));
        cursor = reference.span.1;
    }
    resolved.push_str(&text[cursor..]);
    Ok(resolved)
}

/// Look a reference up in its source node's output mapping.
pub fn resolve(
    reference: &DataReference,
    output: &Map<String, Value>,
) -> Result<Value, GraphError> {
    let value = output.get(&reference.field).ok_or_else(|| {
        GraphError::Lookup(format!(
            "node {} produced no field '{}'",
            reference.source, reference.field
        ))
    })?;
    match &reference.accessor {
        None => Ok(value.clone()),
        Some(Accessor::Index(index)) => match value {
            Value::Array(items) => items.get(*index).cloned().ok_or_else(|| {
                GraphError::Lookup(format!(
                    "index {} out of range for field '{}' of node {} (length {})",
                    index,
                    reference.field,
                    reference.source,
                    items.len()
                ))
            }),
            other => Err(GraphError::Lookup(format!(
                "field '{}' of node {} is {} and cannot be indexed by position",
                reference.field,
                reference.source,
                json_type(other)
            ))),
        },
        Some(Accessor::Key(key)) => match value {
            Value::Object(map) => map.get(key).cloned().ok_or_else(|| {
                GraphError::Lookup(format!(
                    "field '{}' of node {} has no key \"{}\"",
                    reference.field, reference.source, key
                ))
            }),
            other => Err(GraphError::Lookup(format!(
                "field '{}' of node {} is {} and cannot be indexed by key",
                reference.field,
                reference.source,
                json_type(other)
            ))),
        },
    }
}

/// Literal text injected for a resolved value: strings verbatim, everything
/// else as compact JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Escape text for embedding inside a JSON string body. Decoding the
/// surrounding line restores the literal text, so [`unescape_embedded`] is
/// the inverse for callers working on raw text.
pub fn escape_embedded(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Inverse of [`escape_embedded`].
pub fn unescape_embedded(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            unescaped.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => unescaped.push('\\'),
            Some('"') => unescaped.push('"'),
            Some('n') => unescaped.push('\n'),
            Some('r') => unescaped.push('\r'),
            Some('t') => unescaped.push('\t'),
            Some(other) => {
                unescaped.push('\\');
                unescaped.push(other);
            }
            None => unescaped.push('\\'),
        }
    }
    unescaped
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn output(value: Value) -> Map<String, Value> {
        value.as_object().expect("test output is an object").clone()
    }

    #[test]
    fn test_scan_finds_references_with_spans() {
        let text = r#"{"a": "__&1.thought__", "b": "__&2.items[0]__"}"#;
        let refs = scan(text);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].source, 1);
        assert_eq!(refs[0].field, "thought");
        assert_eq!(refs[0].accessor, None);
        assert_eq!(&text[refs[0].span.0..refs[0].span.1], "__&1.thought__");
        assert_eq!(refs[1].source, 2);
        assert_eq!(refs[1].accessor, Some(Accessor::Index(0)));
    }

    #[test]
    fn test_scan_recognizes_quoted_key_accessor() {
        let refs = scan(r#"__&3.counts["a b"]__"#);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].accessor, Some(Accessor::Key("a b".to_string())));
    }

    #[test]
    fn test_scan_ignores_slice_syntax() {
        // Only single integer/string accessors are part of the grammar.
        assert!(scan("__&1.items[0:2]__").is_empty());
    }

    #[test]
    fn test_blank_replaces_every_reference_with_null() {
        let text = r#"[2, "ECHO", {"content": "__&1.thought__"}, []]"#;
        let blanked = blank(text);
        // Only the match itself is replaced; surrounding quotes stay.
        assert_eq!(blanked, r#"[2, "ECHO", {"content": "null"}, []]"#);
        assert!(serde_json::from_str::<Value>(&blanked).is_ok());
    }

    #[test]
    fn test_substitute_injects_string_verbatim() {
        let out = output(json!({"thought": "Lenz's Law"}));
        let resolved = substitute(r#""about __&1.thought__""#, 1, &out).unwrap();
        assert_eq!(resolved, r#""about Lenz's Law""#);
    }

    #[test]
    fn test_substitute_escapes_quotes_and_newlines() {
        let out = output(json!({"thought": "He said \"hi\"\nBye"}));
        let resolved = substitute(r#"{"content": "__&1.thought__"}"#, 1, &out).unwrap();
        let decoded: Value = serde_json::from_str(&resolved).expect("stays decodable");
        assert_eq!(decoded["content"], json!("He said \"hi\"\nBye"));
    }

    #[test]
    fn test_substitute_is_idempotent_per_source() {
        let out = output(json!({"items": ["a", "b", "c"]}));
        let once = substitute(r#""__&1.items[1]__""#, 1, &out).unwrap();
        let twice = substitute(&once, 1, &out).unwrap();
        assert_eq!(once, r#""b""#);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_substitute_leaves_other_sources_untouched() {
        let out = output(json!({"x": 1}));
        let text = r#"[__&1.x__, __&2.y__]"#;
        assert_eq!(substitute(text, 1, &out).unwrap(), r#"[1, __&2.y__]"#);
    }

    #[test]
    fn test_resolve_index_out_of_range_is_lookup_error() {
        let out = output(json!({"items": ["a"]}));
        let err = substitute(r#""__&1.items[5]__""#, 1, &out).unwrap_err();
        assert!(matches!(err, GraphError::Lookup(_)));
    }

    #[test]
    fn test_resolve_rejects_indexing_a_scalar() {
        let out = output(json!({"n": 42}));
        let err = substitute(r#""__&1.n[0]__""#, 1, &out).unwrap_err();
        assert!(matches!(err, GraphError::Lookup(_)));
    }

    #[test]
    fn test_resolve_missing_field_is_lookup_error() {
        let out = output(json!({"other": 1}));
        let err = substitute(r#""__&1.thought__""#, 1, &out).unwrap_err();
        assert!(matches!(err, GraphError::Lookup(_)));
    }

    #[test]
    fn test_escape_round_trips() {
        let text = "line1\nline2\t\"quoted\" \\ end";
        assert_eq!(unescape_embedded(&escape_embedded(text)), text);
    }

    #[test]
    fn test_non_string_values_inject_as_compact_json() {
        let out = output(json!({"result": 1, "items": [1, 2]}));
        assert_eq!(substitute("__&1.result__", 1, &out).unwrap(), "1");
        assert_eq!(substitute("__&1.items__", 1, &out).unwrap(), "[1,2]");
    }
}
