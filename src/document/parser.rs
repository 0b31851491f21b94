// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Strict parser for extraction result documents
//!
//! Output of the extraction macro is JSON. Everything is validated up front:
//! the top level must be a mapping, the `schema` tag must name a supported
//! version and every value must map onto [`Node`]. Nothing is coerced.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use super::path::DocPath;
use super::value::{Node, Scalar};
use super::Document;

/// Name of the top-level schema tag
pub const SCHEMA_FIELD: &str = "schema";

/// Schema versions this harness knows how to compare
pub const SUPPORTED_SCHEMA_VERSIONS: &[u32] = &[1];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Document failed validation at `path`
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind} (at `{path}`)")]
pub struct ParseError {
    pub path: DocPath,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseErrorKind {
    #[error("document is empty")]
    Empty,
    #[error("malformed JSON at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("top-level value must be a mapping, found {found}")]
    NotAMapping { found: JsonKind },
    #[error("missing schema tag `schema`")]
    MissingSchema,
    #[error("schema tag must be a non-negative integer, found {found}")]
    InvalidSchemaTag { found: JsonKind },
    #[error("unsupported schema version {version} (supported: {supported:?})")]
    UnsupportedSchema { version: u64, supported: Vec<u32> },
    #[error("unsupported value: {found}")]
    UnsupportedValue { found: JsonKind },
    #[error("integer {value} does not fit in 64 bits")]
    IntegerOutOfRange { value: String },
}

/// JSON kind names for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl JsonKind {
    fn of(value: &Value) -> Self {
        match value {
            Value::Null => JsonKind::Null,
            Value::Bool(_) => JsonKind::Bool,
            Value::Number(_) => JsonKind::Number,
            Value::String(_) => JsonKind::String,
            Value::Array(_) => JsonKind::Array,
            Value::Object(_) => JsonKind::Object,
        }
    }
}

impl fmt::Display for JsonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JsonKind::Null => "null",
            JsonKind::Bool => "boolean",
            JsonKind::Number => "number",
            JsonKind::String => "string",
            JsonKind::Array => "array",
            JsonKind::Object => "object",
        };
        f.write_str(name)
    }
}

impl ParseError {
    fn at(path: DocPath, kind: ParseErrorKind) -> Self {
        Self { path, kind }
    }
}

/// Parse raw extraction output into a validated [`Document`]
pub fn parse(raw: &[u8]) -> Result<Document, ParseError> {
    let raw = raw.strip_prefix(UTF8_BOM).unwrap_or(raw);
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::at(DocPath::root(), ParseErrorKind::Empty));
    }

    let value: Value = serde_json::from_slice(raw).map_err(|e| {
        ParseError::at(
            DocPath::root(),
            ParseErrorKind::Syntax {
                line: e.line(),
                column: e.column(),
                message: e.to_string(),
            },
        )
    })?;

    let Value::Object(object) = value else {
        return Err(ParseError::at(
            DocPath::root(),
            ParseErrorKind::NotAMapping {
                found: JsonKind::of(&value),
            },
        ));
    };

    let schema_path = DocPath::root().child_key(SCHEMA_FIELD);
    let schema = match object.get(SCHEMA_FIELD) {
        None => {
            return Err(ParseError::at(schema_path, ParseErrorKind::MissingSchema));
        }
        Some(Value::Number(n)) if n.is_u64() => n.as_u64().unwrap_or_default(),
        Some(other) => {
            return Err(ParseError::at(
                schema_path,
                ParseErrorKind::InvalidSchemaTag {
                    found: JsonKind::of(other),
                },
            ));
        }
    };

    let version = u32::try_from(schema)
        .ok()
        .filter(|v| SUPPORTED_SCHEMA_VERSIONS.contains(v))
        .ok_or_else(|| {
            ParseError::at(
                schema_path.clone(),
                ParseErrorKind::UnsupportedSchema {
                    version: schema,
                    supported: SUPPORTED_SCHEMA_VERSIONS.to_vec(),
                },
            )
        })?;

    let mut entries = BTreeMap::new();
    for (key, value) in &object {
        if key == SCHEMA_FIELD {
            continue;
        }
        let node = convert(&DocPath::root().child_key(key), value)?;
        entries.insert(key.clone(), node);
    }

    Ok(Document::from_parts(version, entries))
}

fn convert(path: &DocPath, value: &Value) -> Result<Node, ParseError> {
    match value {
        Value::Bool(b) => Ok(Node::Scalar(Scalar::Bool(*b))),
        Value::String(s) => Ok(Node::Scalar(Scalar::Text(s.clone()))),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Node::Scalar(Scalar::Integer(i)))
            } else if n.is_u64() {
                Err(ParseError::at(
                    path.clone(),
                    ParseErrorKind::IntegerOutOfRange {
                        value: n.to_string(),
                    },
                ))
            } else {
                n.as_f64()
                    .map(|x| Node::Scalar(Scalar::Float(x)))
                    .ok_or_else(|| {
                        ParseError::at(
                            path.clone(),
                            ParseErrorKind::UnsupportedValue {
                                found: JsonKind::Number,
                            },
                        )
                    })
            }
        }
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| convert(&path.child_index(i), item))
            .collect::<Result<Vec<_>, _>>()
            .map(Node::Sequence),
        Value::Object(object) => object
            .iter()
            .map(|(key, item)| Ok((key.clone(), convert(&path.child_key(key), item)?)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Node::Map),
        Value::Null => Err(ParseError::at(
            path.clone(),
            ParseErrorKind::UnsupportedValue {
                found: JsonKind::Null,
            },
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ValueKind;

    #[test]
    fn test_parse_minimal_document() {
        let doc = parse(br#"{"schema": 1, "shapes": {"Cube": {"volume": 1000.0}}}"#).unwrap();
        assert_eq!(doc.schema_version(), 1);
        let path: DocPath = "shapes.Cube.volume".parse().unwrap();
        assert_eq!(doc.get(&path), Some(&Node::Scalar(Scalar::Float(1000.0))));
        assert!(doc.entries().get(SCHEMA_FIELD).is_none());
    }

    #[test]
    fn test_empty_input() {
        let err = parse(b"  \n\t").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Empty);
        assert!(err.path.is_root());
    }

    #[test]
    fn test_bom_is_ignored() {
        let mut raw = UTF8_BOM.to_vec();
        raw.extend_from_slice(br#"{"schema": 1}"#);
        assert!(parse(&raw).is_ok());
    }

    #[test]
    fn test_syntax_error_reports_position() {
        let err = parse(b"{\"schema\": 1,\n \"a\": }").unwrap_err();
        match err.kind {
            ParseErrorKind::Syntax { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_top_level_must_be_mapping() {
        let err = parse(b"[1, 2, 3]").unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::NotAMapping {
                found: JsonKind::Array
            }
        );
    }

    #[test]
    fn test_schema_tag_rules() {
        let missing = parse(br#"{"shapes": {}}"#).unwrap_err();
        assert_eq!(missing.kind, ParseErrorKind::MissingSchema);
        assert_eq!(missing.path.to_string(), "schema");

        let wrong_type = parse(br#"{"schema": "1"}"#).unwrap_err();
        assert_eq!(
            wrong_type.kind,
            ParseErrorKind::InvalidSchemaTag {
                found: JsonKind::String
            }
        );

        let unknown = parse(br#"{"schema": 7}"#).unwrap_err();
        assert!(matches!(
            unknown.kind,
            ParseErrorKind::UnsupportedSchema { version: 7, .. }
        ));
    }

    #[test]
    fn test_null_rejected_with_path() {
        let err = parse(br#"{"schema": 1, "objects": {"Box": {"solids": [{"volume": null}]}}}"#)
            .unwrap_err();
        assert_eq!(
            err.kind,
            ParseErrorKind::UnsupportedValue {
                found: JsonKind::Null
            }
        );
        assert_eq!(err.path.to_string(), "objects.Box.solids[0].volume");
    }

    #[test]
    fn test_huge_integer_rejected() {
        let err = parse(br#"{"schema": 1, "count": 18446744073709551615}"#).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::IntegerOutOfRange { .. }));
        assert_eq!(err.path.to_string(), "count");
    }

    #[test]
    fn test_integer_and_float_are_distinct() {
        let doc = parse(br#"{"schema": 1, "a": 3, "b": 3.0, "c": [1.0, 2.0]}"#).unwrap();
        assert_eq!(doc.entries()["a"].kind(), ValueKind::Integer);
        assert_eq!(doc.entries()["b"].kind(), ValueKind::Float);
        assert_eq!(doc.entries()["c"].kind(), ValueKind::Sequence);
        assert_eq!(doc.leaf_count(), 4);
    }

    #[test]
    fn test_error_message_mentions_path() {
        let err = parse(br#"{"schema": 1, "x": null}"#).unwrap_err();
        assert_eq!(err.to_string(), "unsupported value: null (at `x`)");
    }
}
