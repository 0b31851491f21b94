// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Result document model
//!
//! A [`Document`] is the canonical description of one design file as emitted
//! by the extraction macro (or stored as a baseline). It is a tree of
//! mappings and sequences with typed scalar leaves, tagged with a schema
//! version. Documents are immutable once parsed.

pub mod parser;
pub mod path;
pub mod value;

pub use parser::{
    parse, JsonKind, ParseError, ParseErrorKind, SCHEMA_FIELD, SUPPORTED_SCHEMA_VERSIONS,
};
pub use path::{DocPath, InvalidPath, PathSegment};
pub use value::{Node, Scalar, ValueKind};

use serde::Serialize;
use std::collections::BTreeMap;

/// Parsed extraction result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    schema: u32,
    entries: BTreeMap<String, Node>,
}

impl Document {
    /// Parse and validate raw extraction output
    pub fn parse(raw: &[u8]) -> Result<Self, ParseError> {
        parser::parse(raw)
    }

    pub(crate) fn from_parts(schema: u32, entries: BTreeMap<String, Node>) -> Self {
        Self { schema, entries }
    }

    pub fn schema_version(&self) -> u32 {
        self.schema
    }

    /// Top-level entries (the schema tag is not included)
    pub fn entries(&self) -> &BTreeMap<String, Node> {
        &self.entries
    }

    /// Look up the node at `path`; the root path has no node of its own
    pub fn get(&self, path: &DocPath) -> Option<&Node> {
        let (first, rest) = path.segments().split_first()?;
        let PathSegment::Key(key) = first else {
            return None;
        };
        rest.iter()
            .try_fold(self.entries.get(key)?, |node, segment| node.child(segment))
    }

    pub fn leaf_count(&self) -> usize {
        self.entries.values().map(Node::leaf_count).sum()
    }

    /// Documents are only comparable when produced by the same schema
    pub fn is_comparable_with(&self, other: &Document) -> bool {
        self.schema == other.schema
    }
}
