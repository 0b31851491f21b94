// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Typed values held by a result document

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::path::PathSegment;

/// Leaf value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

/// A node of the document tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Scalar(Scalar),
    Sequence(Vec<Node>),
    Map(BTreeMap<String, Node>),
}

/// Kind of a node, used in diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Integer,
    Float,
    Bool,
    Text,
    Sequence,
    Map,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Bool => "boolean",
            ValueKind::Text => "string",
            ValueKind::Sequence => "sequence",
            ValueKind::Map => "mapping",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Scalar {
    pub fn kind(&self) -> ValueKind {
        match self {
            Scalar::Integer(_) => ValueKind::Integer,
            Scalar::Float(_) => ValueKind::Float,
            Scalar::Bool(_) => ValueKind::Bool,
            Scalar::Text(_) => ValueKind::Text,
        }
    }

    /// Numeric view of integers and floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Float(x) => Some(*x),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{:?}", x),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl Node {
    pub fn kind(&self) -> ValueKind {
        match self {
            Node::Scalar(scalar) => scalar.kind(),
            Node::Sequence(_) => ValueKind::Sequence,
            Node::Map(_) => ValueKind::Map,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Node::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Step one segment down the tree
    pub fn child(&self, segment: &PathSegment) -> Option<&Node> {
        match (self, segment) {
            (Node::Map(map), PathSegment::Key(key)) => map.get(key),
            (Node::Sequence(items), PathSegment::Index(index)) => items.get(*index),
            _ => None,
        }
    }

    /// Number of scalar leaves below (and including) this node
    pub fn leaf_count(&self) -> usize {
        match self {
            Node::Scalar(_) => 1,
            Node::Sequence(items) => items.iter().map(Node::leaf_count).sum(),
            Node::Map(map) => map.values().map(Node::leaf_count).sum(),
        }
    }
}

impl From<Scalar> for Node {
    fn from(scalar: Scalar) -> Self {
        Node::Scalar(scalar)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Scalar(scalar) => write!(f, "{}", scalar),
            Node::Sequence(items)
                if items.len() <= 4 && items.iter().all(|n| n.as_scalar().is_some()) =>
            {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Node::Sequence(items) => write!(f, "<sequence of {}>", items.len()),
            Node::Map(map) => write!(f, "<mapping with {} keys>", map.len()),
        }
    }
}
