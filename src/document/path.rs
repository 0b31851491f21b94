// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Paths into a result document tree

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// One step of a document path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Location of a node inside a document, e.g. `shapes.Cube.volume` or
/// `objects.Box.solids[0].metrics.volume_mm3`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath {
    segments: Vec<PathSegment>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid document path `{0}`")]
pub struct InvalidPath(pub String);

impl DocPath {
    /// The empty path (the document root)
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    pub fn child_key(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Key(key.to_string()));
        Self { segments }
    }

    pub fn child_index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        Self { segments }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Slash-joined form used when matching tolerance override globs,
    /// e.g. `objects/Box/solids/0/metrics/volume_mm3`.
    ///
    /// A `/` inside a key is written as `%2F` (and `%` as `%25`) so that a
    /// key never reads as two levels; an override for object `A/B` is
    /// written `objects/A%2FB/...`.
    pub fn to_glob_subject(&self) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                PathSegment::Key(key) => key.replace('%', "%25").replace('/', "%2F"),
                PathSegment::Index(index) => index.to_string(),
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Characters that need a backslash inside a key in the dotted form
fn needs_escape(c: char) -> bool {
    matches!(c, '\\' | '.' | '[' | ']')
}

fn write_key(f: &mut fmt::Formatter<'_>, key: &str) -> fmt::Result {
    for c in key.chars() {
        if needs_escape(c) {
            write!(f, "\\")?;
        }
        write!(f, "{}", c)?;
    }
    Ok(())
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "$");
        }
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Key(key) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write_key(f, key)?;
                }
                PathSegment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Token {
    Start,
    Dot,
    Key,
    Index,
}

impl FromStr for DocPath {
    type Err = InvalidPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "$" || s.is_empty() {
            return Ok(Self::root());
        }

        let invalid = || InvalidPath(s.to_string());
        let mut segments = Vec::new();
        let mut key = String::new();
        let mut last = Token::Start;
        let mut chars = s.chars();

        let flush = |key: &mut String, segments: &mut Vec<PathSegment>| {
            if !key.is_empty() {
                segments.push(PathSegment::Key(std::mem::take(key)));
            }
        };

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if matches!(last, Token::Start | Token::Dot) {
                        return Err(invalid());
                    }
                    flush(&mut key, &mut segments);
                    last = Token::Dot;
                }
                '[' => {
                    flush(&mut key, &mut segments);
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) => digits.push(d),
                            None => return Err(invalid()),
                        }
                    }
                    let index = digits.parse::<usize>().map_err(|_| invalid())?;
                    segments.push(PathSegment::Index(index));
                    last = Token::Index;
                }
                ']' => return Err(invalid()),
                _ => {
                    if last == Token::Index {
                        return Err(invalid());
                    }
                    let c = if c == '\\' { chars.next().ok_or_else(invalid)? } else { c };
                    key.push(c);
                    last = Token::Key;
                }
            }
        }

        if last == Token::Dot {
            return Err(invalid());
        }
        flush(&mut key, &mut segments);
        Ok(Self { segments })
    }
}

impl Serialize for DocPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DocPath {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keys_and_indices() {
        let path = DocPath::root()
            .child_key("objects")
            .child_key("Box")
            .child_key("solids")
            .child_index(0)
            .child_key("volume_mm3");
        assert_eq!(path.to_string(), "objects.Box.solids[0].volume_mm3");
        assert_eq!(path.to_glob_subject(), "objects/Box/solids/0/volume_mm3");
    }

    #[test]
    fn test_root_display() {
        assert_eq!(DocPath::root().to_string(), "$");
        assert!(DocPath::root().is_root());
    }

    #[test]
    fn test_parse_display_form() {
        let path: DocPath = "shapes.Cube.vertices[3][1]".parse().unwrap();
        assert_eq!(
            path.segments(),
            &[
                PathSegment::Key("shapes".into()),
                PathSegment::Key("Cube".into()),
                PathSegment::Key("vertices".into()),
                PathSegment::Index(3),
                PathSegment::Index(1),
            ]
        );
        assert_eq!(path.to_string(), "shapes.Cube.vertices[3][1]");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("a[x]".parse::<DocPath>().is_err());
        assert!("a[1".parse::<DocPath>().is_err());
        assert!("a..b".parse::<DocPath>().is_err());
        assert!("a.".parse::<DocPath>().is_err());
        assert!("a[0]b".parse::<DocPath>().is_err());
    }

    #[test]
    fn test_keys_with_separators_stay_one_segment() {
        let path = DocPath::root()
            .child_key("objects")
            .child_key("A/B")
            .child_key("v1.2[x]")
            .child_index(0);
        assert_eq!(path.to_string(), r"objects.A/B.v1\.2\[x\][0]");
        assert_eq!(path.to_glob_subject(), "objects/A%2FB/v1.2[x]/0");

        let back: DocPath = path.to_string().parse().unwrap();
        assert_eq!(back, path);
        assert_eq!(back.len(), 4);

        let nested = DocPath::root().child_key("objects").child_key("A").child_key("B");
        assert_ne!(nested.to_glob_subject(), path.to_glob_subject());
    }

    #[test]
    fn test_serde_as_string() {
        let path = DocPath::root().child_key("shapes").child_index(2);
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"shapes[2]\"");
        let back: DocPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
    }
}
