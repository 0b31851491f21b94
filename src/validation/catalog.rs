// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Fixture catalog
//!
//! Optional `catalog.toml` describing where each fixture came from:
//!
//! ```toml
//! [[fixture]]
//! file = "brackets/l_bracket.FCStd"
//! title = "L bracket with fillets"
//! date_added = "2024-03-18"
//! app_version = "0.21.2"
//! notes = "Fillet radius drives the volume check"
//! ```
//!
//! Catalog data is carried into reports and never affects verdicts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default catalog file name inside the fixture directory
pub const CATALOG_FILE: &str = "catalog.toml";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("cannot read catalog `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed catalog `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("catalog `{path}` lists `{file}` more than once")]
    Duplicate { path: PathBuf, file: String },
    #[error("catalog `{path}`: `{file}` has date_added `{value}`, expected YYYY-MM-DD")]
    InvalidDate {
        path: PathBuf,
        file: String,
        value: String,
    },
}

/// Metadata for one fixture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogEntry {
    /// Fixture path relative to the fixture directory, `/`-separated
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    #[serde(default, rename = "fixture")]
    fixtures: Vec<CatalogEntry>,
}

/// Fixture catalog keyed by case name
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<String, CatalogEntry>,
    source: Option<PathBuf>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load an explicit catalog file
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Load `catalog.toml` from the fixture directory if present
    pub fn load_default(fixture_dir: &Path) -> Result<Self, CatalogError> {
        let path = fixture_dir.join(CATALOG_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::empty())
        }
    }

    pub fn from_toml_str(raw: &str, source: &Path) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(raw).map_err(|e| CatalogError::Parse {
            path: source.to_path_buf(),
            source: e,
        })?;

        let mut entries = BTreeMap::new();
        for mut entry in file.fixtures {
            entry.file = normalize(&entry.file);
            if let Some(date) = &entry.date_added {
                if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
                    return Err(CatalogError::InvalidDate {
                        path: source.to_path_buf(),
                        file: entry.file,
                        value: date.clone(),
                    });
                }
            }
            if entries.contains_key(&entry.file) {
                return Err(CatalogError::Duplicate {
                    path: source.to_path_buf(),
                    file: entry.file,
                });
            }
            entries.insert(entry.file.clone(), entry);
        }

        Ok(Self {
            entries,
            source: Some(source.to_path_buf()),
        })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Catalog entries that name no discovered fixture
    pub fn unmatched<'a, I>(&'a self, names: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let known: std::collections::BTreeSet<&str> = names.into_iter().collect();
        self.entries
            .keys()
            .map(String::as_str)
            .filter(|file| !known.contains(file))
            .collect()
    }
}

fn normalize(file: &str) -> String {
    let file = file.replace('\\', "/");
    file.trim_start_matches("./").to_string()
}
