// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Fixture discovery and baseline pairing

use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::catalog::Catalog;
use super::error::HarnessError;
use super::types::TestCase;

/// Baseline file extension
pub const BASELINE_EXTENSION: &str = "json";

/// Fixture discovery system
#[derive(Debug, Clone)]
pub struct FixtureDiscovery {
    fixture_dir: PathBuf,
    baseline_dir: PathBuf,
    extension: String,
    recursive: bool,
}

impl FixtureDiscovery {
    pub fn new(fixture_dir: impl Into<PathBuf>, baseline_dir: impl Into<PathBuf>) -> Self {
        Self {
            fixture_dir: fixture_dir.into(),
            baseline_dir: baseline_dir.into(),
            extension: "FCStd".to_string(),
            recursive: false,
        }
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn fixture_dir(&self) -> &Path {
        &self.fixture_dir
    }

    /// `<baseline_dir>/<rel>/<stem>.json` for fixture `<fixture_dir>/<rel>/<stem>.<ext>`
    pub fn baseline_for(&self, relative: &Path) -> PathBuf {
        self.baseline_dir.join(relative.with_extension(BASELINE_EXTENSION))
    }

    /// Discover every fixture and pair it with its baseline, sorted by name
    pub fn discover(&self, catalog: &Catalog) -> Result<Vec<TestCase>, HarnessError> {
        if !self.fixture_dir.is_dir() {
            return Err(HarnessError::MissingDirectory {
                what: "fixture directory",
                path: self.fixture_dir.clone(),
            });
        }
        if !self.baseline_dir.is_dir() {
            return Err(HarnessError::MissingDirectory {
                what: "baseline directory",
                path: self.baseline_dir.clone(),
            });
        }

        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut cases = Vec::new();

        for entry in WalkDir::new(&self.fixture_dir)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(error = %err, "skipping unreadable directory entry");
                    None
                }
            })
            .filter(|e| e.file_type().is_file())
            .filter(|e| self.has_fixture_extension(e.path()))
        {
            let fixture = entry.path().to_path_buf();
            let relative = match fixture.strip_prefix(&self.fixture_dir) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => continue,
            };
            let name = case_name(&relative);
            let expected_baseline = self.baseline_for(&relative);
            let baseline = expected_baseline.is_file().then(|| expected_baseline.clone());

            debug!(case = %name, baseline = ?baseline, "discovered fixture");
            cases.push(TestCase {
                catalog: catalog.get(&name).cloned(),
                name,
                fixture,
                baseline,
                expected_baseline,
            });
        }

        if cases.is_empty() {
            return Err(HarnessError::NoFixtures {
                dir: self.fixture_dir.clone(),
                extension: self.extension.clone(),
            });
        }

        cases.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(cases)
    }

    fn has_fixture_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}

/// Case name: path relative to the fixture directory joined with `/`
pub fn case_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Keep cases whose name contains any of `filters` (all when empty)
pub fn apply_filters(cases: Vec<TestCase>, filters: &[String]) -> Vec<TestCase> {
    if filters.is_empty() {
        return cases;
    }
    cases
        .into_iter()
        .filter(|case| filters.iter().any(|f| case.name.contains(f.as_str())))
        .collect()
}
