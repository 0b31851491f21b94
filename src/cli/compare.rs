// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Offline comparison of two result documents on disk

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

use super::diff::{ComparisonOutcome, DocumentDiff};
use super::policy::TolerancePolicy;
use crate::document::Document;

/// Load a result document from disk
pub fn load_document(path: &Path) -> Result<Document> {
    let raw = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Document::parse(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Compare a candidate document against a baseline document
pub fn compare_files(
    baseline: &Path,
    candidate: &Path,
    policy: &TolerancePolicy,
) -> Result<ComparisonOutcome> {
    let baseline_doc = load_document(baseline)?;
    let candidate_doc = load_document(candidate)?;

    if !baseline_doc.is_comparable_with(&candidate_doc) {
        bail!(
            "schema mismatch: {} is version {}, {} is version {}",
            baseline.display(),
            baseline_doc.schema_version(),
            candidate.display(),
            candidate_doc.schema_version()
        );
    }

    Ok(DocumentDiff::compare(&baseline_doc, &candidate_doc, policy))
}
