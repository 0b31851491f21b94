// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! cad-regress
//!
//! Baseline regression harness for batch-mode CAD applications. Each design
//! file in a fixture corpus is run through the application with an
//! extraction macro, the resulting geometry/metadata document is diffed
//! against a stored baseline under a tolerance policy, and the verdicts are
//! aggregated into a suite report.

pub mod cli;
pub mod document;
pub mod telemetry;
pub mod validation;

pub use cli::{
    CancelToken, ComparisonOutcome, Discrepancy, DiscrepancyKind, DocumentDiff, RunOutcome,
    Runner, Severity, Tolerance, TolerancePolicy,
};
pub use document::{DocPath, Document, Node, ParseError, Scalar};
pub use validation::{
    ComparisonReport, HarnessConfig, HarnessError, SuiteCoordinator, SuiteResult, TestCase,
    Verdict,
};

/// Compare two documents under a policy
pub fn compare(
    baseline: &Document,
    candidate: &Document,
    policy: &TolerancePolicy,
) -> ComparisonOutcome {
    DocumentDiff::compare(baseline, candidate, policy)
}
