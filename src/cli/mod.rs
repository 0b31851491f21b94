// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! CLI subsystem: process runner, comparator and terminal output

pub mod compare;
pub mod diff;
pub mod policy;
pub mod process;
pub mod reporter;
pub mod runner;

pub use compare::{compare_files, load_document};
pub use diff::{ComparisonOutcome, Discrepancy, DiscrepancyKind, DocumentDiff, NumericDelta};
pub use policy::{
    relative_tolerance_from_match_pct, PolicyConfig, PolicyError, Severity, Tolerance,
    ToleranceOverride, TolerancePolicy,
};
pub use process::CancelToken;
pub use reporter::Reporter;
pub use runner::{CommandTemplate, PreflightError, RunOutcome, Runner};
