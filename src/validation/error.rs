// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Error taxonomy
//!
//! Per-case errors ([`CaseError`]) turn a case ERRORED and never stop the
//! suite. [`HarnessError`] aborts before any case runs and maps onto a
//! reserved exit code.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::catalog::CatalogError;
use super::types::ErrorCategory;
use crate::cli::policy::PolicyError;
use crate::cli::runner::{PreflightError, RunOutcome, TemplateError};
use crate::document::ParseError;

/// Every case passed
pub const EXIT_PASSED: i32 = 0;
/// At least one case failed, none errored
pub const EXIT_FAILED: i32 = 1;
/// At least one case errored
pub const EXIT_ERRORED: i32 = 2;
/// Command line usage error
pub const EXIT_USAGE: i32 = 64;
/// Input directory or fixtures missing
pub const EXIT_NO_INPUT: i32 = 66;
/// Internal harness failure
pub const EXIT_INTERNAL: i32 = 70;
/// Configuration error
pub const EXIT_CONFIG: i32 = 78;

/// Case could not be prepared for execution
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("no baseline for this fixture (expected `{0}`)")]
    MissingBaseline(PathBuf),
    #[error("baseline `{path}` is unreadable: {source}")]
    UnreadableBaseline {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("baseline `{path}` is corrupt: {source}")]
    CorruptBaseline {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
    #[error("fixture `{path}` is unreadable: {source}")]
    UnreadableFixture {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("fixture `{0}` is not a regular file")]
    FixtureNotAFile(PathBuf),
}

/// The external invocation did not succeed
#[derive(Debug, Error, PartialEq)]
pub enum ExecutionError {
    #[error("extraction timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("extraction {0}")]
    NonZeroExit(String),
    #[error("extraction could not be launched: {0}")]
    Launch(String),
    #[error("cancelled after {:.1}s", .0.as_secs_f64())]
    Cancelled(Duration),
    #[error("cancelled before dispatch")]
    CancelledBeforeDispatch,
}

impl ExecutionError {
    /// Classify a non-success outcome; `None` for [`RunOutcome::Success`]
    pub fn from_outcome(outcome: &RunOutcome) -> Option<Self> {
        match outcome {
            RunOutcome::Success(_) => None,
            RunOutcome::NonZeroExit { .. } => Some(ExecutionError::NonZeroExit(outcome.describe())),
            RunOutcome::Timeout(elapsed) => Some(ExecutionError::Timeout(*elapsed)),
            RunOutcome::LaunchFailure(reason) => Some(ExecutionError::Launch(reason.clone())),
            RunOutcome::Cancelled(elapsed) => Some(ExecutionError::Cancelled(*elapsed)),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            ExecutionError::Cancelled(_) | ExecutionError::CancelledBeforeDispatch
        )
    }
}

/// Candidate output could not be compared
#[derive(Debug, Error)]
pub enum CandidateError {
    #[error("extraction output is invalid: {0}")]
    Invalid(#[source] ParseError),
    #[error("schema mismatch: baseline is version {baseline}, output is version {candidate}")]
    SchemaMismatch { baseline: u32, candidate: u32 },
}

/// Any error that turns a single case ERRORED
#[derive(Debug, Error)]
pub enum CaseError {
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Parse(#[from] CandidateError),
}

impl CaseError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            CaseError::Setup(_) => ErrorCategory::Setup,
            CaseError::Execution(_) => ErrorCategory::Execution,
            CaseError::Parse(_) => ErrorCategory::Parse,
        }
    }
}

/// Harness-level failure; the suite does not start
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("{0}")]
    Usage(String),
    #[error("{what} `{path}` does not exist or is not a directory")]
    MissingDirectory { what: &'static str, path: PathBuf },
    #[error("no `*.{extension}` fixtures found in `{dir}`")]
    NoFixtures { dir: PathBuf, extension: String },
    #[error("no fixtures match the filter(s) {0:?}")]
    EmptySuite(Vec<String>),
    #[error(transparent)]
    Preflight(#[from] PreflightError),
    #[error("invalid tolerance policy: {0}")]
    Policy(#[from] PolicyError),
    #[error("invalid command template: {0}")]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("worker pool failed: {0}")]
    WorkerPool(String),
    #[error("failed to write reports: {0}")]
    Report(String),
}

impl HarnessError {
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::Usage(_) => EXIT_USAGE,
            HarnessError::MissingDirectory { .. }
            | HarnessError::NoFixtures { .. }
            | HarnessError::EmptySuite(_) => EXIT_NO_INPUT,
            HarnessError::Preflight(_)
            | HarnessError::Policy(_)
            | HarnessError::Template(_)
            | HarnessError::Catalog(_)
            | HarnessError::Config(_) => EXIT_CONFIG,
            HarnessError::WorkerPool(_) | HarnessError::Report(_) => EXIT_INTERNAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_stay_in_reserved_range() {
        let errors = [
            HarnessError::Usage("bad flag".into()),
            HarnessError::EmptySuite(vec!["gear".into()]),
            HarnessError::Config("workers must be positive".into()),
            HarnessError::WorkerPool("spawn".into()),
        ];
        let codes: Vec<i32> = errors.iter().map(HarnessError::exit_code).collect();
        assert_eq!(codes, vec![64, 66, 78, 70]);
        assert!(codes.iter().all(|c| (64..=78).contains(c)));
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(ExecutionError::from_outcome(&RunOutcome::Success(vec![])), None);
        let err = ExecutionError::from_outcome(&RunOutcome::NonZeroExit {
            code: Some(1),
            stderr: "boom\n".into(),
        })
        .unwrap();
        assert_eq!(err.to_string(), "extraction exited with status 1: boom");

        let cancelled =
            ExecutionError::from_outcome(&RunOutcome::Cancelled(Duration::from_secs(1))).unwrap();
        assert!(cancelled.is_cancellation());
    }

    #[test]
    fn test_case_error_categories() {
        let setup: CaseError = SetupError::MissingBaseline("b/cube.json".into()).into();
        assert_eq!(setup.category(), ErrorCategory::Setup);
        let parse: CaseError = CandidateError::SchemaMismatch { baseline: 1, candidate: 2 }.into();
        assert_eq!(parse.category(), ErrorCategory::Parse);
        assert_eq!(
            parse.to_string(),
            "schema mismatch: baseline is version 1, output is version 2"
        );
    }
}
