// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Regression suite result types

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::catalog::CatalogEntry;
use super::error::{CaseError, EXIT_ERRORED, EXIT_FAILED, EXIT_PASSED};
use crate::cli::diff::{ComparisonOutcome, Discrepancy};
use crate::cli::policy::Tolerance;

// Custom serialization for Duration
pub(crate) fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

pub(crate) fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

/// Final verdict of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Passed,
    Failed,
    Errored,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Passed => "PASSED",
            Verdict::Failed => "FAILED",
            Verdict::Errored => "ERRORED",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a case inside the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseState {
    Pending,
    Running,
    Done(Verdict),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid case transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: CaseState,
    pub to: CaseState,
}

impl CaseState {
    /// `Pending -> Running -> Done(_)`, plus `Pending -> Done(Errored)`
    /// for setup failures found before dispatch
    pub fn advance(self, to: CaseState) -> Result<CaseState, InvalidTransition> {
        match (self, to) {
            (CaseState::Pending, CaseState::Running)
            | (CaseState::Running, CaseState::Done(_))
            | (CaseState::Pending, CaseState::Done(Verdict::Errored)) => Ok(to),
            _ => Err(InvalidTransition { from: self, to }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseState::Done(_))
    }
}

/// Category of an ERRORED case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Setup,
    Execution,
    Parse,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Setup => "setup",
            ErrorCategory::Execution => "execution",
            ErrorCategory::Parse => "parse",
        }
    }
}

/// Error record attached to an ERRORED report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFailure {
    pub category: ErrorCategory,
    pub message: String,
}

impl From<&CaseError> for CaseFailure {
    fn from(error: &CaseError) -> Self {
        Self {
            category: error.category(),
            message: error.to_string(),
        }
    }
}

/// One fixture paired with its baseline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    /// Fixture path relative to the fixture directory, `/`-separated
    pub name: String,
    pub fixture: PathBuf,
    /// `None` when no baseline file exists
    pub baseline: Option<PathBuf>,
    /// Where the baseline was expected
    pub expected_baseline: PathBuf,
    pub catalog: Option<CatalogEntry>,
}

/// Outcome of one case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub name: String,
    pub fixture: PathBuf,
    pub baseline: Option<PathBuf>,
    pub verdict: Verdict,
    #[serde(default)]
    pub discrepancies: Vec<Discrepancy>,
    #[serde(default)]
    pub compared_values: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CaseFailure>,
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<CatalogEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_sha256: Option<String>,
}

impl ComparisonReport {
    /// Report for a case that reached the comparator
    pub fn compared(
        case: &TestCase,
        outcome: ComparisonOutcome,
        duration: Duration,
        baseline_sha256: Option<String>,
    ) -> Self {
        Self {
            name: case.name.clone(),
            fixture: case.fixture.clone(),
            baseline: case.baseline.clone(),
            verdict: outcome.verdict(),
            discrepancies: outcome.discrepancies,
            compared_values: outcome.compared_values,
            error: None,
            duration,
            catalog: case.catalog.clone(),
            baseline_sha256,
        }
    }

    /// Report for a case that ended ERRORED
    pub fn errored(
        case: &TestCase,
        error: &CaseError,
        duration: Duration,
        baseline_sha256: Option<String>,
    ) -> Self {
        Self {
            name: case.name.clone(),
            fixture: case.fixture.clone(),
            baseline: case.baseline.clone(),
            verdict: Verdict::Errored,
            discrepancies: Vec::new(),
            compared_values: 0,
            error: Some(CaseFailure::from(error)),
            duration,
            catalog: case.catalog.clone(),
            baseline_sha256,
        }
    }

    pub fn failing_discrepancies(&self) -> impl Iterator<Item = &Discrepancy> {
        self.discrepancies.iter().filter(|d| d.is_failure())
    }
}

/// Suite-level result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub started_at: String,
    pub application: PathBuf,
    pub extraction_macro: PathBuf,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    #[serde(serialize_with = "serialize_duration", deserialize_with = "deserialize_duration")]
    pub duration: Duration,
    pub tolerance: Tolerance,
    #[serde(default)]
    pub cancelled: bool,
    pub reports: Vec<ComparisonReport>,
}

impl SuiteResult {
    pub fn new(application: PathBuf, extraction_macro: PathBuf, tolerance: Tolerance) -> Self {
        Self {
            started_at: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            application,
            extraction_macro,
            total: 0,
            passed: 0,
            failed: 0,
            errored: 0,
            duration: Duration::ZERO,
            tolerance,
            cancelled: false,
            reports: Vec::new(),
        }
    }

    pub fn add_report(&mut self, report: ComparisonReport) {
        self.total += 1;
        match report.verdict {
            Verdict::Passed => self.passed += 1,
            Verdict::Failed => self.failed += 1,
            Verdict::Errored => self.errored += 1,
        }
        self.reports.push(report);
    }

    /// Sort reports by case name and record the wall-clock duration
    pub fn finalize(&mut self, duration: Duration) {
        self.reports.sort_by(|a, b| a.name.cmp(&b.name));
        self.duration = duration;
    }

    pub fn pass_rate(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f32 / self.total as f32) * 100.0
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.errored > 0
    }

    /// 0 when everything passed, 1 for failures only, 2 once anything errored
    pub fn exit_code(&self) -> i32 {
        if self.errored > 0 {
            EXIT_ERRORED
        } else if self.failed > 0 {
            EXIT_FAILED
        } else {
            EXIT_PASSED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::error::{ExecutionError, SetupError};

    fn case(name: &str) -> TestCase {
        TestCase {
            name: name.to_string(),
            fixture: PathBuf::from(format!("fixtures/{name}")),
            baseline: Some(PathBuf::from("baselines/x.json")),
            expected_baseline: PathBuf::from("baselines/x.json"),
            catalog: None,
        }
    }

    fn suite() -> SuiteResult {
        SuiteResult::new("freecadcmd".into(), "extract.py".into(), Tolerance::default())
    }

    #[test]
    fn test_state_machine() {
        let running = CaseState::Pending.advance(CaseState::Running).unwrap();
        assert!(running.advance(CaseState::Done(Verdict::Passed)).unwrap().is_terminal());
        assert!(CaseState::Pending.advance(CaseState::Done(Verdict::Errored)).is_ok());
        assert!(CaseState::Pending.advance(CaseState::Done(Verdict::Passed)).is_err());
        assert!(CaseState::Done(Verdict::Failed).advance(CaseState::Running).is_err());
        assert!(running.advance(CaseState::Pending).is_err());
    }

    #[test]
    fn test_counts_and_exit_codes() {
        let mut result = suite();
        result.add_report(ComparisonReport::compared(
            &case("b.FCStd"),
            ComparisonOutcome::default(),
            Duration::from_millis(5),
            None,
        ));
        assert_eq!(result.exit_code(), 0);

        let err: CaseError = ExecutionError::Timeout(Duration::from_secs(300)).into();
        result.add_report(ComparisonReport::errored(
            &case("a.FCStd"),
            &err,
            Duration::from_secs(300),
            None,
        ));
        result.finalize(Duration::from_secs(301));

        assert_eq!((result.total, result.passed, result.errored), (2, 1, 1));
        assert_eq!(result.exit_code(), 2);
        assert_eq!(result.reports[0].name, "a.FCStd");
        assert!(result.has_failures());
    }

    #[test]
    fn test_errored_report_serialization() {
        let err: CaseError = SetupError::MissingBaseline("baselines/gear.json".into()).into();
        let report = ComparisonReport::errored(&case("gear.FCStd"), &err, Duration::ZERO, None);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["verdict"], "ERRORED");
        assert_eq!(json["error"]["category"], "setup");
        assert_eq!(json["discrepancies"], serde_json::json!([]));

        let back: ComparisonReport = serde_json::from_value(json).unwrap();
        assert_eq!(back.error, report.error);
    }
}
