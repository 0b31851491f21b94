// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Suite coordinator - orchestrates case execution
//!
//! Each case walks `PENDING -> RUNNING -> {PASSED, FAILED, ERRORED}` on a
//! bounded rayon pool; a worker owns at most one external process at a
//! time. Per-case errors become ERRORED reports and never stop the suite.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::catalog::Catalog;
use super::config::HarnessConfig;
use super::discovery::{apply_filters, FixtureDiscovery};
use super::error::{CandidateError, CaseError, ExecutionError, HarnessError, SetupError};
use super::types::{CaseState, ComparisonReport, SuiteResult, TestCase, Verdict};
use crate::cli::diff::{ComparisonOutcome, DocumentDiff};
use crate::cli::policy::TolerancePolicy;
use crate::cli::process::CancelToken;
use crate::cli::runner::{RunOutcome, Runner};
use crate::document::Document;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";

/// Discover, pair and filter the cases a configuration selects
pub fn plan(config: &HarnessConfig) -> Result<Vec<TestCase>, HarnessError> {
    let catalog = match &config.catalog {
        Some(path) => Catalog::load(path)?,
        None => Catalog::load_default(&config.fixtures)?,
    };

    let cases = FixtureDiscovery::new(&config.fixtures, &config.baselines)
        .with_extension(config.extension())
        .recursive(config.recursive)
        .discover(&catalog)?;

    for file in catalog.unmatched(cases.iter().map(|c| c.name.as_str())) {
        warn!(file, "catalog entry has no matching fixture");
    }

    let cases = apply_filters(cases, &config.filters);
    if cases.is_empty() {
        return Err(HarnessError::EmptySuite(config.filters.clone()));
    }
    Ok(cases)
}

/// Build a coordinator from `config`, plan the suite and run it
pub fn run_suite(config: &HarnessConfig, cancel: CancelToken) -> Result<SuiteResult, HarnessError> {
    let coordinator =
        SuiteCoordinator::from_config(config, cancel)?.with_progress(!config.log_json);
    let cases = plan(config)?;
    coordinator.run(&cases)
}

/// Suite coordinator
pub struct SuiteCoordinator {
    runner: Runner,
    application: PathBuf,
    policy: TolerancePolicy,
    workers: usize,
    cancel: CancelToken,
    show_progress: bool,
}

impl SuiteCoordinator {
    /// Create a coordinator around an existing runner.
    ///
    /// The runner is not preflighted; see [`SuiteCoordinator::from_config`].
    pub fn new(runner: Runner, policy: TolerancePolicy, workers: usize) -> Self {
        let cancel = CancelToken::new();
        Self {
            application: runner.executable().to_path_buf(),
            runner: runner.with_cancel_token(cancel.clone()),
            policy,
            workers: workers.max(1),
            cancel,
            show_progress: false,
        }
    }

    /// Validate the configuration, resolve the executable and check the macro
    pub fn from_config(config: &HarnessConfig, cancel: CancelToken) -> Result<Self, HarnessError> {
        config.validate()?;

        let executable = config.executable.clone().ok_or_else(|| {
            HarnessError::Config(
                "no CAD executable configured (--executable or CAD_REGRESS_EXECUTABLE)".to_string(),
            )
        })?;
        let macro_path = config.extraction_macro.clone().ok_or_else(|| {
            HarnessError::Config(
                "no extraction macro configured (--macro or CAD_REGRESS_MACRO)".to_string(),
            )
        })?;
        let policy = config.policy()?;

        let runner = Runner::new(executable, macro_path, config.timeout())
            .with_template(config.args.clone())
            .with_cancel_token(cancel.clone());
        let application = runner.preflight()?;
        debug!(application = %application.display(), "preflight passed");

        Ok(Self {
            runner,
            application,
            policy,
            workers: config.workers,
            cancel,
            show_progress: false,
        })
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.runner = self.runner.with_cancel_token(cancel.clone());
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run every case on the worker pool
    pub fn run(&self, cases: &[TestCase]) -> Result<SuiteResult, HarnessError> {
        let start = Instant::now();
        info!(
            cases = cases.len(),
            workers = self.workers,
            application = %self.application.display(),
            "starting suite"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("cad-regress-worker-{}", i))
            .build()
            .map_err(|e| HarnessError::WorkerPool(e.to_string()))?;

        let pb = if self.show_progress {
            let p = ProgressBar::new(cases.len() as u64);
            p.set_style(
                ProgressStyle::default_bar()
                    .template(PROGRESS_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            p
        } else {
            ProgressBar::hidden()
        };

        let reports: Vec<ComparisonReport> = pool.install(|| {
            cases
                .par_iter()
                .with_max_len(1)
                .map(|case| {
                    let report = self.run_case(case);
                    pb.inc(1);
                    pb.set_message(case.name.clone());
                    report
                })
                .collect()
        });
        pb.finish_and_clear();

        let mut result = SuiteResult::new(
            self.application.clone(),
            self.runner.macro_path().to_path_buf(),
            self.policy.default_tolerance(),
        );
        for report in reports {
            result.add_report(report);
        }
        result.cancelled = self.cancel.is_cancelled();
        result.finalize(start.elapsed());

        info!(
            total = result.total,
            passed = result.passed,
            failed = result.failed,
            errored = result.errored,
            cancelled = result.cancelled,
            elapsed_ms = result.duration.as_millis() as u64,
            "suite finished"
        );
        Ok(result)
    }

    /// Run one case to a terminal verdict
    pub fn run_case(&self, case: &TestCase) -> ComparisonReport {
        let start = Instant::now();
        let mut state = CaseState::Pending;

        if self.cancel.is_cancelled() {
            transition(&case.name, &mut state, CaseState::Done(Verdict::Errored));
            let err = CaseError::from(ExecutionError::CancelledBeforeDispatch);
            return ComparisonReport::errored(case, &err, start.elapsed(), None);
        }

        let (baseline, digest) = match prepare(case) {
            Ok(prepared) => prepared,
            Err(err) => {
                transition(&case.name, &mut state, CaseState::Done(Verdict::Errored));
                warn!(case = %case.name, error = %err, "setup failed");
                return ComparisonReport::errored(case, &err, start.elapsed(), None);
            }
        };

        transition(&case.name, &mut state, CaseState::Running);
        debug!(case = %case.name, "dispatching");
        let outcome = self.runner.run(&case.fixture);

        let report = match evaluate(outcome, &baseline, &self.policy) {
            Ok(comparison) => {
                ComparisonReport::compared(case, comparison, start.elapsed(), Some(digest))
            }
            Err(err) => ComparisonReport::errored(case, &err, start.elapsed(), Some(digest)),
        };
        transition(&case.name, &mut state, CaseState::Done(report.verdict));

        info!(
            case = %case.name,
            verdict = %report.verdict,
            discrepancies = report.discrepancies.len(),
            elapsed_ms = report.duration.as_millis() as u64,
            "case finished"
        );
        report
    }
}

fn transition(name: &str, state: &mut CaseState, to: CaseState) {
    match state.advance(to) {
        Ok(next) => *state = next,
        Err(e) => {
            error!(case = name, error = %e, "invalid case transition");
            *state = to;
        }
    }
}

/// Setup checks: baseline present, readable and valid; fixture readable
fn prepare(case: &TestCase) -> Result<(Document, String), CaseError> {
    let baseline_path = case
        .baseline
        .as_ref()
        .ok_or_else(|| SetupError::MissingBaseline(case.expected_baseline.clone()))?;

    let raw = fs::read(baseline_path).map_err(|source| SetupError::UnreadableBaseline {
        path: baseline_path.clone(),
        source,
    })?;
    let digest = format!("{:x}", Sha256::digest(&raw));
    let baseline = Document::parse(&raw).map_err(|source| SetupError::CorruptBaseline {
        path: baseline_path.clone(),
        source,
    })?;

    check_fixture(&case.fixture)?;
    Ok((baseline, digest))
}

fn check_fixture(path: &Path) -> Result<(), SetupError> {
    let meta = fs::metadata(path).map_err(|source| SetupError::UnreadableFixture {
        path: path.to_path_buf(),
        source,
    })?;
    if !meta.is_file() {
        return Err(SetupError::FixtureNotAFile(path.to_path_buf()));
    }
    fs::File::open(path).map_err(|source| SetupError::UnreadableFixture {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Turn a run outcome into a comparison against `baseline`
fn evaluate(
    outcome: RunOutcome,
    baseline: &Document,
    policy: &TolerancePolicy,
) -> Result<ComparisonOutcome, CaseError> {
    if let Some(err) = ExecutionError::from_outcome(&outcome) {
        return Err(err.into());
    }
    let RunOutcome::Success(raw) = outcome else {
        return Err(ExecutionError::Launch("unexpected run outcome".to_string()).into());
    };

    let candidate = Document::parse(&raw).map_err(CandidateError::Invalid)?;
    if !baseline.is_comparable_with(&candidate) {
        return Err(CandidateError::SchemaMismatch {
            baseline: baseline.schema_version(),
            candidate: candidate.schema_version(),
        }
        .into());
    }
    Ok(DocumentDiff::compare(baseline, &candidate, policy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::types::ErrorCategory;
    use std::time::Duration;

    const CUBE: &str = r#"{"schema":1,"shapes":{"Cube":{"volume":1000.0}}}"#;

    fn case_with(
        dir: &Path,
        name: &str,
        baseline: Option<&str>,
        fixture: Option<&str>,
    ) -> TestCase {
        let fixture_path = dir.join(name);
        if let Some(content) = fixture {
            fs::write(&fixture_path, content).unwrap();
        }
        let baseline_path = dir.join(format!("{name}.json"));
        if let Some(content) = baseline {
            fs::write(&baseline_path, content).unwrap();
        }
        TestCase {
            name: name.to_string(),
            fixture: fixture_path,
            baseline: baseline.map(|_| baseline_path.clone()),
            expected_baseline: baseline_path,
            catalog: None,
        }
    }

    #[test]
    fn test_missing_baseline_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let case = case_with(dir.path(), "gear.FCStd", None, Some(CUBE));
        let err = prepare(&case).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Setup);
        assert!(err.to_string().contains("gear.FCStd.json"));
    }

    #[test]
    fn test_corrupt_baseline_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let case = case_with(dir.path(), "gear.FCStd", Some("{\"schema\": 1, "), Some(CUBE));
        assert!(matches!(
            prepare(&case),
            Err(CaseError::Setup(SetupError::CorruptBaseline { .. }))
        ));
    }

    #[test]
    fn test_unreadable_fixture_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let case = case_with(dir.path(), "gear.FCStd", Some(CUBE), None);
        assert!(matches!(
            prepare(&case),
            Err(CaseError::Setup(SetupError::UnreadableFixture { .. }))
        ));
    }

    #[test]
    fn test_digest_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let case = case_with(dir.path(), "cube.FCStd", Some(""), Some(CUBE));
        assert!(prepare(&case).is_err());

        let case = case_with(dir.path(), "cube.FCStd", Some(CUBE), Some(CUBE));
        let (_, digest) = prepare(&case).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_evaluate_classifies_outcomes() {
        let baseline = Document::parse(CUBE.as_bytes()).unwrap();
        let policy = TolerancePolicy::default();

        let ok =
            evaluate(RunOutcome::Success(CUBE.as_bytes().to_vec()), &baseline, &policy).unwrap();
        assert!(ok.passed());

        let timeout =
            evaluate(RunOutcome::Timeout(Duration::from_secs(1)), &baseline, &policy).unwrap_err();
        assert_eq!(timeout.category(), ErrorCategory::Execution);

        let empty = evaluate(RunOutcome::Success(Vec::new()), &baseline, &policy).unwrap_err();
        assert_eq!(empty.category(), ErrorCategory::Parse);

        let schema2 = evaluate(RunOutcome::Success(b"{\"schema\": 2}".to_vec()), &baseline, &policy)
            .unwrap_err();
        assert_eq!(schema2.category(), ErrorCategory::Parse);
    }

    #[test]
    fn test_cancelled_suite_reports_every_case() {
        let dir = tempfile::tempdir().unwrap();
        let cases = vec![
            case_with(dir.path(), "b.FCStd", Some(CUBE), Some(CUBE)),
            case_with(dir.path(), "a.FCStd", Some(CUBE), Some(CUBE)),
        ];
        let coordinator = SuiteCoordinator::new(
            Runner::new("/bin/false", dir.path().join("m.sh"), Duration::from_secs(1)),
            TolerancePolicy::default(),
            2,
        );
        coordinator.cancel_token().cancel();

        let result = coordinator.run(&cases).unwrap();
        assert!(result.cancelled);
        assert_eq!(result.errored, 2);
        assert_eq!(result.reports[0].name, "a.FCStd");
        let error = result.reports[0].error.as_ref().unwrap();
        assert_eq!(error.category, ErrorCategory::Execution);
        assert_eq!(error.message, "cancelled before dispatch");
    }
}
