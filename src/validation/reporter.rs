// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Suite report files (JSON and Markdown)

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::types::{SuiteResult, Verdict};

/// JSON report file name inside the output directory
pub const JSON_REPORT: &str = "cad-regress-report.json";

/// Markdown report file name inside the output directory
pub const MARKDOWN_REPORT: &str = "cad-regress-report.md";

/// Suite report writer
pub struct SuiteReporter;

impl SuiteReporter {
    /// Write JSON report
    pub fn write_json(result: &SuiteResult, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(result).context("Failed to serialize report")?;
        fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write report: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Read a previously written JSON report
    pub fn read_json(path: impl AsRef<Path>) -> Result<SuiteResult> {
        let raw = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read report: {:?}", path.as_ref()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse report: {:?}", path.as_ref()))
    }

    /// Write Markdown report
    pub fn write_markdown(result: &SuiteResult, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path.as_ref(), Self::render_markdown(result))
            .with_context(|| format!("Failed to write report: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Write both reports into `dir`, creating it if needed
    pub fn write_all(result: &SuiteResult, dir: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {:?}", dir))?;
        let json = dir.join(JSON_REPORT);
        let markdown = dir.join(MARKDOWN_REPORT);
        Self::write_json(result, &json)?;
        Self::write_markdown(result, &markdown)?;
        Ok((json, markdown))
    }

    pub fn render_markdown(result: &SuiteResult) -> String {
        let mut md = String::new();

        md.push_str("# CAD Regression Report\n\n");
        md.push_str(&format!("**Generated:** {}\n\n", result.started_at));
        md.push_str(&format!("- **Application:** `{}`\n", result.application.display()));
        md.push_str(&format!("- **Macro:** `{}`\n", result.extraction_macro.display()));
        md.push_str(&format!(
            "- **Tolerance:** abs {:e}, rel {:e}\n\n",
            result.tolerance.absolute, result.tolerance.relative
        ));
        if result.cancelled {
            md.push_str("> **Run cancelled** - unfinished cases are reported as ERRORED.\n\n");
        }
        md.push_str("---\n\n");

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- **Total:** {}\n", result.total));
        md.push_str(&format!("- **Passed:** {} ({:.1}%)\n", result.passed, result.pass_rate()));
        md.push_str(&format!("- **Failed:** {}\n", result.failed));
        md.push_str(&format!("- **Errored:** {}\n", result.errored));
        md.push_str(&format!("- **Duration:** {:.2}s\n\n", result.duration.as_secs_f64()));

        md.push_str("## Cases\n\n");
        md.push_str("| Case | Verdict | Discrepancies | Duration |\n");
        md.push_str("|------|---------|---------------|----------|\n");
        for report in &result.reports {
            md.push_str(&format!(
                "| `{}` | {} | {} | {:.2}s |\n",
                report.name,
                report.verdict,
                report.discrepancies.len(),
                report.duration.as_secs_f64()
            ));
        }
        md.push('\n');

        let problems: Vec<_> = result
            .reports
            .iter()
            .filter(|r| r.verdict != Verdict::Passed)
            .collect();
        if !problems.is_empty() {
            md.push_str("## Details\n\n");
            for report in problems {
                md.push_str(&format!("### `{}` - {}\n\n", report.name, report.verdict));
                if let Some(entry) = &report.catalog {
                    if let Some(title) = &entry.title {
                        md.push_str(&format!("- Title: {}\n", title));
                    }
                    if let Some(version) = &entry.app_version {
                        md.push_str(&format!("- Baseline captured with: {}\n", version));
                    }
                }
                if let Some(error) = &report.error {
                    md.push_str(&format!(
                        "- Error ({}): {}\n",
                        error.category.as_str(),
                        error.message
                    ));
                }
                for discrepancy in &report.discrepancies {
                    md.push_str(&format!(
                        "- `{}` [{}]: {}\n",
                        discrepancy.kind,
                        discrepancy.severity.as_str(),
                        discrepancy.summary()
                    ));
                }
                md.push('\n');
            }
        }

        md
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::diff::DocumentDiff;
    use crate::cli::policy::{Tolerance, TolerancePolicy};
    use crate::document::Document;
    use crate::validation::types::{ComparisonReport, TestCase};
    use std::time::Duration;

    fn sample() -> SuiteResult {
        let a = Document::parse(br#"{"schema":1,"shapes":{"Cube":{"volume":1000.0}}}"#).unwrap();
        let b = Document::parse(br#"{"schema":1,"shapes":{"Cube":{"volume":1002.0}}}"#).unwrap();
        let outcome = DocumentDiff::compare(&a, &b, &TolerancePolicy::new(1e-3, 1e-6).unwrap());
        let case = TestCase {
            name: "cube.FCStd".into(),
            fixture: "fixtures/cube.FCStd".into(),
            baseline: Some("baselines/cube.json".into()),
            expected_baseline: "baselines/cube.json".into(),
            catalog: None,
        };
        let mut result =
            SuiteResult::new("freecadcmd".into(), "extract.py".into(), Tolerance::default());
        result.add_report(ComparisonReport::compared(
            &case,
            outcome,
            Duration::from_millis(1500),
            None,
        ));
        result.finalize(Duration::from_secs(2));
        result
    }

    #[test]
    fn test_markdown_lists_failures() {
        let md = SuiteReporter::render_markdown(&sample());
        assert!(md.contains("| `cube.FCStd` | FAILED | 1 | 1.50s |"));
        assert!(md.contains("`value_mismatch` [fail]: shapes.Cube.volume"));
    }

    #[test]
    fn test_json_report_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (json, markdown) = SuiteReporter::write_all(&sample(), dir.path().join("out")).unwrap();
        assert!(markdown.is_file());

        let back = SuiteReporter::read_json(&json).unwrap();
        assert_eq!(back.failed, 1);
        assert_eq!(back.exit_code(), 1);
        assert_eq!(back.reports[0].discrepancies[0].path.to_string(), "shapes.Cube.volume");
    }
}
