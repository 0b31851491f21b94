// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! CLI output reporter with colored formatting

use colored::*;
use std::time::Duration;

use super::diff::{ComparisonOutcome, Discrepancy};
use super::policy::Severity;
use crate::validation::types::{ComparisonReport, SuiteResult, Verdict};

/// CLI reporter for formatted output
pub struct Reporter;

impl Reporter {
    /// Print the per-case lines and the summary of a suite
    pub fn report_suite(result: &SuiteResult, verbose: bool) {
        print!("{}", Self::render_suite(result, verbose));
    }

    /// Terminal rendering of a suite: one line per case, detail lines for
    /// problems (all of them when verbose), then the totals
    pub fn render_suite(result: &SuiteResult, verbose: bool) -> String {
        let mut out = String::new();
        out.push_str(&format!("\n{}\n", "━".repeat(80).bright_black()));

        for report in &result.reports {
            out.push_str(&Self::case_line(report));
            out.push('\n');
            for line in Self::detail_lines(report, verbose) {
                out.push_str(&line);
                out.push('\n');
            }
        }

        out.push_str(&format!("{}\n", "━".repeat(80).bright_black()));
        if result.cancelled {
            let note = "Run cancelled; unfinished cases are ERRORED".yellow().bold();
            out.push_str(&format!("{}\n", note));
        }
        out.push_str(&Self::summary_line(result));
        out.push('\n');
        out
    }

    fn case_line(report: &ComparisonReport) -> String {
        let verdict = match report.verdict {
            Verdict::Passed => "PASSED ".green().bold(),
            Verdict::Failed => "FAILED ".red().bold(),
            Verdict::Errored => "ERRORED".magenta().bold(),
        };
        let detail = match report.verdict {
            Verdict::Errored => report
                .error
                .as_ref()
                .map(|e| format!("{} error", e.category.as_str()))
                .unwrap_or_default(),
            _ => format!(
                "{} discrepanc{}",
                report.discrepancies.len(),
                if report.discrepancies.len() == 1 { "y" } else { "ies" }
            ),
        };
        format!(
            "{} {} {} {}",
            verdict,
            report.name.cyan(),
            detail.bright_black(),
            Self::format_duration(report.duration).bright_black()
        )
    }

    fn detail_lines(report: &ComparisonReport, verbose: bool) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(error) = &report.error {
            lines.push(format!("    {} {}", "error:".red(), error.message));
        }
        let shown: Vec<&Discrepancy> = if verbose {
            report.discrepancies.iter().collect()
        } else {
            report.failing_discrepancies().collect()
        };
        lines.extend(shown.into_iter().map(Self::discrepancy_line));
        if verbose {
            if let Some(entry) = &report.catalog {
                if let Some(title) = &entry.title {
                    lines.push(format!("    {} {}", "title:".bright_black(), title));
                }
            }
        }
        lines
    }

    fn discrepancy_line(discrepancy: &Discrepancy) -> String {
        let tag = match discrepancy.severity {
            Severity::Fail => discrepancy.kind.as_str().red(),
            Severity::Warning => discrepancy.kind.as_str().yellow(),
        };
        format!("    {} {}", tag, discrepancy.summary())
    }

    fn summary_line(result: &SuiteResult) -> String {
        format!(
            "{} {}  {} {}  {} {}  {} {}  {} {}",
            "Files checked:".bold(),
            result.total,
            "Passed:".bright_black(),
            result.passed.to_string().green(),
            "Failed:".bright_black(),
            result.failed.to_string().red(),
            "Errored:".bright_black(),
            result.errored.to_string().magenta(),
            "Time:".bright_black(),
            Self::format_duration(result.duration).yellow()
        )
    }

    /// Report an offline document diff
    pub fn report_diff(
        baseline: &str,
        candidate: &str,
        outcome: &ComparisonOutcome,
        verbose: bool,
    ) {
        println!("\n{}", "━".repeat(80).bright_black());
        println!("{} {}", "Baseline:".bold(), baseline.cyan());
        println!("{} {}", "Candidate:".bold(), candidate.cyan());
        println!("{}", "━".repeat(80).bright_black());

        for discrepancy in outcome
            .discrepancies
            .iter()
            .filter(|d| verbose || d.severity == Severity::Fail)
        {
            println!("{}", Self::discrepancy_line(discrepancy));
        }

        if outcome.passed() {
            println!(
                "{} {} ({} values compared, {} warnings)",
                "✅".green(),
                "Documents match".green().bold(),
                outcome.compared_values,
                outcome.warning_count()
            );
        } else {
            println!(
                "{} {} ({} failing of {} discrepancies)",
                "❌".red(),
                "Documents differ".red().bold(),
                outcome.failure_count(),
                outcome.discrepancies.len()
            );
        }
        println!("{}", "━".repeat(80).bright_black());
    }

    /// Report error
    pub fn report_error(message: &str) {
        eprintln!("\n{} {}", "❌ Error:".red().bold(), message);
    }

    /// Format duration for display
    pub fn format_duration(duration: Duration) -> String {
        let micros = duration.as_micros();

        if micros < 1_000 {
            format!("{}µs", micros)
        } else if micros < 1_000_000 {
            format!("{:.2}ms", micros as f64 / 1_000.0)
        } else {
            format!("{:.2}s", micros as f64 / 1_000_000.0)
        }
    }
}
