// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! cad-regress CLI

use cad_regress::cli::{
    compare_files, relative_tolerance_from_match_pct, CancelToken, PolicyConfig, PolicyError,
    Reporter, TolerancePolicy,
};
use cad_regress::telemetry::{default_level, init_tracing};
use cad_regress::validation::error::{
    EXIT_CONFIG, EXIT_ERRORED, EXIT_FAILED, EXIT_INTERNAL, EXIT_NO_INPUT, EXIT_PASSED, EXIT_USAGE,
};
use cad_regress::validation::{run_suite, HarnessConfig, HarnessError, SuiteReporter};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "cad-regress")]
#[command(version)]
#[command(
    about = "Baseline regression harness for batch-mode CAD geometry extraction",
    long_about = None
)]
struct Cli {
    /// Verbose output (all discrepancies, debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fixture corpus against the baselines
    Run(RunArgs),

    /// Compare two result documents offline
    Diff {
        /// Baseline document
        baseline: PathBuf,

        /// Candidate document
        candidate: PathBuf,

        /// Config file providing the [tolerance] table
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        tolerance: ToleranceArgs,
    },

    /// Re-render a saved JSON report
    Report {
        /// Input JSON report file
        #[arg(short, long)]
        input: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Terminal)]
        format: ReportFormat,
    },
}

#[derive(Args)]
struct RunArgs {
    /// CAD executable (path or name on PATH)
    #[arg(long, value_name = "PATH")]
    executable: Option<PathBuf>,

    /// Extraction macro
    #[arg(long = "macro", value_name = "PATH")]
    extraction_macro: Option<PathBuf>,

    /// Fixture directory
    #[arg(long, value_name = "DIR")]
    fixtures: Option<PathBuf>,

    /// Baseline directory
    #[arg(long, value_name = "DIR")]
    baselines: Option<PathBuf>,

    /// Catalog file (defaults to catalog.toml in the fixture directory)
    #[arg(long, value_name = "FILE")]
    catalog: Option<PathBuf>,

    /// Config file (defaults to ./cad-regress.toml when present)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Parallel workers
    #[arg(long)]
    workers: Option<usize>,

    /// Per-fixture timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<f64>,

    /// Fixture file extension
    #[arg(long)]
    extension: Option<String>,

    /// Search the fixture directory recursively
    #[arg(long)]
    recursive: bool,

    /// Only run cases whose name contains this text (repeatable)
    #[arg(long = "filter", value_name = "TEXT")]
    filters: Vec<String>,

    /// Directory for JSON and Markdown reports
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    #[command(flatten)]
    tolerance: ToleranceArgs,
}

#[derive(Args)]
struct ToleranceArgs {
    /// Absolute tolerance for floats
    #[arg(long, value_name = "ABS")]
    abs_tol: Option<f64>,

    /// Relative tolerance for floats
    #[arg(long, value_name = "REL", conflicts_with = "match_pct")]
    rel_tol: Option<f64>,

    /// Required match percentage, e.g. 99.999 (sets the relative tolerance)
    #[arg(long, value_name = "PCT")]
    match_pct: Option<f64>,
}

impl ToleranceArgs {
    fn apply(&self, policy: &mut PolicyConfig) -> Result<(), PolicyError> {
        if let Some(abs) = self.abs_tol {
            policy.absolute_tolerance = abs;
        }
        if let Some(rel) = self.rel_tol {
            policy.relative_tolerance = rel;
        }
        if let Some(pct) = self.match_pct {
            policy.relative_tolerance = relative_tolerance_from_match_pct(pct)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Terminal,
    Markdown,
    Json,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { EXIT_USAGE } else { EXIT_PASSED };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let code = match &cli.command {
        Commands::Run(args) => run_command(args, cli.verbose, cli.log_json),
        Commands::Diff {
            baseline,
            candidate,
            config,
            tolerance,
        } => diff_command(
            baseline,
            candidate,
            config.as_deref(),
            tolerance,
            cli.verbose,
            cli.log_json,
        ),
        Commands::Report { input, format } => report_command(input, *format, cli.verbose),
    };

    std::process::exit(code);
}

fn run_command(args: &RunArgs, verbose: bool, log_json: bool) -> i32 {
    match execute_run(args, verbose, log_json) {
        Ok(code) => code,
        Err(err) => {
            Reporter::report_error(&format!("{:#}", err));
            err.exit_code()
        }
    }
}

fn execute_run(args: &RunArgs, verbose: bool, log_json: bool) -> Result<i32, HarnessError> {
    let mut config = HarnessConfig::load(args.config.as_deref())
        .map_err(|e| HarnessError::Config(format!("{:#}", e)))?;
    apply_run_args(&mut config, args, verbose, log_json)?;

    init_tracing(config.log_json, default_level(config.verbose));

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        if !handler_token.is_cancelled() {
            eprintln!("{}", "Cancelling: stopping running extractions...".yellow());
        }
        handler_token.cancel();
    }) {
        warn!(error = %err, "failed to install Ctrl+C handler");
    }

    let result = run_suite(&config, cancel)?;
    Reporter::report_suite(&result, config.verbose);

    if let Some(dir) = &config.output_dir {
        let (json, markdown) = SuiteReporter::write_all(&result, dir)
            .map_err(|e| HarnessError::Report(format!("{:#}", e)))?;
        info!(json = %json.display(), markdown = %markdown.display(), "reports written");
    }

    Ok(result.exit_code())
}

fn apply_run_args(
    config: &mut HarnessConfig,
    args: &RunArgs,
    verbose: bool,
    log_json: bool,
) -> Result<(), HarnessError> {
    if let Some(executable) = &args.executable {
        config.executable = Some(executable.clone());
    }
    if let Some(macro_path) = &args.extraction_macro {
        config.extraction_macro = Some(macro_path.clone());
    }
    if let Some(fixtures) = &args.fixtures {
        config.fixtures = fixtures.clone();
    }
    if let Some(baselines) = &args.baselines {
        config.baselines = baselines.clone();
    }
    if let Some(catalog) = &args.catalog {
        config.catalog = Some(catalog.clone());
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    if let Some(extension) = &args.extension {
        config.extension = extension.clone();
    }
    if args.recursive {
        config.recursive = true;
    }
    if !args.filters.is_empty() {
        config.filters = args.filters.clone();
    }
    if let Some(output) = &args.output {
        config.output_dir = Some(output.clone());
    }
    config.verbose |= verbose;
    config.log_json |= log_json;
    args.tolerance.apply(&mut config.tolerance)?;
    Ok(())
}

fn diff_command(
    baseline: &Path,
    candidate: &Path,
    config: Option<&Path>,
    tolerance: &ToleranceArgs,
    verbose: bool,
    log_json: bool,
) -> i32 {
    init_tracing(log_json, default_level(verbose));

    let policy = match diff_policy(config, tolerance) {
        Ok(policy) => policy,
        Err(err) => {
            Reporter::report_error(&format!("{:#}", err));
            return err.exit_code();
        }
    };

    match compare_files(baseline, candidate, &policy) {
        Ok(outcome) => {
            Reporter::report_diff(
                &baseline.display().to_string(),
                &candidate.display().to_string(),
                &outcome,
                verbose,
            );
            if outcome.passed() {
                EXIT_PASSED
            } else {
                EXIT_FAILED
            }
        }
        Err(err) => {
            Reporter::report_error(&format!("{:#}", err));
            EXIT_ERRORED
        }
    }
}

fn diff_policy(
    config: Option<&Path>,
    tolerance: &ToleranceArgs,
) -> Result<TolerancePolicy, HarnessError> {
    let mut policy_config = match config {
        Some(path) => {
            HarnessConfig::from_file(path)
                .map_err(|e| HarnessError::Config(format!("{:#}", e)))?
                .tolerance
        }
        None => PolicyConfig::default(),
    };
    tolerance.apply(&mut policy_config)?;
    Ok(TolerancePolicy::from_config(&policy_config)?)
}

fn report_command(input: &Path, format: ReportFormat, verbose: bool) -> i32 {
    let result = match SuiteReporter::read_json(input) {
        Ok(result) => result,
        Err(err) => {
            Reporter::report_error(&format!("{:#}", err));
            return EXIT_NO_INPUT;
        }
    };

    match format {
        ReportFormat::Terminal => Reporter::report_suite(&result, verbose),
        ReportFormat::Markdown => print!("{}", SuiteReporter::render_markdown(&result)),
        ReportFormat::Json => match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(err) => {
                Reporter::report_error(&format!("Failed to serialize report: {}", err));
                return EXIT_INTERNAL;
            }
        },
    }
    EXIT_PASSED
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_match_pct_conflicts_with_rel_tol() {
        let parsed = Cli::try_parse_from([
            "cad-regress",
            "diff",
            "a.json",
            "b.json",
            "--rel-tol",
            "1e-3",
            "--match-pct",
            "99.9",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_run_args_override_config() {
        let cli = Cli::try_parse_from([
            "cad-regress",
            "run",
            "--executable",
            "freecadcmd",
            "--workers",
            "6",
            "--match-pct",
            "99.9",
            "--filter",
            "bracket",
            "--recursive",
        ])
        .unwrap();
        let Commands::Run(args) = &cli.command else {
            panic!("expected run");
        };
        let mut config = HarnessConfig::default();
        apply_run_args(&mut config, args, false, false).unwrap();
        assert_eq!(config.workers, 6);
        assert!(config.recursive);
        assert_eq!(config.filters, vec!["bracket".to_string()]);
        approx::assert_relative_eq!(config.tolerance.relative_tolerance, 1e-3, max_relative = 1e-9);
    }

    #[test]
    fn test_invalid_match_pct_is_config_error() {
        let cli = Cli::try_parse_from(["cad-regress", "run", "--match-pct", "150"]).unwrap();
        let Commands::Run(args) = &cli.command else {
            panic!("expected run");
        };
        let err = apply_run_args(&mut HarnessConfig::default(), args, false, false).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_CONFIG);
    }
}
