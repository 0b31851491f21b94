// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Harness configuration system
//!
//! Layering, lowest precedence first: built-in defaults, `cad-regress.toml`
//! (or an explicit `--config` file), `CAD_REGRESS_*` environment variables,
//! command-line flags (applied by the binary).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::HarnessError;
use crate::cli::policy::{PolicyConfig, PolicyError, TolerancePolicy};
use crate::cli::runner::CommandTemplate;

/// Configuration file looked up in the working directory
pub const CONFIG_FILE: &str = "cad-regress.toml";

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HarnessConfig {
    /// CAD executable, a path or a name looked up on `PATH`
    pub executable: Option<PathBuf>,
    /// Extraction macro passed as `{macro}`
    #[serde(rename = "macro")]
    pub extraction_macro: Option<PathBuf>,
    /// Directory holding the design files
    pub fixtures: PathBuf,
    /// Directory holding the baseline documents
    pub baselines: PathBuf,
    /// Catalog file; defaults to `catalog.toml` in the fixture directory
    pub catalog: Option<PathBuf>,
    /// Fixture file extension, matched case-insensitively
    pub extension: String,
    pub recursive: bool,
    /// Worker pool size
    pub workers: usize,
    /// Per-case timeout in seconds
    pub timeout_secs: f64,
    /// Arguments passed to the executable
    pub args: CommandTemplate,
    /// Substring filters on case names
    pub filters: Vec<String>,
    /// Directory for JSON and Markdown reports
    pub output_dir: Option<PathBuf>,
    pub verbose: bool,
    pub log_json: bool,
    pub tolerance: PolicyConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            executable: None,
            extraction_macro: None,
            fixtures: PathBuf::from("fixtures"),
            baselines: PathBuf::from("baselines"),
            catalog: None,
            extension: "FCStd".to_string(),
            recursive: false,
            workers: 2,
            timeout_secs: 300.0,
            args: CommandTemplate::default(),
            filters: Vec::new(),
            output_dir: None,
            verbose: false,
            log_json: false,
            tolerance: PolicyConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: HarnessConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// An explicit path must exist; otherwise `cad-regress.toml` is used
    /// when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => {
                if !path.is_file() {
                    bail!("Config file not found: {:?}", path);
                }
                Self::from_file(path)?
            }
            None if Path::new(CONFIG_FILE).is_file() => Self::from_file(CONFIG_FILE)?,
            None => Self::default(),
        };

        config
            .apply_overrides_from(|key| std::env::var(key).ok())
            .context("Invalid environment override")?;
        Ok(config)
    }

    /// Apply `CAD_REGRESS_*` overrides looked up through `lookup`
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), HarnessError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(executable) = lookup("CAD_REGRESS_EXECUTABLE") {
            self.executable = Some(PathBuf::from(executable));
        }

        if let Some(macro_path) = lookup("CAD_REGRESS_MACRO") {
            self.extraction_macro = Some(PathBuf::from(macro_path));
        }

        if let Some(fixtures) = lookup("CAD_REGRESS_FIXTURES") {
            self.fixtures = PathBuf::from(fixtures);
        }

        if let Some(baselines) = lookup("CAD_REGRESS_BASELINES") {
            self.baselines = PathBuf::from(baselines);
        }

        if let Some(workers) = lookup("CAD_REGRESS_WORKERS") {
            self.workers = workers.trim().parse().map_err(|_| {
                HarnessError::Config(format!(
                    "CAD_REGRESS_WORKERS must be a positive integer, got `{}`",
                    workers
                ))
            })?;
        }

        if let Some(timeout) = lookup("CAD_REGRESS_TIMEOUT") {
            self.timeout_secs = timeout.trim().parse().map_err(|_| {
                HarnessError::Config(format!(
                    "CAD_REGRESS_TIMEOUT must be a number of seconds, got `{}`",
                    timeout
                ))
            })?;
        }

        if let Some(verbose) = lookup("CAD_REGRESS_VERBOSE") {
            self.verbose = matches!(
                verbose.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        Ok(())
    }

    /// Reject values no run could use
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.workers == 0 {
            return Err(HarnessError::Config("workers must be at least 1".to_string()));
        }
        let timeout_ok = self.timeout_secs > 0.0
            && Duration::try_from_secs_f64(self.timeout_secs).is_ok();
        if !timeout_ok {
            return Err(HarnessError::Config(format!(
                "timeout must be a positive number of seconds, got {}",
                self.timeout_secs
            )));
        }
        if self.extension.trim_start_matches('.').is_empty() {
            return Err(HarnessError::Config("fixture extension must not be empty".to_string()));
        }
        Ok(())
    }

    /// Per-case timeout; out-of-range values saturate, `validate` rejects them
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(Duration::MAX)
    }

    /// Fixture extension without a leading dot
    pub fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }

    pub fn policy(&self) -> Result<TolerancePolicy, PolicyError> {
        TolerancePolicy::from_config(&self.tolerance)
    }
}
