// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Tolerance policy for document comparison
//!
//! Floating-point geometry drifts between application versions and
//! platforms, so floats are compared with a dual absolute/relative
//! tolerance. Specific paths can carry their own tolerances through glob
//! overrides matched against the slash-joined path
//! (`objects/*/solids/*/metrics/volume_mm3`, `**/area`).

use globset::{Glob, GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::DocPath;

/// Absolute floor used near zero
pub const DEFAULT_ABSOLUTE_TOLERANCE: f64 = 1e-9;

/// Relative tolerance equivalent to a 99.999% match
pub const DEFAULT_RELATIVE_TOLERANCE: f64 = 1e-5;

/// Severity attached to a discrepancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Makes the case fail
    Fail,
    /// Reported only
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Fail => "fail",
            Severity::Warning => "warning",
        }
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("{name} must be a finite, non-negative number (got {value})")]
    InvalidTolerance { name: &'static str, value: f64 },
    #[error("match percentage must be in (0, 100], got {0}")]
    InvalidMatchPct(f64),
    #[error("invalid tolerance override pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("tolerance override `{0}` sets neither an absolute nor a relative tolerance")]
    EmptyOverride(String),
}

/// Dual tolerance applied to one float comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub absolute: f64,
    pub relative: f64,
}

impl Tolerance {
    pub fn new(absolute: f64, relative: f64) -> Result<Self, PolicyError> {
        check_tolerance("absolute_tolerance", absolute)?;
        check_tolerance("relative_tolerance", relative)?;
        Ok(Self { absolute, relative })
    }

    /// `|a-b| <= absolute OR |a-b| <= relative * max(|a|, |b|)`
    pub fn accepts(&self, a: f64, b: f64) -> bool {
        if a == b {
            return true;
        }
        let diff = (a - b).abs();
        diff <= self.absolute || diff <= self.relative * a.abs().max(b.abs())
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self {
            absolute: DEFAULT_ABSOLUTE_TOLERANCE,
            relative: DEFAULT_RELATIVE_TOLERANCE,
        }
    }
}

fn check_tolerance(name: &'static str, value: f64) -> Result<(), PolicyError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PolicyError::InvalidTolerance { name, value })
    }
}

/// Convert a required match percentage into a relative tolerance.
///
/// 99.999% means values may differ by at most 1e-5 of their magnitude.
pub fn relative_tolerance_from_match_pct(match_pct: f64) -> Result<f64, PolicyError> {
    if !(match_pct > 0.0 && match_pct <= 100.0) {
        return Err(PolicyError::InvalidMatchPct(match_pct));
    }
    Ok(1.0 - match_pct / 100.0)
}

/// Per-path tolerance override as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToleranceOverride {
    /// Glob over the slash-joined document path
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative: Option<f64>,
}

/// Serializable form of [`TolerancePolicy`] (the `[tolerance]` config table)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub absolute_tolerance: f64,
    pub relative_tolerance: f64,
    pub missing_key: Severity,
    pub unexpected_key: Severity,
    pub overrides: Vec<ToleranceOverride>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            absolute_tolerance: DEFAULT_ABSOLUTE_TOLERANCE,
            relative_tolerance: DEFAULT_RELATIVE_TOLERANCE,
            missing_key: Severity::Fail,
            unexpected_key: Severity::Fail,
            overrides: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledOverride {
    pattern: String,
    matcher: GlobMatcher,
    tolerance: Tolerance,
}

/// Injectable comparison policy
#[derive(Debug, Clone)]
pub struct TolerancePolicy {
    default: Tolerance,
    missing_key: Severity,
    unexpected_key: Severity,
    overrides: Vec<CompiledOverride>,
}

impl Default for TolerancePolicy {
    fn default() -> Self {
        Self {
            default: Tolerance::default(),
            missing_key: Severity::Fail,
            unexpected_key: Severity::Fail,
            overrides: Vec::new(),
        }
    }
}

impl TolerancePolicy {
    pub fn new(absolute: f64, relative: f64) -> Result<Self, PolicyError> {
        Ok(Self {
            default: Tolerance::new(absolute, relative)?,
            ..Self::default()
        })
    }

    pub fn from_config(config: &PolicyConfig) -> Result<Self, PolicyError> {
        let mut policy = Self::new(config.absolute_tolerance, config.relative_tolerance)?
            .with_missing_key_severity(config.missing_key)
            .with_unexpected_key_severity(config.unexpected_key);
        for entry in &config.overrides {
            policy = policy.with_override(&entry.path, entry.absolute, entry.relative)?;
        }
        Ok(policy)
    }

    pub fn with_missing_key_severity(mut self, severity: Severity) -> Self {
        self.missing_key = severity;
        self
    }

    pub fn with_unexpected_key_severity(mut self, severity: Severity) -> Self {
        self.unexpected_key = severity;
        self
    }

    /// Add a path override; unset tolerances inherit the defaults.
    /// Overrides are consulted in insertion order, first match wins.
    pub fn with_override(
        mut self,
        pattern: &str,
        absolute: Option<f64>,
        relative: Option<f64>,
    ) -> Result<Self, PolicyError> {
        if absolute.is_none() && relative.is_none() {
            return Err(PolicyError::EmptyOverride(pattern.to_string()));
        }
        let tolerance = Tolerance::new(
            absolute.unwrap_or(self.default.absolute),
            relative.unwrap_or(self.default.relative),
        )?;
        let matcher = compile_glob(pattern)?;
        self.overrides.push(CompiledOverride {
            pattern: pattern.to_string(),
            matcher,
            tolerance,
        });
        Ok(self)
    }

    pub fn default_tolerance(&self) -> Tolerance {
        self.default
    }

    pub fn missing_key_severity(&self) -> Severity {
        self.missing_key
    }

    pub fn unexpected_key_severity(&self) -> Severity {
        self.unexpected_key
    }

    pub fn override_patterns(&self) -> impl Iterator<Item = &str> {
        self.overrides.iter().map(|o| o.pattern.as_str())
    }

    /// Tolerance that applies at `path`
    pub fn tolerance_for(&self, path: &DocPath) -> Tolerance {
        if self.overrides.is_empty() {
            return self.default;
        }
        let subject = path.to_glob_subject();
        self.overrides
            .iter()
            .find(|o| o.matcher.is_match(&subject))
            .map(|o| o.tolerance)
            .unwrap_or(self.default)
    }
}

fn compile_glob(pattern: &str) -> Result<GlobMatcher, PolicyError> {
    let glob: Glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|source| PolicyError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
    Ok(glob.compile_matcher())
}
