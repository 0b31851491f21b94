// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Structural and numeric diff of result documents

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::policy::{Severity, Tolerance, TolerancePolicy};
use crate::document::{DocPath, Document, Node, Scalar};
use crate::validation::types::Verdict;

/// Kind of difference found between baseline and candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    MissingKey,
    UnexpectedKey,
    ValueMismatch,
    SequenceLengthMismatch,
    TypeMismatch,
}

impl DiscrepancyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscrepancyKind::MissingKey => "missing_key",
            DiscrepancyKind::UnexpectedKey => "unexpected_key",
            DiscrepancyKind::ValueMismatch => "value_mismatch",
            DiscrepancyKind::SequenceLengthMismatch => "sequence_length_mismatch",
            DiscrepancyKind::TypeMismatch => "type_mismatch",
        }
    }
}

impl fmt::Display for DiscrepancyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Absolute and relative error of a numeric mismatch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericDelta {
    pub absolute: f64,
    pub relative: f64,
}

impl NumericDelta {
    fn between(a: f64, b: f64) -> Self {
        let absolute = (a - b).abs();
        let denom = a.abs().max(b.abs());
        let relative = if denom > 0.0 { absolute / denom } else { 0.0 };
        Self { absolute, relative }
    }
}

/// One difference at one path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub path: DocPath,
    pub kind: DiscrepancyKind,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<NumericDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<Tolerance>,
}

impl Discrepancy {
    fn new(path: DocPath, kind: DiscrepancyKind, severity: Severity) -> Self {
        Self {
            path,
            kind,
            severity,
            baseline: None,
            candidate: None,
            delta: None,
            tolerance: None,
        }
    }

    fn values(mut self, baseline: Option<&Node>, candidate: Option<&Node>) -> Self {
        self.baseline = baseline.cloned();
        self.candidate = candidate.cloned();
        self
    }

    pub fn is_failure(&self) -> bool {
        self.severity == Severity::Fail
    }

    /// One-line human description
    pub fn summary(&self) -> String {
        let show = |node: &Option<Node>| match node {
            Some(node) => node.to_string(),
            None => "<absent>".to_string(),
        };
        match self.kind {
            DiscrepancyKind::MissingKey => {
                format!("{}: missing in candidate (baseline {})", self.path, show(&self.baseline))
            }
            DiscrepancyKind::UnexpectedKey => {
                format!("{}: not in baseline (candidate {})", self.path, show(&self.candidate))
            }
            DiscrepancyKind::SequenceLengthMismatch => format!(
                "{}: sequence length {} vs {}",
                self.path,
                show(&self.baseline),
                show(&self.candidate)
            ),
            DiscrepancyKind::TypeMismatch => format!(
                "{}: {} vs {}",
                self.path,
                self.baseline.as_ref().map(|n| n.kind().as_str()).unwrap_or("?"),
                self.candidate.as_ref().map(|n| n.kind().as_str()).unwrap_or("?")
            ),
            DiscrepancyKind::ValueMismatch => match (self.delta, self.tolerance) {
                (Some(delta), Some(tol)) => format!(
                    "{}: {} vs {} (Δ{:.3e}, rel {:.3e}; tol abs {:.1e} rel {:.1e})",
                    self.path,
                    show(&self.baseline),
                    show(&self.candidate),
                    delta.absolute,
                    delta.relative,
                    tol.absolute,
                    tol.relative
                ),
                (Some(delta), None) => format!(
                    "{}: {} vs {} (Δ{})",
                    self.path,
                    show(&self.baseline),
                    show(&self.candidate),
                    delta.absolute
                ),
                _ => format!(
                    "{}: {} vs {}",
                    self.path,
                    show(&self.baseline),
                    show(&self.candidate)
                ),
            },
        }
    }
}

/// Every discrepancy between two documents plus the number of leaf values
/// that were actually compared
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonOutcome {
    pub discrepancies: Vec<Discrepancy>,
    pub compared_values: usize,
}

impl ComparisonOutcome {
    /// PASSED iff no fail-severity discrepancy exists
    pub fn passed(&self) -> bool {
        !self.discrepancies.iter().any(Discrepancy::is_failure)
    }

    pub fn verdict(&self) -> Verdict {
        if self.passed() {
            Verdict::Passed
        } else {
            Verdict::Failed
        }
    }

    pub fn failure_count(&self) -> usize {
        self.discrepancies.iter().filter(|d| d.is_failure()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.discrepancies.len() - self.failure_count()
    }
}

/// Document diff utilities
pub struct DocumentDiff;

impl DocumentDiff {
    /// Compare `candidate` against `baseline`.
    ///
    /// Schema versions are not checked here; callers decide what a schema
    /// mismatch means before asking for a diff.
    pub fn compare(
        baseline: &Document,
        candidate: &Document,
        policy: &TolerancePolicy,
    ) -> ComparisonOutcome {
        let mut walk = Walk {
            policy,
            outcome: ComparisonOutcome::default(),
        };
        walk.maps(&DocPath::root(), baseline.entries(), candidate.entries());
        walk.outcome
    }
}

struct Walk<'a> {
    policy: &'a TolerancePolicy,
    outcome: ComparisonOutcome,
}

impl Walk<'_> {
    fn push(&mut self, discrepancy: Discrepancy) {
        self.outcome.discrepancies.push(discrepancy);
    }

    fn maps(
        &mut self,
        path: &DocPath,
        baseline: &BTreeMap<String, Node>,
        candidate: &BTreeMap<String, Node>,
    ) {
        let keys: BTreeSet<&String> = baseline.keys().chain(candidate.keys()).collect();
        for key in keys {
            let child = path.child_key(key);
            match (baseline.get(key), candidate.get(key)) {
                (Some(a), Some(b)) => self.nodes(&child, a, b),
                (Some(a), None) => {
                    let severity = self.policy.missing_key_severity();
                    self.push(
                        Discrepancy::new(child, DiscrepancyKind::MissingKey, severity)
                            .values(Some(a), None),
                    );
                }
                (None, Some(b)) => {
                    let severity = self.policy.unexpected_key_severity();
                    self.push(
                        Discrepancy::new(child, DiscrepancyKind::UnexpectedKey, severity)
                            .values(None, Some(b)),
                    );
                }
                (None, None) => {}
            }
        }
    }

    fn nodes(&mut self, path: &DocPath, baseline: &Node, candidate: &Node) {
        match (baseline, candidate) {
            (Node::Map(a), Node::Map(b)) => self.maps(path, a, b),
            (Node::Sequence(a), Node::Sequence(b)) => self.sequences(path, a, b),
            (Node::Scalar(a), Node::Scalar(b)) => self.scalars(path, a, b, baseline, candidate),
            _ => self.push(
                Discrepancy::new(path.clone(), DiscrepancyKind::TypeMismatch, Severity::Fail)
                    .values(Some(baseline), Some(candidate)),
            ),
        }
    }

    fn sequences(&mut self, path: &DocPath, baseline: &[Node], candidate: &[Node]) {
        if baseline.len() != candidate.len() {
            let len = |n: usize| Node::Scalar(Scalar::Integer(n as i64));
            self.push(
                Discrepancy::new(
                    path.clone(),
                    DiscrepancyKind::SequenceLengthMismatch,
                    Severity::Fail,
                )
                .values(Some(&len(baseline.len())), Some(&len(candidate.len()))),
            );
            return;
        }
        for (i, (a, b)) in baseline.iter().zip(candidate).enumerate() {
            self.nodes(&path.child_index(i), a, b);
        }
    }

    fn scalars(&mut self, path: &DocPath, a: &Scalar, b: &Scalar, node_a: &Node, node_b: &Node) {
        self.outcome.compared_values += 1;

        let mismatch = match (a, b) {
            (Scalar::Integer(x), Scalar::Integer(y)) => (x != y).then(|| {
                Discrepancy {
                    delta: Some(NumericDelta::between(*x as f64, *y as f64)),
                    ..Discrepancy::new(path.clone(), DiscrepancyKind::ValueMismatch, Severity::Fail)
                }
            }),
            (Scalar::Float(_), Scalar::Float(_) | Scalar::Integer(_))
            | (Scalar::Integer(_), Scalar::Float(_)) => {
                let (x, y) = match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => (x, y),
                    _ => return,
                };
                let tolerance = self.policy.tolerance_for(path);
                (!tolerance.accepts(x, y)).then(|| Discrepancy {
                    delta: Some(NumericDelta::between(x, y)),
                    tolerance: Some(tolerance),
                    ..Discrepancy::new(path.clone(), DiscrepancyKind::ValueMismatch, Severity::Fail)
                })
            }
            (Scalar::Text(x), Scalar::Text(y)) => (x != y).then(|| {
                Discrepancy::new(path.clone(), DiscrepancyKind::ValueMismatch, Severity::Fail)
            }),
            (Scalar::Bool(x), Scalar::Bool(y)) => (x != y).then(|| {
                Discrepancy::new(path.clone(), DiscrepancyKind::ValueMismatch, Severity::Fail)
            }),
            _ => Some(Discrepancy::new(
                path.clone(),
                DiscrepancyKind::TypeMismatch,
                Severity::Fail,
            )),
        };

        if let Some(discrepancy) = mismatch {
            self.push(discrepancy.values(Some(node_a), Some(node_b)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(json: &str) -> Document {
        Document::parse(json.as_bytes()).unwrap()
    }

    fn cube(volume: &str) -> Document {
        doc(&format!(r#"{{"schema":1,"shapes":{{"Cube":{{"volume":{volume}}}}}}}"#))
    }

    #[test]
    fn test_identical_documents() {
        let a = doc(r#"{"schema":1,"shapes":{"Cube":{
            "volume":1000.0,"faces":6,"name":"Cube","closed":true,
            "bbox":[0.0,0.0,0.0,10.0,10.0,10.0]
        }}}"#);
        let outcome = DocumentDiff::compare(&a, &a.clone(), &TolerancePolicy::default());
        assert!(outcome.discrepancies.is_empty());
        assert_eq!(outcome.compared_values, 10);
        assert_eq!(outcome.verdict(), Verdict::Passed);
    }

    #[test]
    fn test_within_absolute_tolerance() {
        let policy = TolerancePolicy::new(1e-3, 0.0).unwrap();
        let outcome = DocumentDiff::compare(&cube("1000.0"), &cube("1000.0007"), &policy);
        assert!(outcome.passed());
        assert!(outcome.discrepancies.is_empty());
    }

    #[test]
    fn test_beyond_both_tolerances() {
        let policy = TolerancePolicy::new(1e-3, 1e-6).unwrap();
        let outcome = DocumentDiff::compare(&cube("1000.0"), &cube("1002.0"), &policy);
        assert_eq!(outcome.verdict(), Verdict::Failed);
        assert_eq!(outcome.discrepancies.len(), 1);

        let d = &outcome.discrepancies[0];
        assert_eq!(d.kind, DiscrepancyKind::ValueMismatch);
        assert_eq!(d.path.to_string(), "shapes.Cube.volume");
        let delta = d.delta.unwrap();
        approx::assert_relative_eq!(delta.absolute, 2.0);
        approx::assert_relative_eq!(delta.relative, 2.0 / 1002.0);
        assert_eq!(d.tolerance, Some(Tolerance { absolute: 1e-3, relative: 1e-6 }));
    }

    #[test]
    fn test_sequence_length_mismatch_suppresses_elements() {
        let a = doc(r#"{"schema":1,"v":[1.0,2.0,3.0]}"#);
        let b = doc(r#"{"schema":1,"v":[9.0,9.0]}"#);
        let outcome = DocumentDiff::compare(&a, &b, &TolerancePolicy::default());
        assert_eq!(outcome.discrepancies.len(), 1);
        let d = &outcome.discrepancies[0];
        assert_eq!(d.kind, DiscrepancyKind::SequenceLengthMismatch);
        assert_eq!(d.baseline, Some(Node::Scalar(Scalar::Integer(3))));
        assert_eq!(d.candidate, Some(Node::Scalar(Scalar::Integer(2))));
    }

    #[test]
    fn test_equal_sequences_compare_elementwise() {
        let a = doc(r#"{"schema":1,"v":[[0.0,1.0],[2.0,3.0]]}"#);
        let b = doc(r#"{"schema":1,"v":[[0.0,1.0],[2.0,3.5]]}"#);
        let outcome = DocumentDiff::compare(&a, &b, &TolerancePolicy::default());
        assert_eq!(outcome.discrepancies.len(), 1);
        assert_eq!(outcome.discrepancies[0].path.to_string(), "v[1][1]");
        assert_eq!(outcome.compared_values, 4);
    }

    #[test]
    fn test_missing_and_unexpected_keys_in_sorted_order() {
        let a = doc(r#"{"schema":1,"b":1,"d":2}"#);
        let b = doc(r#"{"schema":1,"a":1,"b":1,"c":3}"#);
        let outcome = DocumentDiff::compare(&a, &b, &TolerancePolicy::default());
        let found: Vec<_> = outcome
            .discrepancies
            .iter()
            .map(|d| (d.path.to_string(), d.kind))
            .collect();
        assert_eq!(
            found,
            vec![
                ("a".to_string(), DiscrepancyKind::UnexpectedKey),
                ("c".to_string(), DiscrepancyKind::UnexpectedKey),
                ("d".to_string(), DiscrepancyKind::MissingKey),
            ]
        );
        assert!(!outcome.passed());
    }

    #[test]
    fn test_warning_severity_does_not_fail() {
        let policy = TolerancePolicy::default()
            .with_unexpected_key_severity(Severity::Warning)
            .with_missing_key_severity(Severity::Warning);
        let a = doc(r#"{"schema":1,"old":1,"same":2}"#);
        let b = doc(r#"{"schema":1,"new":1,"same":2}"#);
        let outcome = DocumentDiff::compare(&a, &b, &policy);
        assert_eq!(outcome.discrepancies.len(), 2);
        assert_eq!(outcome.warning_count(), 2);
        assert_eq!(outcome.verdict(), Verdict::Passed);
    }

    #[test]
    fn test_exact_scalars() {
        let a = doc(r#"{"schema":1,"n":6,"s":"Cube","b":true}"#);
        let b = doc(r#"{"schema":1,"n":7,"s":"Box","b":false}"#);
        let outcome = DocumentDiff::compare(&a, &b, &TolerancePolicy::new(10.0, 1.0).unwrap());
        assert_eq!(outcome.failure_count(), 3);
        assert!(outcome
            .discrepancies
            .iter()
            .all(|d| d.kind == DiscrepancyKind::ValueMismatch));
    }

    #[test]
    fn test_integer_against_float_uses_float_rule() {
        let a = doc(r#"{"schema":1,"volume":1000}"#);
        let b = doc(r#"{"schema":1,"volume":1000.0000001}"#);
        let outcome = DocumentDiff::compare(&a, &b, &TolerancePolicy::default());
        assert!(outcome.passed());
    }

    #[test]
    fn test_type_mismatch() {
        let a = doc(r#"{"schema":1,"x":{"y":1.0},"z":"text"}"#);
        let b = doc(r#"{"schema":1,"x":[1.0],"z":1.0}"#);
        let outcome = DocumentDiff::compare(&a, &b, &TolerancePolicy::default());
        assert_eq!(outcome.discrepancies.len(), 2);
        assert!(outcome
            .discrepancies
            .iter()
            .all(|d| d.kind == DiscrepancyKind::TypeMismatch));
        assert!(outcome.discrepancies[0].summary().contains("mapping vs sequence"));
    }

    #[test]
    fn test_override_applies_at_path() {
        let policy = TolerancePolicy::new(1e-9, 0.0)
            .unwrap()
            .with_override("shapes/*/volume", Some(5.0), None)
            .unwrap();
        let outcome = DocumentDiff::compare(&cube("1000.0"), &cube("1002.0"), &policy);
        assert!(outcome.passed());
    }

    #[test]
    fn test_summary_mentions_path_and_values() {
        let policy = TolerancePolicy::new(1e-3, 1e-6).unwrap();
        let outcome = DocumentDiff::compare(&cube("1000.0"), &cube("1002.0"), &policy);
        let text = outcome.discrepancies[0].summary();
        assert!(text.starts_with("shapes.Cube.volume: 1000.0 vs 1002.0"));
    }
}
