// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Comparator properties over realistic extraction documents

use cad_regress::cli::{compare_files, Severity};
use cad_regress::{compare, DiscrepancyKind, Document, TolerancePolicy, Verdict};
use std::fs;
use tempfile::TempDir;

fn doc(raw: &str) -> Document {
    Document::parse(raw.as_bytes()).unwrap()
}

fn bracket(volume: f64, holes: &str, material: &str) -> Document {
    doc(&format!(
        r#"{{
            "schema": 1,
            "document": {{"label": "Bracket", "objects": 4}},
            "shapes": {{
                "Body": {{
                    "volume": {volume},
                    "area": 2841.27,
                    "is_valid": true,
                    "material": "{material}",
                    "bbox": [0.0, 0.0, 0.0, 40.0, 20.0, 5.0],
                    "holes": {holes}
                }}
            }}
        }}"#
    ))
}

#[test]
fn test_identical_documents_have_no_discrepancies() {
    let a = bracket(3412.5, "[[5.0, 5.0], [35.0, 5.0]]", "steel");
    let outcome = compare(&a, &a.clone(), &TolerancePolicy::default());
    assert!(outcome.discrepancies.is_empty());
    assert_eq!(outcome.verdict(), Verdict::Passed);
    assert_eq!(outcome.compared_values, a.leaf_count());
}

#[test]
fn test_absolute_tolerance_wins_regardless_of_relative() {
    let policy = TolerancePolicy::new(0.01, 0.0).unwrap();
    let a = bracket(3412.5, "[]", "steel");
    let b = bracket(3412.509, "[]", "steel");
    assert!(compare(&a, &b, &policy).passed());
}

#[test]
fn test_every_discrepancy_is_enumerated() {
    let policy = TolerancePolicy::new(1e-6, 0.0).unwrap();
    let a = bracket(3412.5, "[[5.0, 5.0], [35.0, 5.0]]", "steel");
    let b = bracket(3400.0, "[[5.0, 5.5], [35.0, 5.0]]", "aluminium");

    let outcome = compare(&a, &b, &policy);
    let mut paths: Vec<String> = outcome.discrepancies.iter().map(|d| d.path.to_string()).collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![
            "shapes.Body.holes[0][1]".to_string(),
            "shapes.Body.material".to_string(),
            "shapes.Body.volume".to_string(),
        ]
    );
    assert!(outcome
        .discrepancies
        .iter()
        .all(|d| d.kind == DiscrepancyKind::ValueMismatch));
    assert_eq!(outcome.failure_count(), 3);
}

#[test]
fn test_sequence_length_change_reports_once() {
    let a = bracket(3412.5, "[[5.0, 5.0], [35.0, 5.0]]", "steel");
    let b = bracket(3412.5, "[[5.0, 5.0], [35.0, 5.0], [20.0, 15.0]]", "steel");

    let outcome = compare(&a, &b, &TolerancePolicy::default());
    assert_eq!(outcome.discrepancies.len(), 1);
    assert_eq!(outcome.discrepancies[0].kind, DiscrepancyKind::SequenceLengthMismatch);
    assert_eq!(outcome.discrepancies[0].path.to_string(), "shapes.Body.holes");
}

#[test]
fn test_warning_severity_keys_do_not_fail() {
    let a = doc(r#"{"schema":1,"shapes":{"Body":{"volume":1.0}}}"#);
    let b = doc(r#"{"schema":1,"shapes":{"Body":{"volume":1.0,"color":"red"}}}"#);

    let strict = compare(&a, &b, &TolerancePolicy::default());
    assert_eq!(strict.verdict(), Verdict::Failed);

    let lenient = TolerancePolicy::default().with_unexpected_key_severity(Severity::Warning);
    let outcome = compare(&a, &b, &lenient);
    assert_eq!(outcome.verdict(), Verdict::Passed);
    assert_eq!(outcome.warning_count(), 1);
    assert_eq!(outcome.discrepancies[0].kind, DiscrepancyKind::UnexpectedKey);
}

#[test]
fn test_path_override_loosens_one_value() {
    let a = bracket(3412.5, "[]", "steel");
    let b = bracket(3413.0, "[]", "steel");

    let policy = TolerancePolicy::default();
    assert!(!compare(&a, &b, &policy).passed());

    let policy = policy.with_override("shapes/*/volume", Some(1.0), None).unwrap();
    assert!(compare(&a, &b, &policy).passed());
}

#[test]
fn test_compare_files_from_disk() {
    let dir = TempDir::new().unwrap();
    let baseline = dir.path().join("baseline.json");
    let candidate = dir.path().join("candidate.json");
    fs::write(&baseline, r#"{"schema":1,"shapes":{"Cube":{"volume":1000.0}}}"#).unwrap();
    let with_bom = format!("\u{feff}{}", r#"{"schema":1,"shapes":{"Cube":{"volume":1000.0}}}"#);
    fs::write(&candidate, with_bom).unwrap();

    let outcome = compare_files(&baseline, &candidate, &TolerancePolicy::default()).unwrap();
    assert!(outcome.passed());

    fs::write(&candidate, "").unwrap();
    assert!(compare_files(&baseline, &candidate, &TolerancePolicy::default()).is_err());
}
