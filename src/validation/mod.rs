// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Regression suite orchestration: discovery, execution and reporting

pub mod catalog;
pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod reporter;
pub mod types;

pub use catalog::{Catalog, CatalogEntry, CatalogError};
pub use config::HarnessConfig;
pub use coordinator::{plan, run_suite, SuiteCoordinator};
pub use discovery::FixtureDiscovery;
pub use error::{CaseError, HarnessError};
pub use reporter::SuiteReporter;
pub use types::{
    CaseFailure, CaseState, ComparisonReport, ErrorCategory, SuiteResult, TestCase, Verdict,
};
