//! JUnit XML reports: parsing and mapping to test-management results.
//!
//! A test case is mappable when it carries a tracker test key, either as a
//! `<property>` (`test_key`, `xray.test_key`, `test_id`) or as a key-shaped
//! token in its name. Everything else is dropped with a warning.

mod parse;

pub use parse::parse_str;

use anyhow::Context;
use faultline_ids::TestIdentity;
use faultline_schema::evidence::TestOutcome;
use faultline_schema::execution::{TestResult, TestStatus};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::warn;

/// Property names checked for a test key, in priority order.
pub const TEST_KEY_PROPERTIES: [&str; 3] = ["test_key", "xray.test_key", "test_id"];

static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Z][A-Z0-9]+-\d+").unwrap_or_else(|e| panic!("invalid key pattern: {e}"))
});

#[derive(Debug, Error)]
pub enum JunitError {
    #[error("invalid XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },
    #[error("malformed JUnit report: {0}")]
    Malformed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseOutcome {
    Passed,
    Failed,
    Errored,
    Skipped,
}

#[derive(Clone, Debug, PartialEq)]
pub struct JunitCase {
    /// Name of the innermost enclosing `<testsuite>`.
    pub suite: String,
    pub classname: Option<String>,
    pub name: String,
    pub time_secs: Option<f64>,
    pub outcome: CaseOutcome,
    pub message: Option<String>,
    /// Body of the failure/error/skipped element, usually a stack trace.
    pub details: Option<String>,
    pub system_out: Option<String>,
    pub properties: Vec<(String, String)>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct JunitReport {
    pub cases: Vec<JunitCase>,
}

impl JunitReport {
    pub fn failing(&self) -> impl Iterator<Item = &JunitCase> {
        self.cases.iter().filter(|c| c.is_failure())
    }
}

impl JunitCase {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, CaseOutcome::Failed | CaseOutcome::Errored)
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Test key from properties first, then from the case name.
    pub fn test_key(&self) -> Option<String> {
        TEST_KEY_PROPERTIES
            .iter()
            .filter_map(|p| self.property(p))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(str::to_string)
            .or_else(|| KEY_PATTERN.find(&self.name).map(|m| m.as_str().to_string()))
    }

    pub fn status(&self) -> TestStatus {
        match self.outcome {
            CaseOutcome::Passed => TestStatus::Pass,
            CaseOutcome::Failed | CaseOutcome::Errored => TestStatus::Fail,
            CaseOutcome::Skipped => TestStatus::Todo,
        }
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.time_secs
            .filter(|t| t.is_finite() && *t >= 0.0)
            .map(|t| (t * 1000.0).round() as u64)
    }

    /// Identity built from `classname::name`, falling back to the suite name.
    pub fn identity(&self) -> TestIdentity {
        let scope = self.classname.as_deref().unwrap_or(&self.suite);
        if scope.is_empty() {
            TestIdentity::from_node_id(&self.name)
        } else {
            TestIdentity::from_node_id(&format!("{scope}::{}", self.name))
        }
    }

    /// Failure message, or the first line of the details when there is none.
    pub fn error_message(&self) -> Option<String> {
        self.message.clone().or_else(|| {
            self.details
                .as_deref()
                .and_then(|d| d.lines().next())
                .map(str::to_string)
        })
    }

    pub fn to_result(&self) -> Option<TestResult> {
        let key = self.test_key()?;
        let mut result = TestResult::new(key, self.status());
        if let Some(ms) = self.duration_ms() {
            result = result.with_duration_ms(ms);
        }
        let comment = match self.outcome {
            CaseOutcome::Passed => None,
            CaseOutcome::Skipped => Some(match self.error_message() {
                Some(m) => format!("Skipped: {m}"),
                None => "Skipped".to_string(),
            }),
            CaseOutcome::Failed | CaseOutcome::Errored => self.error_message(),
        };
        if let Some(c) = comment {
            result = result.with_comment(c);
        }
        Some(result)
    }

    /// Runner outcome for failing cases fed through the reporting chain.
    pub fn to_outcome(&self) -> TestOutcome {
        let identity = self.identity();
        let mut outcome = match self.outcome {
            CaseOutcome::Passed => TestOutcome::passed(identity),
            CaseOutcome::Skipped => TestOutcome::skipped(identity),
            CaseOutcome::Failed | CaseOutcome::Errored => TestOutcome::failed(
                identity,
                self.error_message().unwrap_or_default(),
            ),
        };
        if let Some(trace) = &self.details {
            outcome = outcome.with_stack_trace(trace.clone());
        }
        if let Some(ms) = self.duration_ms() {
            outcome = outcome.with_duration_ms(ms);
        }
        outcome
    }
}

/// Results for mappable cases plus the names of the dropped ones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mapping {
    pub results: Vec<TestResult>,
    pub dropped: Vec<String>,
}

pub fn map_results(report: &JunitReport) -> Mapping {
    let mut mapping = Mapping::default();
    for case in &report.cases {
        match case.to_result() {
            Some(r) => mapping.results.push(r),
            None => {
                warn!(test = %case.name, "no test key on JUnit case, dropping it");
                mapping.dropped.push(case.name.clone());
            }
        }
    }
    mapping
}

/// Pull test keys for an execution from a report, deduplicated in report order.
pub fn test_keys(report: &JunitReport) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for key in report.cases.iter().filter_map(JunitCase::test_key) {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

pub fn parse_file(path: &Path) -> anyhow::Result<JunitReport> {
    let xml = std::fs::read_to_string(path)
        .with_context(|| format!("read JUnit report {}", path.display()))?;
    parse_str(&xml).with_context(|| format!("parse JUnit report {}", path.display()))
}
