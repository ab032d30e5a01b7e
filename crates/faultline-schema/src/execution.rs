use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Result status as understood by the test-management layer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Pass,
    Fail,
    Todo,
    Executing,
    Aborted,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Todo => "TODO",
            Self::Executing => "EXECUTING",
            Self::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One test's result inside an execution.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    /// Test-management issue key, e.g. `QA-17`.
    pub test_key: String,
    pub status: TestStatus,
    pub comment: Option<String>,
    /// Files to attach as evidence.
    #[serde(default)]
    pub evidence: Vec<PathBuf>,
    pub duration_ms: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TestResult {
    pub fn new(test_key: impl Into<String>, status: TestStatus) -> Self {
        Self {
            test_key: test_key.into(),
            status,
            comment: None,
            evidence: Vec::new(),
            duration_ms: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }
}

/// A test-management record aggregating the results of one run.
///
/// Results are appended while the run is in flight. After the run ends the
/// execution is treated as immutable.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TestExecution {
    pub key: String,
    #[serde(default)]
    pub results: Vec<TestResult>,
}

impl TestExecution {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            results: Vec::new(),
        }
    }

    pub fn test_keys(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.test_key.as_str()).collect()
    }
}
