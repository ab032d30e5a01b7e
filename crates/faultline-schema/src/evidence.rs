use chrono::{DateTime, Utc};
use faultline_ids::TestIdentity;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome reported by the test runner for a single test.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
}

/// Per-test outcome event emitted by the runner.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TestOutcome {
    pub identity: TestIdentity,
    pub outcome: Outcome,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,
    /// Source of the failing test, when the runner can provide it.
    pub source_snippet: Option<String>,
    pub duration_ms: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TestOutcome {
    pub fn passed(identity: TestIdentity) -> Self {
        Self::new(identity, Outcome::Passed)
    }

    pub fn failed(identity: TestIdentity, error_message: impl Into<String>) -> Self {
        let mut out = Self::new(identity, Outcome::Failed);
        out.error_message = Some(error_message.into());
        out
    }

    pub fn skipped(identity: TestIdentity) -> Self {
        Self::new(identity, Outcome::Skipped)
    }

    fn new(identity: TestIdentity, outcome: Outcome) -> Self {
        Self {
            identity,
            outcome,
            error_message: None,
            stack_trace: None,
            source_snippet: None,
            duration_ms: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.stack_trace = Some(trace.into());
        self
    }

    pub fn with_source_snippet(mut self, source: impl Into<String>) -> Self {
        self.source_snippet = Some(source.into());
        self
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }
}

/// Evidence gathered for one failing invocation.
///
/// Built fresh per failure and dropped once the ticket is created or skipped.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FailureEvidence {
    pub error_message: String,
    pub stack_trace: Option<String>,
    pub source_snippet: Option<String>,
    pub screenshot_path: Option<PathBuf>,
    pub ai_root_cause: Option<String>,
}

impl FailureEvidence {
    pub fn from_outcome(outcome: &TestOutcome) -> Self {
        Self {
            error_message: outcome
                .error_message
                .clone()
                .unwrap_or_else(|| "Test failed without an error message".to_string()),
            stack_trace: outcome.stack_trace.clone(),
            source_snippet: outcome.source_snippet.clone(),
            screenshot_path: None,
            ai_root_cause: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_copies_outcome_text() {
        let outcome = TestOutcome::failed(
            TestIdentity::new("tests/auth.rs", "test_login"),
            "AssertionError: expected '/dashboard'",
        )
        .with_stack_trace("at tests/auth.rs:42");
        let ev = FailureEvidence::from_outcome(&outcome);
        assert_eq!(ev.error_message, "AssertionError: expected '/dashboard'");
        assert_eq!(ev.stack_trace.as_deref(), Some("at tests/auth.rs:42"));
        assert!(ev.screenshot_path.is_none());
    }

    #[test]
    fn evidence_has_placeholder_message() {
        let outcome = TestOutcome::skipped(TestIdentity::new("s", "t"));
        let ev = FailureEvidence::from_outcome(&outcome);
        assert!(ev.error_message.contains("without an error message"));
    }
}
