use anyhow::Result;
use faultline_error::TrackerError;
use faultline_schema::analysis::{AnalysisRequest, FailureAnalysis};
use faultline_schema::execution::{TestExecution, TestResult};
use faultline_schema::ticket::{Attachment, IssueFields, Ticket, Transition};
use std::path::Path;

/// Result type for tracker and test-management calls.
pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// Issue-tracker operations faultline needs.
///
/// Adapters live in `faultline-jira`. Every call is a single blocking attempt.
pub trait IssueTracker {
    fn create_issue(&self, fields: &IssueFields) -> TrackerResult<Ticket>;

    /// `fields` is a JSON object of tracker field id → value.
    fn update_issue(&self, key: &str, fields: &serde_json::Value) -> TrackerResult<()>;

    fn get_issue(&self, key: &str) -> TrackerResult<Ticket>;

    fn search_issues(&self, jql: &str, max_results: u32) -> TrackerResult<Vec<Ticket>>;

    /// Link `inward` to `outward` with the named link type (e.g. "Relates", "Tests").
    fn link_issues(
        &self,
        link_type: &str,
        inward: &str,
        outward: &str,
        comment: Option<&str>,
    ) -> TrackerResult<()>;

    fn add_comment(&self, key: &str, body: &str) -> TrackerResult<()>;

    fn upload_attachment(&self, key: &str, path: &Path) -> TrackerResult<Vec<Attachment>>;

    fn transition_issue(&self, key: &str, transition_id: &str) -> TrackerResult<()>;

    fn get_available_transitions(&self, key: &str) -> TrackerResult<Vec<Transition>>;

    /// Project new tickets are filed in.
    fn project_key(&self) -> &str;

    /// Human-facing URL of an issue.
    fn browse_url(&self, key: &str) -> String;
}

/// Test-management operations layered on the tracker.
///
/// Adapters live in `faultline-xray`.
pub trait TestManagement {
    fn create_execution(
        &self,
        summary: &str,
        description: &str,
        test_keys: &[String],
    ) -> TrackerResult<TestExecution>;

    fn report_results(&self, execution_key: &str, results: &[TestResult]) -> TrackerResult<()>;
}

/// Root-cause analysis of failures.
///
/// Optional collaborator: the reporter only holds one when the AI capability
/// probe succeeded at startup.
pub trait FailureAnalyzer {
    fn analyze(&self, request: &AnalysisRequest) -> Result<FailureAnalysis>;
}

/// Something that can take a screenshot of the system under test.
///
/// Supplied per test by UI suites; API and DB tests pass none.
pub trait ScreenshotSource {
    fn capture(&self) -> Result<Vec<u8>>;
}

impl<F> ScreenshotSource for F
where
    F: Fn() -> Result<Vec<u8>>,
{
    fn capture(&self) -> Result<Vec<u8>> {
        self()
    }
}
