//! In-memory implementations of the faultline ports.
//!
//! State sits behind a `Mutex` so one fake can be shared by several worker
//! threads in contention tests.

use anyhow::anyhow;
use faultline_error::TrackerError;
use faultline_ports::{FailureAnalyzer, IssueTracker, TestManagement, TrackerResult};
use faultline_schema::analysis::{AnalysisRequest, FailureAnalysis};
use faultline_schema::execution::{TestExecution, TestResult};
use faultline_schema::ticket::{
    Attachment, IssueFields, StatusCategory, Ticket, TicketStatus, Transition,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Tracker operations that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackerOp {
    Create,
    Update,
    Get,
    Search,
    Link,
    Comment,
    Upload,
    Transition,
    CreateExecution,
    ReportResults,
}

type ErrorFactory = fn() -> TrackerError;

#[derive(Default)]
struct TrackerState {
    tickets: Vec<Ticket>,
    created: Vec<IssueFields>,
    links: Vec<(String, String, String, Option<String>)>,
    comments: Vec<(String, String)>,
    uploads: Vec<(String, PathBuf)>,
    transitions: Vec<(String, String)>,
    searches: Vec<String>,
    calls: Vec<TrackerOp>,
    failures: HashMap<TrackerOp, ErrorFactory>,
}

/// Issue tracker that keeps tickets in memory and honors the duplicate JQL.
pub struct FakeTracker {
    project: String,
    state: Mutex<TrackerState>,
}

impl Default for FakeTracker {
    fn default() -> Self {
        Self::new("QA")
    }
}

impl FakeTracker {
    pub fn new(project: &str) -> Self {
        Self {
            project: project.to_string(),
            state: Mutex::new(TrackerState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every call of `op` fail with the error `make` builds.
    pub fn fail(&self, op: TrackerOp, make: ErrorFactory) {
        self.state().failures.insert(op, make);
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Seed an existing ticket.
    pub fn insert(&self, ticket: Ticket) {
        self.state().tickets.push(ticket);
    }

    pub fn set_category(&self, key: &str, category: StatusCategory) {
        let mut state = self.state();
        if let Some(t) = state.tickets.iter_mut().find(|t| t.key == key) {
            t.status = TicketStatus::new(format!("{category:?}"), category);
        }
    }

    pub fn tickets(&self) -> Vec<Ticket> {
        self.state().tickets.clone()
    }

    pub fn open_tickets_with_label(&self, label: &str) -> Vec<Ticket> {
        self.tickets()
            .into_iter()
            .filter(|t| t.is_open() && t.labels.iter().any(|l| l == label))
            .collect()
    }

    pub fn created(&self) -> Vec<IssueFields> {
        self.state().created.clone()
    }

    /// `(link type, inward, outward, comment)` in call order.
    pub fn links(&self) -> Vec<(String, String, String, Option<String>)> {
        self.state().links.clone()
    }

    pub fn comments(&self) -> Vec<(String, String)> {
        self.state().comments.clone()
    }

    pub fn uploads(&self) -> Vec<(String, PathBuf)> {
        self.state().uploads.clone()
    }

    pub fn searches(&self) -> Vec<String> {
        self.state().searches.clone()
    }

    pub fn calls(&self) -> Vec<TrackerOp> {
        self.state().calls.clone()
    }

    fn enter(&self, op: TrackerOp) -> TrackerResult<std::sync::MutexGuard<'_, TrackerState>> {
        let mut state = self.state();
        state.calls.push(op);
        if let Some(make) = state.failures.get(&op) {
            return Err(make());
        }
        Ok(state)
    }
}

/// Pull every `labels = "..."` clause out of a JQL string.
fn jql_labels(jql: &str) -> Vec<String> {
    let mut labels = Vec::new();
    let mut rest = jql;
    while let Some(pos) = rest.find("labels = \"") {
        let after = &rest[pos + "labels = \"".len()..];
        match after.find('"') {
            Some(end) => {
                labels.push(after[..end].to_string());
                rest = &after[end..];
            }
            None => break,
        }
    }
    labels
}

impl IssueTracker for FakeTracker {
    fn create_issue(&self, fields: &IssueFields) -> TrackerResult<Ticket> {
        let mut state = self.enter(TrackerOp::Create)?;
        let key = format!("{}-{}", self.project, state.tickets.len() + 1);
        let ticket = Ticket {
            key: key.clone(),
            summary: fields.summary.clone(),
            description: Some(fields.description.clone()),
            priority: fields.priority.clone(),
            labels: fields.labels.clone(),
            components: fields.components.clone(),
            status: TicketStatus::open(),
            url: Some(self.browse_url(&key)),
        };
        state.tickets.push(ticket.clone());
        state.created.push(fields.clone());
        Ok(ticket)
    }

    fn update_issue(&self, key: &str, _fields: &serde_json::Value) -> TrackerResult<()> {
        let state = self.enter(TrackerOp::Update)?;
        if state.tickets.iter().any(|t| t.key == key) {
            Ok(())
        } else {
            Err(TrackerError::NotFound(key.to_string()))
        }
    }

    fn get_issue(&self, key: &str) -> TrackerResult<Ticket> {
        let state = self.enter(TrackerOp::Get)?;
        state
            .tickets
            .iter()
            .find(|t| t.key == key)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(key.to_string()))
    }

    fn search_issues(&self, jql: &str, max_results: u32) -> TrackerResult<Vec<Ticket>> {
        let mut state = self.enter(TrackerOp::Search)?;
        state.searches.push(jql.to_string());
        let labels = jql_labels(jql);
        let open_only = jql.contains("statusCategory != Done");
        Ok(state
            .tickets
            .iter()
            .filter(|t| labels.iter().all(|l| t.labels.contains(l)))
            .filter(|t| !open_only || t.is_open())
            .take(max_results as usize)
            .cloned()
            .collect())
    }

    fn link_issues(
        &self,
        link_type: &str,
        inward: &str,
        outward: &str,
        comment: Option<&str>,
    ) -> TrackerResult<()> {
        let mut state = self.enter(TrackerOp::Link)?;
        state.links.push((
            link_type.to_string(),
            inward.to_string(),
            outward.to_string(),
            comment.map(str::to_string),
        ));
        Ok(())
    }

    fn add_comment(&self, key: &str, body: &str) -> TrackerResult<()> {
        let mut state = self.enter(TrackerOp::Comment)?;
        state.comments.push((key.to_string(), body.to_string()));
        Ok(())
    }

    fn upload_attachment(&self, key: &str, path: &Path) -> TrackerResult<Vec<Attachment>> {
        let mut state = self.enter(TrackerOp::Upload)?;
        let size = std::fs::metadata(path)?.len();
        state.uploads.push((key.to_string(), path.to_path_buf()));
        Ok(vec![Attachment {
            id: state.uploads.len().to_string(),
            filename: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: Some(size),
        }])
    }

    fn transition_issue(&self, key: &str, transition_id: &str) -> TrackerResult<()> {
        let mut state = self.enter(TrackerOp::Transition)?;
        state
            .transitions
            .push((key.to_string(), transition_id.to_string()));
        if transition_id == "31"
            && let Some(t) = state.tickets.iter_mut().find(|t| t.key == key)
        {
            t.status = TicketStatus::new("Done", StatusCategory::Done);
        }
        Ok(())
    }

    fn get_available_transitions(&self, _key: &str) -> TrackerResult<Vec<Transition>> {
        self.enter(TrackerOp::Transition)?;
        Ok(vec![Transition {
            id: "31".into(),
            name: "Done".into(),
            to: Some("Done".into()),
        }])
    }

    fn project_key(&self) -> &str {
        &self.project
    }

    fn browse_url(&self, key: &str) -> String {
        format!("https://tracker.test/browse/{key}")
    }
}

#[derive(Default)]
struct ManagementState {
    executions: Vec<TestExecution>,
    reported: Vec<(String, Vec<TestResult>)>,
    failures: HashMap<TrackerOp, ErrorFactory>,
}

/// Test management that records executions and reported results.
#[derive(Default)]
pub struct FakeManagement {
    state: Mutex<ManagementState>,
}

impl FakeManagement {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ManagementState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail(&self, op: TrackerOp, make: ErrorFactory) {
        self.state().failures.insert(op, make);
    }

    pub fn executions(&self) -> Vec<TestExecution> {
        self.state().executions.clone()
    }

    /// `(execution key, results)` per `report_results` call.
    pub fn reported(&self) -> Vec<(String, Vec<TestResult>)> {
        self.state().reported.clone()
    }
}

impl TestManagement for FakeManagement {
    fn create_execution(
        &self,
        _summary: &str,
        _description: &str,
        test_keys: &[String],
    ) -> TrackerResult<TestExecution> {
        let mut state = self.state();
        if let Some(make) = state.failures.get(&TrackerOp::CreateExecution) {
            return Err(make());
        }
        let mut exec = TestExecution::new(format!("QA-{}", 900 + state.executions.len()));
        exec.results = test_keys
            .iter()
            .map(|k| {
                TestResult::new(k.clone(), faultline_schema::execution::TestStatus::Todo)
            })
            .collect();
        state.executions.push(exec.clone());
        Ok(exec)
    }

    fn report_results(&self, execution_key: &str, results: &[TestResult]) -> TrackerResult<()> {
        let mut state = self.state();
        if let Some(make) = state.failures.get(&TrackerOp::ReportResults) {
            return Err(make());
        }
        state
            .reported
            .push((execution_key.to_string(), results.to_vec()));
        Ok(())
    }
}

/// Analyzer returning a canned root cause, or failing.
pub struct FakeAnalyzer {
    root_cause: Option<String>,
    requests: Mutex<Vec<AnalysisRequest>>,
}

impl FakeAnalyzer {
    pub fn answering(root_cause: &str) -> Self {
        Self {
            root_cause: Some(root_cause.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            root_cause: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl FailureAnalyzer for FakeAnalyzer {
    fn analyze(&self, request: &AnalysisRequest) -> anyhow::Result<FailureAnalysis> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        match &self.root_cause {
            Some(cause) => Ok(FailureAnalysis {
                root_cause: cause.clone(),
                suggested_fixes: vec!["Wait for navigation before asserting".into()],
                prevention_strategies: vec![],
            }),
            None => Err(anyhow!("AI provider unavailable")),
        }
    }
}
