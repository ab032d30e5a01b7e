//! Xray test-management client.
//!
//! Cloud mode talks to the Xray cloud API with a bearer token obtained from
//! client credentials. Server mode rides on the Jira client: executions are
//! ordinary issues and results go through the Raven REST API.

pub mod payload;

use anyhow::{Context, Result};
use faultline_config::FaultlineConfig;
use faultline_error::TrackerError;
use faultline_jira::{JiraClient, decode};
use faultline_ports::{IssueTracker, TestManagement, TrackerResult};
use faultline_schema::execution::{TestExecution, TestResult, TestStatus};
use faultline_schema::ticket::IssueFields;
use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder, Response, multipart};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

pub use payload::content_type_for;

/// Issue type of server-side executions.
pub const EXECUTION_ISSUE_TYPE: &str = "Test Execution";

const RAVEN: &str = "/rest/raven/1.0/api";

enum Mode {
    Cloud {
        base_url: String,
        client_id: String,
        client_secret: String,
        token: Mutex<Option<String>>,
    },
    Server,
}

/// Test-management client bound to the Jira project of `jira`.
pub struct XrayClient {
    jira: JiraClient,
    mode: Mode,
    http: Client,
    test_execution_type_field: Option<String>,
}

impl fmt::Debug for XrayClient {
    #[mutants::skip]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match &self.mode {
            Mode::Cloud { base_url, .. } => format!("cloud({base_url})"),
            Mode::Server => "server".to_string(),
        };
        f.debug_struct("XrayClient")
            .field("jira", &self.jira)
            .field("mode", &mode)
            .finish()
    }
}

/// A test attached to an execution, as listed by the test-management API.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ExecutionTest {
    #[serde(alias = "testKey")]
    pub key: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Deserialize)]
struct CreatedExecution {
    key: String,
}

#[derive(Deserialize)]
struct CloudExecutionTests {
    #[serde(default)]
    tests: Vec<ExecutionTest>,
}

impl XrayClient {
    /// Server/DC mode: every call goes through the Jira base URL and credentials.
    pub fn server(jira: JiraClient) -> Self {
        Self {
            http: jira.http_client().clone(),
            jira,
            mode: Mode::Server,
            test_execution_type_field: None,
        }
    }

    /// Cloud mode. Authentication is deferred until the first call.
    ///
    /// Cloud calls share the Jira client's HTTP client and so its timeout.
    pub fn cloud(
        jira: JiraClient,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http: jira.http_client().clone(),
            jira,
            mode: Mode::Cloud {
                base_url: faultline_config::XrayConfig::default().cloud_base_url,
                client_id: client_id.into(),
                client_secret: client_secret.into(),
                token: Mutex::new(None),
            },
            test_execution_type_field: None,
        }
    }

    pub fn with_cloud_base_url(mut self, url: impl Into<String>) -> Self {
        if let Mode::Cloud { base_url, .. } = &mut self.mode {
            *base_url = url.into().trim_end_matches('/').to_string();
        }
        self
    }

    /// HTTP client for cloud calls. Server calls use the Jira client's.
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_test_execution_type_field(mut self, field: impl Into<String>) -> Self {
        self.test_execution_type_field = Some(field.into());
        self
    }

    /// `None` when the integration is disabled or incomplete.
    pub fn from_config(config: &FaultlineConfig) -> Result<Option<Self>> {
        if !config.xray_usable() {
            debug!("xray integration not usable, skipping client");
            return Ok(None);
        }
        let jira = JiraClient::from_config(&config.jira).context("build Jira client for Xray")?;
        let xray = &config.xray;
        let mut client = if xray.cloud {
            Self::cloud(jira, xray.client_id.clone(), xray.client_secret.clone())
                .with_cloud_base_url(xray.cloud_base_url.clone())
        } else {
            Self::server(jira)
        };
        if let Some(field) = &xray.test_execution_type_field {
            client = client.with_test_execution_type_field(field.clone());
        }
        Ok(Some(client))
    }

    pub fn is_cloud(&self) -> bool {
        matches!(self.mode, Mode::Cloud { .. })
    }

    /// Tests attached to an execution.
    pub fn get_tests_by_execution(&self, execution_key: &str) -> TrackerResult<Vec<ExecutionTest>> {
        match &self.mode {
            Mode::Cloud { base_url, .. } => {
                let req = self
                    .cloud_request(Method::GET, &format!("{base_url}/testexecutions/{execution_key}/tests"))?;
                let found: CloudExecutionTests =
                    decode(self.send(req, "get_tests_by_execution")?, "get_tests_by_execution")?;
                Ok(found.tests)
            }
            Mode::Server => {
                let req = self
                    .jira
                    .request(Method::GET, &format!("{RAVEN}/testexec/{execution_key}/test"));
                decode(
                    self.jira.execute(req, "get_tests_by_execution")?,
                    "get_tests_by_execution",
                )
            }
        }
    }

    fn token(&self) -> TrackerResult<String> {
        let Mode::Cloud {
            base_url,
            client_id,
            client_secret,
            token,
        } = &self.mode
        else {
            return Err(TrackerError::Validation {
                field: None,
                message: "bearer token requested in server mode".into(),
            });
        };
        let mut cached = token.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(t) = cached.as_ref() {
            return Ok(t.clone());
        }
        let req = self
            .http
            .post(format!("{base_url}/authenticate"))
            .json(&json!({ "client_id": client_id, "client_secret": client_secret }));
        let body = self.send(req, "authenticate")?.text()?;
        let fresh = body.trim().trim_matches('"').to_string();
        if fresh.is_empty() {
            return Err(TrackerError::Decode("authenticate: empty token".into()));
        }
        debug!("xray cloud token acquired");
        *cached = Some(fresh.clone());
        Ok(fresh)
    }

    fn cloud_request(&self, method: Method, url: &str) -> TrackerResult<RequestBuilder> {
        let token = self.token()?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token)
            .header("Accept", "application/json"))
    }

    fn send(&self, req: RequestBuilder, what: &str) -> TrackerResult<Response> {
        debug!(call = what, "xray request");
        let resp = req.send()?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        debug!(call = what, status = status.as_u16(), "xray request failed");
        Err(TrackerError::from_status(status.as_u16(), &body))
    }

    fn create_server_execution(
        &self,
        summary: &str,
        description: &str,
        test_keys: &[String],
    ) -> TrackerResult<String> {
        let mut fields = IssueFields::new(summary, description, EXECUTION_ISSUE_TYPE);
        if let Some(field) = &self.test_execution_type_field {
            fields
                .custom_fields
                .insert(field.clone(), json!({ "value": "automation" }));
        }
        let issue = self.jira.create_issue(&fields)?;
        if !test_keys.is_empty() {
            let req = self
                .jira
                .request(Method::POST, &format!("{RAVEN}/testexec/{}/test", issue.key))
                .json(&json!({ "add": test_keys }));
            self.jira.execute(req, "add_tests_to_execution")?;
        }
        Ok(issue.key)
    }

    fn upload_server_evidence(&self, execution_key: &str, result: &TestResult) {
        for path in &result.evidence {
            let form = match multipart::Form::new().file("file", path) {
                Ok(form) => form,
                Err(e) => {
                    warn!(test = %result.test_key, path = %path.display(), error = %e, "evidence unreadable, skipping");
                    continue;
                }
            };
            let req = self
                .jira
                .request(
                    Method::POST,
                    &format!("{RAVEN}/testexec/{execution_key}/test/{}/attachment", result.test_key),
                )
                .header("X-Atlassian-Token", "no-check")
                .multipart(form);
            if let Err(e) = self.jira.execute(req, "upload_evidence") {
                warn!(test = %result.test_key, error = %e, "evidence upload failed");
            }
        }
    }
}

impl TestManagement for XrayClient {
    fn create_execution(
        &self,
        summary: &str,
        description: &str,
        test_keys: &[String],
    ) -> TrackerResult<TestExecution> {
        let key = match &self.mode {
            Mode::Cloud { base_url, .. } => {
                let body = payload::cloud_execution_payload(
                    self.jira.project_key(),
                    summary,
                    description,
                    test_keys,
                );
                let req = self
                    .cloud_request(Method::POST, &format!("{base_url}/import/execution"))?
                    .json(&body);
                let created: CreatedExecution =
                    decode(self.send(req, "create_execution")?, "create_execution")?;
                created.key
            }
            Mode::Server => self.create_server_execution(summary, description, test_keys)?,
        };
        info!(execution = %key, tests = test_keys.len(), "test execution created");
        let mut execution = TestExecution::new(key);
        execution.results = test_keys
            .iter()
            .map(|k| TestResult::new(k.clone(), TestStatus::Todo))
            .collect();
        Ok(execution)
    }

    fn report_results(&self, execution_key: &str, results: &[TestResult]) -> TrackerResult<()> {
        if results.is_empty() {
            debug!(execution = execution_key, "no results to report");
            return Ok(());
        }
        match &self.mode {
            Mode::Cloud { base_url, .. } => {
                let body = payload::cloud_results_payload(execution_key, results)?;
                let req = self
                    .cloud_request(Method::POST, &format!("{base_url}/import/execution/results"))?
                    .json(&body);
                self.send(req, "report_results")?;
            }
            Mode::Server => {
                let req = self
                    .jira
                    .request(Method::POST, &format!("{RAVEN}/testexec/{execution_key}/results"))
                    .json(&payload::server_results_payload(results));
                self.jira.execute(req, "report_results")?;
                for result in results.iter().filter(|r| !r.evidence.is_empty()) {
                    self.upload_server_evidence(execution_key, result);
                }
            }
        }
        info!(execution = execution_key, results = results.len(), "test results reported");
        Ok(())
    }
}

/// Outcome of a JUnit import.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JunitImport {
    /// Execution the results went to; `None` when nothing was mappable.
    pub execution: Option<TestExecution>,
    /// Names of test cases without a test key.
    pub dropped: Vec<String>,
}

/// Parse a JUnit report and push its mappable results.
///
/// Results go to `execution_key` when given, otherwise to a fresh execution
/// holding exactly the mapped keys.
pub fn import_junit(
    mgmt: &dyn TestManagement,
    path: &Path,
    execution_key: Option<&str>,
) -> Result<JunitImport> {
    let report = faultline_junit::parse_file(path)?;
    let mapping = faultline_junit::map_results(&report);
    if mapping.results.is_empty() {
        warn!(
            path = %path.display(),
            dropped = mapping.dropped.len(),
            "no JUnit case carries a test key, nothing imported"
        );
        return Ok(JunitImport {
            execution: None,
            dropped: mapping.dropped,
        });
    }

    let mut execution = match execution_key {
        Some(key) => TestExecution::new(key),
        None => {
            let keys = faultline_junit::test_keys(&report);
            let summary = format!(
                "Automated Test Execution - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
            );
            mgmt.create_execution(&summary, "Test results imported from JUnit XML report", &keys)
                .context("create test execution")?
        }
    };
    mgmt.report_results(&execution.key, &mapping.results)
        .with_context(|| format!("report results to {}", execution.key))?;
    execution.results = mapping.results;

    Ok(JunitImport {
        execution: Some(execution),
        dropped: mapping.dropped,
    })
}
