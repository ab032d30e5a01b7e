//! Cloud and server round trips against a local stub server, plus JUnit import.

use faultline_error::ErrorCategory;
use faultline_jira::JiraClient;
use faultline_ports::TestManagement;
use faultline_schema::execution::{TestResult, TestStatus};
use faultline_testkit::FakeManagement;
use faultline_testkit::http::{StubResponse, StubServer};
use faultline_xray::{XrayClient, import_junit};
use reqwest::blocking::Client;
use std::time::{Duration, Instant};

fn http() -> Client {
    Client::builder().no_proxy().build().unwrap()
}

fn jira_at(url: &str) -> JiraClient {
    JiraClient::new(url, "qa@acme.test", "secret", "QA")
        .unwrap()
        .with_http_client(http())
}

fn cloud_client(server: &StubServer) -> XrayClient {
    XrayClient::cloud(jira_at("https://acme.atlassian.net"), "id-1", "shh")
        .with_cloud_base_url(format!("{}/api/v2/", server.url()))
        .with_http_client(http())
}

#[test]
fn cloud_authenticates_once_and_uses_bearer() {
    let server = StubServer::start(vec![
        StubResponse::json(200, r#""tok-123""#),
        StubResponse::json(200, r#"{"id":"10100","key":"QA-101","self":"x"}"#),
        StubResponse::json(200, r#"{"id":"10100","key":"QA-101"}"#),
    ]);
    let xray = cloud_client(&server);

    let exec = xray
        .create_execution("Nightly", "run 42", &["QA-17".to_string()])
        .unwrap();
    assert_eq!(exec.key, "QA-101");
    assert_eq!(exec.test_keys(), vec!["QA-17"]);
    xray.report_results(
        "QA-101",
        &[TestResult::new("QA-17", TestStatus::Pass).with_comment("ok")],
    )
    .unwrap();

    let reqs = server.requests();
    assert_eq!(reqs.len(), 3);
    assert_eq!(reqs[0].path(), "/api/v2/authenticate");
    assert_eq!(reqs[0].json()["client_id"], "id-1");
    assert_eq!(reqs[1].path(), "/api/v2/import/execution");
    assert_eq!(reqs[1].header("authorization"), Some("Bearer tok-123"));
    assert_eq!(reqs[1].json()["info"]["project"], "QA");
    assert_eq!(reqs[2].path(), "/api/v2/import/execution/results");
    assert_eq!(reqs[2].header("authorization"), Some("Bearer tok-123"));
    assert_eq!(reqs[2].json()["tests"][0]["status"], "PASS");
}

#[test]
fn cloud_bad_credentials_are_fatal() {
    let server = StubServer::start(vec![StubResponse::json(
        401,
        r#"{"error":"Authentication failed. Invalid client credentials!"}"#,
    )]);
    let xray = cloud_client(&server);
    let err = xray.create_execution("s", "d", &[]).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Authentication);
    assert!(err.is_fatal());
}

#[test]
fn cloud_calls_use_the_jira_timeout() {
    let server = StubServer::start(vec![
        StubResponse::json(200, r#""tok-123""#).delayed(Duration::from_secs(5)),
    ]);
    let jira = JiraClient::new("https://acme.atlassian.net", "qa@acme.test", "secret", "QA")
        .unwrap()
        .with_http_client(
            Client::builder()
                .no_proxy()
                .timeout(Duration::from_millis(200))
                .build()
                .unwrap(),
        );
    let xray = XrayClient::cloud(jira, "id-1", "shh")
        .with_cloud_base_url(format!("{}/api/v2", server.url()));

    let started = Instant::now();
    let err = xray.create_execution("s", "d", &[]).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Transient);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn empty_results_make_no_call() {
    let server = StubServer::start(vec![]);
    let xray = cloud_client(&server);
    xray.report_results("QA-101", &[]).unwrap();
    assert!(server.requests().is_empty());
}

#[test]
fn server_execution_is_an_issue_with_tests_added() {
    let server = StubServer::start(vec![
        StubResponse::json(201, r#"{"id":"1","key":"QA-200"}"#),
        StubResponse::empty(200),
    ]);
    let xray = XrayClient::server(jira_at(&server.url()))
        .with_test_execution_type_field("customfield_10200");

    let exec = xray
        .create_execution("Nightly", "run 42", &["QA-17".into(), "QA-18".into()])
        .unwrap();
    assert_eq!(exec.key, "QA-200");

    let reqs = server.requests();
    assert_eq!(reqs[0].path(), "/rest/api/3/issue");
    let fields = &reqs[0].json()["fields"];
    assert_eq!(fields["issuetype"]["name"], "Test Execution");
    assert_eq!(fields["customfield_10200"]["value"], "automation");
    assert_eq!(reqs[1].path(), "/rest/raven/1.0/api/testexec/QA-200/test");
    assert_eq!(reqs[1].json()["add"][1], "QA-18");
    assert!(reqs[1].header("authorization").unwrap().starts_with("Basic "));
}

#[test]
fn server_results_then_evidence_per_test() {
    let dir = tempfile::tempdir().unwrap();
    let shot = dir.path().join("main__login__1.png");
    std::fs::write(&shot, b"png").unwrap();

    let server = StubServer::start(vec![
        StubResponse::empty(200),
        StubResponse::json(500, r#"{"error":"disk full"}"#),
    ]);
    let xray = XrayClient::server(jira_at(&server.url()));

    let mut failed = TestResult::new("QA-17", TestStatus::Fail).with_comment("boom");
    failed.evidence.push(shot);
    // evidence upload failure is logged, not returned
    xray.report_results(
        "QA-200",
        &[TestResult::new("QA-18", TestStatus::Pass), failed],
    )
    .unwrap();

    let reqs = server.requests();
    assert_eq!(reqs[0].path(), "/rest/raven/1.0/api/testexec/QA-200/results");
    assert_eq!(reqs[0].json()[1]["comment"], "boom");
    assert_eq!(
        reqs[1].path(),
        "/rest/raven/1.0/api/testexec/QA-200/test/QA-17/attachment"
    );
    assert_eq!(reqs[1].header("x-atlassian-token"), Some("no-check"));
}

#[test]
fn server_lists_tests_of_execution() {
    let server = StubServer::start(vec![StubResponse::json(
        200,
        r#"[{"id":1,"key":"QA-17","status":"FAIL"},{"id":2,"key":"QA-18","status":"PASS"}]"#,
    )]);
    let xray = XrayClient::server(jira_at(&server.url()));
    let tests = xray.get_tests_by_execution("QA-200").unwrap();
    assert_eq!(tests.len(), 2);
    assert_eq!(tests[0].key, "QA-17");
    assert_eq!(tests[1].status, "PASS");
}

const REPORT: &str = r#"<testsuites>
  <testsuite name="auth">
    <testcase classname="tests.auth" name="test_login_QA-17" time="1.2">
      <failure message="expected 200">trace</failure>
    </testcase>
    <testcase classname="tests.auth" name="test_logout">
      <properties><property name="test_key" value="QA-18"/></properties>
    </testcase>
    <testcase classname="tests.auth" name="test_unmapped"/>
  </testsuite>
</testsuites>"#;

fn write_report(xml: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("junit.xml"), xml).unwrap();
    dir
}

#[test]
fn import_creates_execution_for_mapped_keys() {
    let dir = write_report(REPORT);
    let mgmt = FakeManagement::new();

    let import = import_junit(&mgmt, &dir.path().join("junit.xml"), None).unwrap();

    let exec = import.execution.unwrap();
    assert_eq!(exec.key, "QA-900");
    assert_eq!(import.dropped, vec!["test_unmapped".to_string()]);
    assert_eq!(mgmt.executions()[0].test_keys(), vec!["QA-17", "QA-18"]);

    let reported = mgmt.reported();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].0, "QA-900");
    let statuses: Vec<_> = reported[0].1.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![TestStatus::Fail, TestStatus::Pass]);
}

#[test]
fn import_into_supplied_execution() {
    let dir = write_report(REPORT);
    let mgmt = FakeManagement::new();
    let import = import_junit(&mgmt, &dir.path().join("junit.xml"), Some("QA-100")).unwrap();
    assert_eq!(import.execution.unwrap().key, "QA-100");
    assert!(mgmt.executions().is_empty());
    assert_eq!(mgmt.reported()[0].0, "QA-100");
}

#[test]
fn import_with_nothing_mappable_sends_nothing() {
    let dir = write_report(
        r#"<testsuite name="s"><testcase name="a"/><testcase name="b"><skipped/></testcase></testsuite>"#,
    );
    let mgmt = FakeManagement::new();
    let import = import_junit(&mgmt, &dir.path().join("junit.xml"), None).unwrap();
    assert!(import.execution.is_none());
    assert_eq!(import.dropped.len(), 2);
    assert!(mgmt.executions().is_empty());
    assert!(mgmt.reported().is_empty());
}

#[test]
fn import_missing_file_is_an_error() {
    let mgmt = FakeManagement::new();
    let err = import_junit(&mgmt, std::path::Path::new("/nope/junit.xml"), None).unwrap_err();
    assert!(format!("{err:#}").contains("read JUnit report"));
}
