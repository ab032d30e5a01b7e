//! Fixture builders, in-memory port fakes and an HTTP stub shared by faultline tests.

pub mod fake;
pub mod http;

pub use fake::{FakeAnalyzer, FakeManagement, FakeTracker, TrackerOp};

use faultline_config::{FaultlineConfig, JiraConfig, XrayConfig};
use faultline_ids::TestIdentity;
use faultline_schema::evidence::TestOutcome;
use faultline_schema::ticket::{StatusCategory, Ticket, TicketStatus};
use std::path::Path;

/// Identity in the canonical `tests/auth.rs` suite.
pub fn identity(name: &str) -> TestIdentity {
    TestIdentity::new("tests/auth.rs", name)
}

/// The login failure used throughout the reporting scenarios.
pub fn login_failure() -> TestOutcome {
    TestOutcome::failed(identity("test_login"), "AssertionError: expected '/dashboard'")
        .with_stack_trace("tests/auth.rs:42: assertion failed")
        .with_duration_ms(1200)
}

pub fn ticket(key: &str, labels: &[&str], category: StatusCategory) -> Ticket {
    Ticket {
        key: key.to_string(),
        summary: format!("Ticket {key}"),
        description: None,
        priority: Some("Medium".into()),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        components: vec![],
        status: TicketStatus::new(
            match category {
                StatusCategory::Done => "Done",
                StatusCategory::InProgress => "In Progress",
                _ => "Open",
            },
            category,
        ),
        url: Some(format!("https://tracker.test/browse/{key}")),
    }
}

/// Fully usable Jira + Xray configuration writing reports under `reports`.
pub fn usable_config(reports: &Path) -> FaultlineConfig {
    let mut config = FaultlineConfig::default();
    config.jira = JiraConfig {
        enabled: true,
        base_url: "https://tracker.test".into(),
        username: "qa@tracker.test".into(),
        api_token: "token".into(),
        project_key: "QA".into(),
        ..JiraConfig::default()
    };
    config.xray = XrayConfig {
        enabled: true,
        execution_key: Some("QA-100".into()),
        ..XrayConfig::default()
    };
    config.reports.dir = reports.to_path_buf();
    config.lock.timeout_secs = 2;
    config
}
