use anyhow::Result;
use faultline_ai::{AiCapability, LlmFailureAnalyzer};
use faultline_config::FaultlineConfig;
use faultline_jira::JiraClient;
use faultline_ports::IssueTracker;
use faultline_reporter::{ChainOutcome, ReportingHook};
use faultline_schema::options::{TicketOptions, TicketOptionsRegistry};
use faultline_xray::{XrayClient, import_junit};
use std::path::Path;
use tracing::{debug, warn};

/// Jira client when the integration is enabled and complete.
///
/// A client that cannot be built (bad base URL, zero timeout) is logged and
/// treated as disabled, so reporting never stops a test run.
pub fn tracker(config: &FaultlineConfig) -> Option<JiraClient> {
    if !config.jira.is_usable() {
        debug!(missing = ?config.jira.missing_fields(), "jira integration not usable");
        return None;
    }
    match JiraClient::from_config(&config.jira) {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "jira integration misconfigured, continuing without it");
            None
        }
    }
}

/// Xray client, with the same fallback as [`tracker`].
pub fn test_management(config: &FaultlineConfig) -> Option<XrayClient> {
    match XrayClient::from_config(config) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "xray integration misconfigured, continuing without it");
            None
        }
    }
}

pub fn import(config: &FaultlineConfig, file: &Path, execution: Option<&str>) -> Result<()> {
    let Some(xray) = test_management(config) else {
        println!("Xray integration is not configured; nothing imported");
        return Ok(());
    };
    let imported = import_junit(&xray, file, execution)?;
    match &imported.execution {
        Some(exec) => println!("Imported {} results to {}", exec.results.len(), exec.key),
        None => println!(
            "No test case in {} carries a test key; nothing imported",
            file.display()
        ),
    }
    if !imported.dropped.is_empty() {
        println!("Skipped {} cases without a test key", imported.dropped.len());
    }
    Ok(())
}

/// One-line summary of a chain outcome for console output.
pub fn describe(outcome: &ChainOutcome) -> String {
    match outcome {
        ChainOutcome::NoFailure => "passed".to_string(),
        ChainOutcome::Disabled => "tracker disabled, no ticket".to_string(),
        ChainOutcome::Suppressed { reason } => format!("ticket skipped ({reason})"),
        ChainOutcome::Reused { ticket, linked } | ChainOutcome::Created { ticket, linked } => {
            let verb = if matches!(outcome, ChainOutcome::Reused { .. }) {
                "reused"
            } else {
                "created"
            };
            let mut line = format!("{verb} {} {}", ticket.key, ticket.url);
            if *linked {
                line.push_str(" (linked to execution)");
            }
            line
        }
        ChainOutcome::Aborted {
            at,
            category,
            message,
            ..
        } => format!("aborted at {at} ({category}): {message}"),
    }
}

pub fn report(config: &FaultlineConfig, file: &Path, execution: Option<&str>) -> Result<()> {
    let report = faultline_junit::parse_file(file)?;
    let tracker = tracker(config);
    let xray = test_management(config);
    let (_, backend) = AiCapability::backend(&config.ai);
    let analyzer = backend.map(LlmFailureAnalyzer::new);

    let mut registry = TicketOptionsRegistry::new();
    for case in &report.cases {
        if let Some(key) = case.test_key() {
            registry.register_test(case.identity(), TicketOptions::new().with_test_key(key));
        }
    }

    let mut hook = ReportingHook::new(config, tracker.as_ref().map(|t| t as &dyn IssueTracker))
        .with_registry(registry);
    if let Some(xray) = &xray {
        hook = hook.with_management(xray);
    }
    if let Some(analyzer) = &analyzer {
        hook = hook.with_analyzer(analyzer);
    }
    if let Some(key) = execution {
        hook = hook.with_execution_key(key);
    }

    let mut failing = 0usize;
    for case in report.failing() {
        failing += 1;
        let outcome = hook.on_test_finished(&case.to_outcome(), None);
        println!("{}: {}", case.identity(), describe(&outcome));
    }
    if failing == 0 {
        println!("No failing test cases in {}", file.display());
    }

    match hook.finish_run() {
        Ok(0) => {}
        Ok(n) => println!(
            "Reported {n} results to {}",
            hook.execution_key().unwrap_or_default()
        ),
        Err(e) => warn!(category = %e.category(), error = %e, "failed to report results"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_reporter::{ChainState, TicketRef};

    fn qa1() -> TicketRef {
        TicketRef {
            key: "QA-1".into(),
            url: "https://tracker.test/browse/QA-1".into(),
        }
    }

    #[test]
    fn describes_outcomes() {
        assert_eq!(
            describe(&ChainOutcome::Created { ticket: qa1(), linked: true }),
            "created QA-1 https://tracker.test/browse/QA-1 (linked to execution)"
        );
        assert_eq!(
            describe(&ChainOutcome::Reused { ticket: qa1(), linked: false }),
            "reused QA-1 https://tracker.test/browse/QA-1"
        );
        assert_eq!(
            describe(&ChainOutcome::Aborted {
                at: ChainState::DedupChecked,
                category: "transient".into(),
                message: "503".into(),
                ticket: None,
            }),
            "aborted at DEDUP_CHECKED (transient): 503"
        );
    }

    #[test]
    fn unusable_jira_builds_no_tracker() {
        assert!(tracker(&FaultlineConfig::default()).is_none());
    }

    #[test]
    fn misconfigured_integrations_are_treated_as_disabled() {
        let mut config = FaultlineConfig::default();
        config.jira.enabled = true;
        config.jira.base_url = "acme.atlassian.net".into();
        config.jira.username = "qa@acme.test".into();
        config.jira.api_token = "token".into();
        config.jira.project_key = "QA".into();
        config.xray.enabled = true;
        assert!(config.jira.is_usable());
        assert!(tracker(&config).is_none());
        assert!(test_management(&config).is_none());

        config.jira.base_url = "https://acme.atlassian.net".into();
        config.jira.timeout_secs = 0;
        assert!(tracker(&config).is_none());
    }
}
