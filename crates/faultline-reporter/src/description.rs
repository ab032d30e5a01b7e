//! Ticket text and labels for a failure.

use faultline_ids::{TestIdentity, WorkerId};
use faultline_schema::evidence::FailureEvidence;
use faultline_schema::options::ResolvedOptions;
use faultline_schema::ticket::IssueFields;

/// Labels every failure ticket carries before the identity label.
pub const BASE_LABELS: [&str; 2] = ["test-failure", "automated-test"];

/// Tracker limit on summary length, in characters.
pub const SUMMARY_MAX_CHARS: usize = 255;

/// Lines of a stack trace kept in the description.
const TRACE_MAX_LINES: usize = 40;

pub fn summary(identity: &TestIdentity) -> String {
    let full = format!("Test Failure: {}", identity.name);
    match full.char_indices().nth(SUMMARY_MAX_CHARS) {
        Some((idx, _)) => full[..idx].to_string(),
        None => full,
    }
}

/// Base labels, the identity label, then `extra` with duplicates dropped.
pub fn labels(identity: &TestIdentity, extra: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(3 + extra.len());
    let fixed = BASE_LABELS
        .iter()
        .map(|l| l.to_string())
        .chain(std::iter::once(identity.label()));
    for label in fixed.chain(extra.iter().cloned()) {
        if !label.trim().is_empty() && !out.contains(&label) {
            out.push(label);
        }
    }
    out
}

/// Plain-text body. Blank lines separate paragraphs.
pub fn description(
    identity: &TestIdentity,
    worker: &WorkerId,
    evidence: &FailureEvidence,
    duration_ms: Option<u64>,
    test_key: Option<&str>,
) -> String {
    let mut header = vec![
        format!("Test: {}", identity.node_id()),
        format!("Worker: {worker}"),
    ];
    if let Some(ms) = duration_ms {
        header.push(format!("Duration: {ms} ms"));
    }
    if let Some(key) = test_key {
        header.push(format!("Test key: {key}"));
    }

    let mut sections = vec![
        "Automated test failure".to_string(),
        header.join("\n"),
        format!("Error:\n{}", evidence.error_message.trim_end()),
    ];
    if let Some(trace) = evidence.stack_trace.as_deref().filter(|t| !t.trim().is_empty()) {
        let lines: Vec<&str> = trace.lines().take(TRACE_MAX_LINES).collect();
        sections.push(format!("Stack trace:\n{}", lines.join("\n")));
    }
    if let Some(cause) = evidence.ai_root_cause.as_deref().filter(|c| !c.trim().is_empty()) {
        sections.push(format!("AI root cause analysis:\n{}", cause.trim()));
    }
    if let Some(source) = evidence.source_snippet.as_deref().filter(|s| !s.trim().is_empty()) {
        sections.push(format!("Test source:\n{}", source.trim_end()));
    }
    if let Some(name) = evidence
        .screenshot_path
        .as_deref()
        .and_then(|p| p.file_name())
    {
        sections.push(format!("Screenshot: {}", name.to_string_lossy()));
    }
    sections.join("\n\n")
}

/// Comment added to a reused ticket.
pub fn recurrence_comment(worker: &WorkerId, evidence: &FailureEvidence) -> String {
    let first = evidence.error_message.lines().next().unwrap_or_default();
    format!("Failure recurred on worker {worker}: {first}")
}

/// Create payload for a failure.
pub fn issue_fields(
    issue_type: &str,
    identity: &TestIdentity,
    worker: &WorkerId,
    evidence: &FailureEvidence,
    options: &ResolvedOptions,
    duration_ms: Option<u64>,
) -> IssueFields {
    let mut fields = IssueFields::new(
        summary(identity),
        description(identity, worker, evidence, duration_ms, options.test_key.as_deref()),
        issue_type,
    );
    fields.priority = Some(options.priority.clone());
    fields.labels = labels(identity, &options.labels);
    fields.components = options.components.clone();
    fields.custom_fields = options.custom_fields.clone();
    fields
}
