//! Duplicate-ticket detection.
//!
//! Every failure carries an identity label. A failure is a duplicate when an
//! open ticket in the project already wears that label; the earliest one wins.
//! The search is not atomic with the create that may follow it, so callers
//! serialize the pair with a named lock.

use faultline_ids::TestIdentity;
use faultline_ports::{IssueTracker, TrackerResult};
use faultline_schema::ticket::Ticket;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Upper bound on tickets fetched per duplicate search.
pub const SEARCH_LIMIT: u32 = 10;

/// What to do with a failure.
#[derive(Clone, Debug, PartialEq)]
pub enum DedupDecision {
    /// An open ticket already tracks this failure.
    Reuse(Ticket),
    Create,
}

impl DedupDecision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Self::Reuse(_) => DecisionKind::Reuse,
            Self::Create => DecisionKind::Create,
        }
    }
}

/// Decision without the ticket, for logs and ledgers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Reuse,
    Create,
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reuse => f.write_str("reuse"),
            Self::Create => f.write_str("create"),
        }
    }
}

/// Quote a JQL string literal.
pub fn jql_quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Search for open tickets carrying `label`, oldest first.
pub fn duplicate_jql(project_key: &str, label: &str) -> String {
    format!(
        "project = {} AND labels = {} AND statusCategory != Done ORDER BY created ASC",
        jql_quote(project_key),
        jql_quote(label)
    )
}

/// Pure decision over a search result.
///
/// Done tickets are ignored even if the tracker returned them.
pub fn decide(create_duplicates: bool, found: &[Ticket]) -> DedupDecision {
    if create_duplicates {
        return DedupDecision::Create;
    }
    match found.iter().find(|t| t.is_open()) {
        Some(ticket) => DedupDecision::Reuse(ticket.clone()),
        None => DedupDecision::Create,
    }
}

/// Open tickets already tracking `identity`.
///
/// A not-found answer from the tracker means no duplicates.
pub fn find_duplicates(
    tracker: &dyn IssueTracker,
    identity: &TestIdentity,
) -> TrackerResult<Vec<Ticket>> {
    let jql = duplicate_jql(tracker.project_key(), &identity.label());
    match tracker.search_issues(&jql, SEARCH_LIMIT) {
        Ok(found) => Ok(found.into_iter().filter(Ticket::is_open).collect()),
        Err(e) if e.is_not_found() => {
            debug!(test = %identity, "duplicate search found nothing");
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

/// Search and decide in one step.
pub fn classify(
    tracker: &dyn IssueTracker,
    identity: &TestIdentity,
    create_duplicates: bool,
) -> TrackerResult<DedupDecision> {
    if create_duplicates {
        return Ok(DedupDecision::Create);
    }
    let found = find_duplicates(tracker, identity)?;
    let decision = decide(false, &found);
    debug!(test = %identity, decision = %decision.kind(), candidates = found.len(), "classified failure");
    Ok(decision)
}
