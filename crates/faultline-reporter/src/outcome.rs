use faultline_error::TrackerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Steps of the per-test reporting chain.
///
/// ```text
/// RUNNING → PASSED
/// RUNNING → FAILED → EVIDENCE_COLLECTED → DEDUP_CHECKED → (REUSED | CREATED) → LINKED
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainState {
    Running,
    Passed,
    Failed,
    EvidenceCollected,
    DedupChecked,
    Reused,
    Created,
    Linked,
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "RUNNING",
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::EvidenceCollected => "EVIDENCE_COLLECTED",
            Self::DedupChecked => "DEDUP_CHECKED",
            Self::Reused => "REUSED",
            Self::Created => "CREATED",
            Self::Linked => "LINKED",
        };
        f.write_str(s)
    }
}

/// A ticket the chain created or reused.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRef {
    pub key: String,
    pub url: String,
}

/// Where one test's chain ended.
///
/// The hook never returns errors; failures inside the chain end up here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChainOutcome {
    /// Passed or skipped by the runner. Nothing to report.
    NoFailure,
    /// No usable tracker.
    Disabled,
    /// Options asked for no ticket.
    Suppressed { reason: String },
    /// `linked` is false when no execution was configured to link to.
    Reused { ticket: TicketRef, linked: bool },
    Created { ticket: TicketRef, linked: bool },
    /// A step failed. `at` is the last state reached.
    Aborted {
        at: ChainState,
        category: String,
        message: String,
        ticket: Option<TicketRef>,
    },
}

impl ChainOutcome {
    pub(crate) fn aborted(at: ChainState, err: &TrackerError, ticket: Option<TicketRef>) -> Self {
        Self::Aborted {
            at,
            category: err.category().to_string(),
            message: err.to_string(),
            ticket,
        }
    }

    /// Furthest state the chain reached.
    pub fn state(&self) -> ChainState {
        match self {
            Self::NoFailure => ChainState::Passed,
            Self::Disabled | Self::Suppressed { .. } => ChainState::Failed,
            Self::Reused { linked: true, .. } | Self::Created { linked: true, .. } => {
                ChainState::Linked
            }
            Self::Reused { linked: false, .. } => ChainState::Reused,
            Self::Created { linked: false, .. } => ChainState::Created,
            Self::Aborted { at, .. } => *at,
        }
    }

    pub fn ticket(&self) -> Option<&TicketRef> {
        match self {
            Self::Reused { ticket, .. } | Self::Created { ticket, .. } => Some(ticket),
            Self::Aborted { ticket, .. } => ticket.as_ref(),
            _ => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> TicketRef {
        TicketRef {
            key: "QA-1".into(),
            url: "https://tracker.test/browse/QA-1".into(),
        }
    }

    #[test]
    fn states_follow_outcomes() {
        assert_eq!(ChainOutcome::NoFailure.state(), ChainState::Passed);
        assert_eq!(
            ChainOutcome::Created { ticket: t(), linked: true }.state(),
            ChainState::Linked
        );
        assert_eq!(
            ChainOutcome::Created { ticket: t(), linked: false }.state(),
            ChainState::Created
        );
        assert_eq!(
            ChainOutcome::Reused { ticket: t(), linked: true }.state(),
            ChainState::Linked
        );
        assert_eq!(
            ChainOutcome::Reused { ticket: t(), linked: false }.state(),
            ChainState::Reused
        );
        let aborted = ChainOutcome::aborted(
            ChainState::EvidenceCollected,
            &TrackerError::Transient("503".into()),
            None,
        );
        assert_eq!(aborted.state(), ChainState::EvidenceCollected);
        assert!(aborted.ticket().is_none());
    }

    #[test]
    fn serializes_with_outcome_tag() {
        let json = serde_json::to_value(ChainOutcome::Reused { ticket: t(), linked: false }).unwrap();
        assert_eq!(json["outcome"], "reused");
        assert_eq!(json["ticket"]["key"], "QA-1");

        let aborted = ChainOutcome::aborted(
            ChainState::DedupChecked,
            &TrackerError::Auth {
                status: 401,
                message: "bad token".into(),
            },
            None,
        );
        let json = serde_json::to_value(&aborted).unwrap();
        assert_eq!(json["at"], "dedup_checked");
        assert_eq!(json["category"], "authentication");
    }
}
