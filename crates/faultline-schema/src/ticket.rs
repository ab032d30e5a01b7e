use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tracker status category. Trackers localize status names, categories are stable.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    New,
    InProgress,
    Done,
    Unknown,
}

impl StatusCategory {
    /// Map a Jira `statusCategory.key` (`new`, `indeterminate`, `done`).
    pub fn from_key(key: &str) -> Self {
        match key.to_ascii_lowercase().as_str() {
            "new" | "to do" | "todo" => Self::New,
            "indeterminate" | "in_progress" | "in progress" => Self::InProgress,
            "done" => Self::Done,
            _ => Self::Unknown,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TicketStatus {
    pub name: String,
    pub category: StatusCategory,
}

impl TicketStatus {
    pub fn new(name: impl Into<String>, category: StatusCategory) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }

    pub fn open() -> Self {
        Self::new("Open", StatusCategory::New)
    }
}

/// A defect record in the issue tracker.
///
/// Faultline creates and links tickets. Closing them is left to humans.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub key: String,
    pub summary: String,
    pub description: Option<String>,
    pub priority: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub components: Vec<String>,
    pub status: TicketStatus,
    /// Browse URL when known.
    pub url: Option<String>,
}

impl Ticket {
    /// Open means anything not in the `done` category. Unknown counts as open.
    pub fn is_open(&self) -> bool {
        self.status.category != StatusCategory::Done
    }
}

/// Fields for creating an issue.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IssueFields {
    pub summary: String,
    pub description: String,
    pub issue_type: String,
    pub priority: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub components: Vec<String>,
    /// Tracker field id → raw JSON value, merged verbatim into the request.
    #[serde(default)]
    pub custom_fields: BTreeMap<String, serde_json::Value>,
}

impl IssueFields {
    pub fn new(
        summary: impl Into<String>,
        description: impl Into<String>,
        issue_type: impl Into<String>,
    ) -> Self {
        Self {
            summary: summary.into(),
            description: description.into(),
            issue_type: issue_type.into(),
            priority: None,
            labels: Vec::new(),
            components: Vec::new(),
            custom_fields: BTreeMap::new(),
        }
    }
}

/// A workflow transition offered for an issue.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transition {
    pub id: String,
    pub name: String,
    /// Target status name.
    pub to: Option<String>,
}

/// Attachment metadata returned after upload.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket(category: StatusCategory) -> Ticket {
        Ticket {
            key: "QA-1".into(),
            summary: "Test Failure: test_login".into(),
            description: None,
            priority: Some("Medium".into()),
            labels: vec![],
            components: vec![],
            status: TicketStatus::new("Whatever", category),
            url: None,
        }
    }

    #[test]
    fn status_category_from_jira_keys() {
        assert_eq!(StatusCategory::from_key("new"), StatusCategory::New);
        assert_eq!(StatusCategory::from_key("indeterminate"), StatusCategory::InProgress);
        assert_eq!(StatusCategory::from_key("DONE"), StatusCategory::Done);
        assert_eq!(StatusCategory::from_key("undefined"), StatusCategory::Unknown);
    }

    #[test]
    fn only_done_tickets_are_closed() {
        assert!(ticket(StatusCategory::New).is_open());
        assert!(ticket(StatusCategory::InProgress).is_open());
        assert!(ticket(StatusCategory::Unknown).is_open());
        assert!(!ticket(StatusCategory::Done).is_open());
    }
}
