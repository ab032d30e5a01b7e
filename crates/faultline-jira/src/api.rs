//! Jira REST API request payloads and response types.

use crate::adf;
use faultline_schema::ticket::{
    Attachment, IssueFields, StatusCategory, Ticket, TicketStatus, Transition,
};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value, json};

/// Fields requested from search and get calls.
pub const TICKET_FIELDS: &str = "summary,status,priority,labels,components,description";

/// Body of `POST /issue`.
pub fn create_issue_payload(project_key: &str, fields: &IssueFields) -> Value {
    let mut map = Map::new();
    map.insert("project".into(), json!({ "key": project_key }));
    map.insert("summary".into(), json!(fields.summary));
    map.insert("description".into(), adf::document(&fields.description));
    map.insert("issuetype".into(), json!({ "name": fields.issue_type }));
    if let Some(priority) = &fields.priority {
        map.insert("priority".into(), json!({ "name": priority }));
    }
    map.insert("labels".into(), json!(fields.labels));
    map.insert(
        "components".into(),
        Value::Array(
            fields
                .components
                .iter()
                .map(|name| json!({ "name": name }))
                .collect(),
        ),
    );
    for (id, value) in &fields.custom_fields {
        map.insert(id.clone(), value.clone());
    }
    json!({ "fields": Value::Object(map) })
}

/// Body of `POST /issueLink`.
pub fn link_payload(link_type: &str, inward: &str, outward: &str, comment: Option<&str>) -> Value {
    let mut body = json!({
        "type": { "name": link_type },
        "inwardIssue": { "key": inward },
        "outwardIssue": { "key": outward },
    });
    if let Some(text) = comment {
        body["comment"] = json!({ "body": adf::document(text) });
    }
    body
}

pub fn comment_payload(text: &str) -> Value {
    json!({ "body": adf::document(text) })
}

pub fn transition_payload(transition_id: &str) -> Value {
    json!({ "transition": { "id": transition_id } })
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedIssue {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub issues: Vec<ApiIssue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiIssue {
    pub key: String,
    #[serde(default)]
    pub fields: ApiFields,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiFields {
    summary: Option<String>,
    description: Option<Value>,
    priority: Option<Named>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    components: Vec<Named>,
    status: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct Named {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    name: String,
    #[serde(rename = "statusCategory")]
    status_category: Option<ApiStatusCategory>,
}

#[derive(Debug, Deserialize)]
struct ApiStatusCategory {
    key: String,
}

impl ApiIssue {
    pub fn into_ticket(self, url: String) -> Ticket {
        let f = self.fields;
        let status = match f.status {
            Some(s) => TicketStatus::new(
                s.name,
                s.status_category
                    .map(|c| StatusCategory::from_key(&c.key))
                    .unwrap_or(StatusCategory::Unknown),
            ),
            None => TicketStatus::new("Unknown", StatusCategory::Unknown),
        };
        Ticket {
            key: self.key,
            summary: f.summary.unwrap_or_default(),
            description: f
                .description
                .as_ref()
                .map(adf::to_text)
                .filter(|d| !d.is_empty()),
            priority: f.priority.map(|p| p.name),
            labels: f.labels,
            components: f.components.into_iter().map(|c| c.name).collect(),
            status,
            url: Some(url),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionsResponse {
    #[serde(default)]
    pub transitions: Vec<ApiTransition>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiTransition {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    name: String,
    to: Option<Named>,
}

impl From<ApiTransition> for Transition {
    fn from(t: ApiTransition) -> Self {
        Transition {
            id: t.id,
            name: t.name,
            to: t.to.map(|n| n.name),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiAttachment {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    filename: String,
    size: Option<u64>,
}

impl From<ApiAttachment> for Attachment {
    fn from(a: ApiAttachment) -> Self {
        Attachment {
            id: a.id,
            filename: a.filename,
            size: a.size,
        }
    }
}

/// Jira returns ids as strings on Cloud and as numbers on some server versions.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(u64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_payload_snapshot() {
        let mut fields = IssueFields::new(
            "Test Failure: test_login",
            "Error: expected '/dashboard'",
            "Bug",
        );
        fields.priority = Some("High".into());
        fields.labels = vec!["test-failure".into(), "automated-test".into()];
        fields.components = vec!["web".into()];
        fields
            .custom_fields
            .insert("customfield_10001".into(), json!({"value": "automation"}));

        let payload = create_issue_payload("QA", &fields);
        insta::assert_snapshot!(serde_json::to_string_pretty(&payload).unwrap(), @r#"
        {
          "fields": {
            "components": [
              {
                "name": "web"
              }
            ],
            "customfield_10001": {
              "value": "automation"
            },
            "description": {
              "content": [
                {
                  "content": [
                    {
                      "text": "Error: expected '/dashboard'",
                      "type": "text"
                    }
                  ],
                  "type": "paragraph"
                }
              ],
              "type": "doc",
              "version": 1
            },
            "issuetype": {
              "name": "Bug"
            },
            "labels": [
              "test-failure",
              "automated-test"
            ],
            "priority": {
              "name": "High"
            },
            "project": {
              "key": "QA"
            },
            "summary": "Test Failure: test_login"
          }
        }
        "#);
    }

    #[test]
    fn custom_fields_override_standard_ones() {
        let mut fields = IssueFields::new("s", "d", "Bug");
        fields
            .custom_fields
            .insert("labels".into(), json!(["from-custom"]));
        let payload = create_issue_payload("QA", &fields);
        assert_eq!(payload["fields"]["labels"], json!(["from-custom"]));
    }

    #[test]
    fn priority_omitted_when_unset() {
        let payload = create_issue_payload("QA", &IssueFields::new("s", "d", "Bug"));
        assert!(payload["fields"].get("priority").is_none());
    }

    #[test]
    fn link_payload_with_and_without_comment() {
        let plain = link_payload("Relates", "QA-1", "QA-100", None);
        assert_eq!(plain["type"]["name"], "Relates");
        assert_eq!(plain["inwardIssue"]["key"], "QA-1");
        assert_eq!(plain["outwardIssue"]["key"], "QA-100");
        assert!(plain.get("comment").is_none());

        let commented = link_payload("Tests", "QA-1", "QA-7", Some("seen again"));
        assert_eq!(
            commented["comment"]["body"]["content"][0]["content"][0]["text"],
            "seen again"
        );
    }

    #[test]
    fn issue_maps_to_ticket() {
        let raw = json!({
            "id": "10001",
            "key": "QA-12",
            "fields": {
                "summary": "Test Failure: test_login",
                "description": {"type": "doc", "version": 1, "content": [
                    {"type": "paragraph", "content": [{"type": "text", "text": "boom"}]}
                ]},
                "priority": {"name": "High"},
                "labels": ["test-failure"],
                "components": [{"name": "web"}],
                "status": {"name": "Closed", "statusCategory": {"key": "done"}}
            }
        });
        let issue: ApiIssue = serde_json::from_value(raw).unwrap();
        let ticket = issue.into_ticket("https://acme/browse/QA-12".into());
        assert_eq!(ticket.key, "QA-12");
        assert_eq!(ticket.description.as_deref(), Some("boom"));
        assert_eq!(ticket.components, vec!["web"]);
        assert_eq!(ticket.status.category, StatusCategory::Done);
        assert!(!ticket.is_open());
    }

    #[test]
    fn sparse_issue_is_open_with_unknown_status() {
        let issue: ApiIssue = serde_json::from_value(json!({"key": "QA-3"})).unwrap();
        let ticket = issue.into_ticket(String::new());
        assert_eq!(ticket.status.category, StatusCategory::Unknown);
        assert!(ticket.is_open());
        assert_eq!(ticket.description, None);
    }

    #[test]
    fn ids_accept_strings_and_numbers() {
        let t: TransitionsResponse = serde_json::from_value(json!({
            "transitions": [
                {"id": "31", "name": "Done", "to": {"name": "Done"}},
                {"id": 11, "name": "Reopen"}
            ]
        }))
        .unwrap();
        let ts: Vec<Transition> = t.transitions.into_iter().map(Into::into).collect();
        assert_eq!(ts[0].to.as_deref(), Some("Done"));
        assert_eq!(ts[1].id, "11");

        let a: Vec<ApiAttachment> =
            serde_json::from_value(json!([{"id": 7, "filename": "shot.png", "size": 12}])).unwrap();
        let a: Attachment = a.into_iter().next().unwrap().into();
        assert_eq!(a.id, "7");
        assert_eq!(a.size, Some(12));
    }
}
