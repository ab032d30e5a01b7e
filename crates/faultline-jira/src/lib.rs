//! Jira REST client.
//!
//! Blocking, single-attempt calls against `/rest/api/3` with basic auth.
//! Every failure is classified into a [`TrackerError`] so the reporting chain
//! can decide whether to give up quietly or shout.

pub mod adf;
pub mod api;

use anyhow::{Context, Result, anyhow};
use faultline_config::JiraConfig;
use faultline_error::TrackerError;
use faultline_ports::{IssueTracker, TrackerResult};
use faultline_schema::ticket::{Attachment, IssueFields, Ticket, TicketStatus, Transition};
use reqwest::Method;
use reqwest::blocking::{Client, RequestBuilder, Response, multipart};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Jira Cloud / Server client bound to one project.
#[derive(Clone)]
pub struct JiraClient {
    base_url: String,
    username: String,
    api_token: String,
    project_key: String,
    http: Client,
}

impl fmt::Debug for JiraClient {
    #[mutants::skip]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JiraClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("api_token", &"<redacted>")
            .field("project_key", &self.project_key)
            .finish()
    }
}

impl JiraClient {
    /// Validate connection settings and build the HTTP client.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        api_token: impl Into<String>,
        project_key: impl Into<String>,
    ) -> Result<Self> {
        let base_url = normalize_base_url(&base_url.into())?;
        let username = username.into();
        if username.trim().is_empty() {
            return Err(anyhow!("Jira username cannot be empty"));
        }
        let api_token = api_token.into();
        if api_token.trim().is_empty() {
            return Err(anyhow!("Jira API token cannot be empty"));
        }
        let project_key = project_key.into();
        if project_key.trim().is_empty() {
            return Err(anyhow!("Jira project key cannot be empty"));
        }
        Ok(Self {
            base_url,
            username,
            api_token,
            project_key,
            http: build_client(DEFAULT_TIMEOUT)?,
        })
    }

    pub fn from_config(config: &JiraConfig) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            config.username.clone(),
            config.api_token.clone(),
            config.project_key.clone(),
        )?
        .with_timeout(Duration::from_secs(config.timeout_secs))
    }

    /// Per-request timeout. A timed-out call fails as transient.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(anyhow!("Jira timeout must be greater than zero"));
        }
        self.http = build_client(timeout)?;
        Ok(self)
    }

    /// Use a preconfigured HTTP client (proxies, custom TLS roots).
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The underlying HTTP client, carrying the configured timeout.
    pub fn http_client(&self) -> &Client {
        &self.http
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/rest/api/3{}", self.base_url, path)
    }

    /// Authenticated request against a path under the base URL.
    ///
    /// Exposed so sibling clients (Xray server) share auth and error mapping.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.authed(method, format!("{}{}", self.base_url, path))
    }

    fn authed(&self, method: Method, url: impl reqwest::IntoUrl) -> RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(&self.api_token))
            .header("Accept", "application/json")
    }

    /// Send and classify any non-2xx status.
    pub fn execute(&self, req: RequestBuilder, what: &str) -> TrackerResult<Response> {
        debug!(call = what, "jira request");
        let resp = req.send()?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        debug!(call = what, status = status.as_u16(), "jira request failed");
        Err(TrackerError::from_status(status.as_u16(), &body))
    }

    fn execute_json<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> TrackerResult<T> {
        let resp = self.execute(req, what)?;
        decode(resp, what)
    }
}

/// Decode a JSON response body, tagging failures with the call name.
pub fn decode<T: DeserializeOwned>(resp: Response, what: &str) -> TrackerResult<T> {
    let text = resp.text()?;
    serde_json::from_str(&text).map_err(|e| TrackerError::Decode(format!("{what}: {e}")))
}

impl IssueTracker for JiraClient {
    fn create_issue(&self, fields: &IssueFields) -> TrackerResult<Ticket> {
        let body = api::create_issue_payload(&self.project_key, fields);
        let created: api::CreatedIssue = self.execute_json(
            self.authed(Method::POST, self.api_url("/issue")).json(&body),
            "create_issue",
        )?;
        let url = self.browse_url(&created.key);
        Ok(Ticket {
            key: created.key,
            summary: fields.summary.clone(),
            description: Some(fields.description.clone()),
            priority: fields.priority.clone(),
            labels: fields.labels.clone(),
            components: fields.components.clone(),
            status: TicketStatus::open(),
            url: Some(url),
        })
    }

    fn update_issue(&self, key: &str, fields: &Value) -> TrackerResult<()> {
        self.execute(
            self.authed(Method::PUT, self.api_url(&format!("/issue/{key}")))
                .json(&json!({ "fields": fields })),
            "update_issue",
        )?;
        Ok(())
    }

    fn get_issue(&self, key: &str) -> TrackerResult<Ticket> {
        let url = build_url_with_params(
            &self.api_url(&format!("/issue/{key}")),
            &[("fields", api::TICKET_FIELDS.to_string())],
        )?;
        let issue: api::ApiIssue = self.execute_json(self.authed(Method::GET, url), "get_issue")?;
        let browse = self.browse_url(&issue.key);
        Ok(issue.into_ticket(browse))
    }

    fn search_issues(&self, jql: &str, max_results: u32) -> TrackerResult<Vec<Ticket>> {
        let url = build_url_with_params(
            &self.api_url("/search"),
            &[
                ("jql", jql.to_string()),
                ("maxResults", max_results.to_string()),
                ("fields", api::TICKET_FIELDS.to_string()),
            ],
        )?;
        let found: api::SearchResponse =
            self.execute_json(self.authed(Method::GET, url), "search_issues")?;
        Ok(found
            .issues
            .into_iter()
            .map(|issue| {
                let browse = self.browse_url(&issue.key);
                issue.into_ticket(browse)
            })
            .collect())
    }

    fn link_issues(
        &self,
        link_type: &str,
        inward: &str,
        outward: &str,
        comment: Option<&str>,
    ) -> TrackerResult<()> {
        let body = api::link_payload(link_type, inward, outward, comment);
        self.execute(
            self.authed(Method::POST, self.api_url("/issueLink")).json(&body),
            "link_issues",
        )?;
        Ok(())
    }

    fn add_comment(&self, key: &str, body: &str) -> TrackerResult<()> {
        self.execute(
            self.authed(Method::POST, self.api_url(&format!("/issue/{key}/comment")))
                .json(&api::comment_payload(body)),
            "add_comment",
        )?;
        Ok(())
    }

    fn upload_attachment(&self, key: &str, path: &Path) -> TrackerResult<Vec<Attachment>> {
        let form = multipart::Form::new().file("file", path)?;
        let uploaded: Vec<api::ApiAttachment> = self.execute_json(
            self.authed(
                Method::POST,
                self.api_url(&format!("/issue/{key}/attachments")),
            )
            .header("X-Atlassian-Token", "no-check")
            .multipart(form),
            "upload_attachment",
        )?;
        Ok(uploaded.into_iter().map(Into::into).collect())
    }

    fn transition_issue(&self, key: &str, transition_id: &str) -> TrackerResult<()> {
        self.execute(
            self.authed(
                Method::POST,
                self.api_url(&format!("/issue/{key}/transitions")),
            )
            .json(&api::transition_payload(transition_id)),
            "transition_issue",
        )?;
        Ok(())
    }

    fn get_available_transitions(&self, key: &str) -> TrackerResult<Vec<Transition>> {
        let found: api::TransitionsResponse = self.execute_json(
            self.authed(
                Method::GET,
                self.api_url(&format!("/issue/{key}/transitions")),
            ),
            "get_available_transitions",
        )?;
        Ok(found.transitions.into_iter().map(Into::into).collect())
    }

    fn project_key(&self) -> &str {
        &self.project_key
    }

    fn browse_url(&self, key: &str) -> String {
        format!("{}/browse/{key}", self.base_url)
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("faultline/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .context("build reqwest client")
}

fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(anyhow!("Jira base URL cannot be empty"));
    }
    let parsed = Url::parse(trimmed).with_context(|| format!("Invalid Jira base URL: {raw}"))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(anyhow!("Invalid Jira base URL: {raw}"));
    }
    Ok(trimmed.to_string())
}

fn build_url_with_params(base: &str, params: &[(&str, String)]) -> TrackerResult<Url> {
    let mut url = Url::parse(base).map_err(|e| TrackerError::Validation {
        field: None,
        message: format!("parse url {base}: {e}"),
    })?;
    if !params.is_empty() {
        let mut query = url.query_pairs_mut();
        for (k, v) in params {
            query.append_pair(k, v);
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> JiraClient {
        JiraClient::new("https://acme.atlassian.net/", "qa@acme.test", "secret", "QA").unwrap()
    }

    #[test]
    fn new_trims_trailing_slash() {
        assert_eq!(client().base_url(), "https://acme.atlassian.net");
    }

    #[test]
    fn new_rejects_empty_settings() {
        let cases = [
            ("", "u", "t", "QA", "base URL cannot be empty"),
            ("https://a.test", " ", "t", "QA", "username cannot be empty"),
            ("https://a.test", "u", "", "QA", "token cannot be empty"),
            ("https://a.test", "u", "t", "", "project key cannot be empty"),
        ];
        for (base, user, token, project, expected) in cases {
            let err = JiraClient::new(base, user, token, project).unwrap_err();
            assert!(err.to_string().contains(expected), "{err}");
        }
    }

    #[test]
    fn new_rejects_non_http_urls() {
        assert!(JiraClient::new("ftp://acme", "u", "t", "QA").is_err());
        assert!(JiraClient::new("acme.atlassian.net", "u", "t", "QA").is_err());
    }

    #[test]
    fn zero_timeout_rejected() {
        assert!(client().with_timeout(Duration::ZERO).is_err());
        assert!(client().with_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn urls_construct_correctly() {
        let c = client();
        assert_eq!(
            c.api_url("/issue/QA-1"),
            "https://acme.atlassian.net/rest/api/3/issue/QA-1"
        );
        assert_eq!(c.browse_url("QA-1"), "https://acme.atlassian.net/browse/QA-1");
        assert_eq!(c.project_key(), "QA");
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", client());
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn from_config_uses_timeout_and_fields() {
        let cfg = JiraConfig {
            enabled: true,
            base_url: "https://acme.atlassian.net".into(),
            username: "u".into(),
            api_token: "t".into(),
            project_key: "OPS".into(),
            timeout_secs: 0,
            ..JiraConfig::default()
        };
        assert!(JiraClient::from_config(&cfg).is_err());
        let ok = JiraConfig {
            timeout_secs: 10,
            ..cfg
        };
        assert_eq!(JiraClient::from_config(&ok).unwrap().project_key(), "OPS");
    }

    #[test]
    fn build_url_with_params_encodes_jql() {
        let url = build_url_with_params(
            "https://acme.atlassian.net/rest/api/3/search",
            &[
                ("jql", r#"project = "QA" AND labels = "faultline-0123""#.to_string()),
                ("maxResults", "10".to_string()),
            ],
        )
        .unwrap();

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (
                    "jql".to_string(),
                    r#"project = "QA" AND labels = "faultline-0123""#.to_string()
                ),
                ("maxResults".to_string(), "10".to_string()),
            ]
        );
        assert!(!url.as_str().contains(' '));
    }
}
