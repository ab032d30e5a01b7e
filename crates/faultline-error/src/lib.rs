//! Error taxonomy for faultline.
//!
//! Tracker and test-management calls fail with a [`TrackerError`] so callers
//! can tell retryable failures from fatal ones without string matching.

use std::fmt;
use thiserror::Error;

/// Coarse error category, used in log lines and outcome ledgers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Authentication,
    NotFound,
    Validation,
    Transient,
    Decode,
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Authentication => write!(f, "authentication"),
            ErrorCategory::NotFound => write!(f, "not_found"),
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Transient => write!(f, "transient"),
            ErrorCategory::Decode => write!(f, "decode"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Failure of a single tracker or test-management call.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// 401/403. Fatal: credentials or permissions are wrong.
    #[error("authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    /// 404. Callers usually treat this as "nothing there".
    #[error("resource not found: {0}")]
    NotFound(String),

    /// 400. Fatal per call; `field` names the offending field when the tracker reports it.
    #[error("{}", validation_message(.field, .message))]
    Validation {
        field: Option<String>,
        message: String,
    },

    /// 5xx, timeouts and connection failures. Retryable, but faultline never retries.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The tracker answered but the body did not match the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn validation_message(field: &Option<String>, message: &str) -> String {
    match field {
        Some(f) => format!("validation failed on field '{f}': {message}"),
        None => format!("validation failed: {message}"),
    }
}

impl TrackerError {
    /// Classify a non-success HTTP status and its body.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => TrackerError::Auth {
                status,
                message: summarize_body(body),
            },
            404 => TrackerError::NotFound(summarize_body(body)),
            400 | 422 => {
                let (field, message) = validation_details(body);
                TrackerError::Validation { field, message }
            }
            408 | 429 | 500..=599 => TrackerError::Transient(format!("HTTP {status}: {}", summarize_body(body))),
            _ => TrackerError::Decode(format!("HTTP {status}: {}", summarize_body(body))),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            TrackerError::Auth { .. } => ErrorCategory::Authentication,
            TrackerError::NotFound(_) => ErrorCategory::NotFound,
            TrackerError::Validation { .. } => ErrorCategory::Validation,
            TrackerError::Transient(_) => ErrorCategory::Transient,
            TrackerError::Decode(_) => ErrorCategory::Decode,
            TrackerError::Io(_) => ErrorCategory::Io,
        }
    }

    /// Retrying could succeed. Faultline itself makes a single attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrackerError::Transient(_))
    }

    /// Retrying cannot succeed without a configuration or payload change.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TrackerError::Auth { .. } | TrackerError::Validation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, TrackerError::NotFound(_))
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return TrackerError::from_status(status.as_u16(), &err.to_string());
        }
        if err.is_decode() {
            return TrackerError::Decode(err.to_string());
        }
        // timeouts, connect failures, body/stream errors
        TrackerError::Transient(err.to_string())
    }
}

/// Jira error bodies look like `{"errorMessages": [...], "errors": {"field": "msg"}}`.
fn validation_details(body: &str) -> (Option<String>, String) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return (None, summarize_body(body));
    };
    if let Some((field, msg)) = value
        .get("errors")
        .and_then(|e| e.as_object())
        .and_then(|m| m.iter().next())
    {
        let msg = msg.as_str().map(str::to_string).unwrap_or_else(|| msg.to_string());
        return (Some(field.clone()), msg);
    }
    if let Some(first) = value
        .get("errorMessages")
        .and_then(|m| m.as_array())
        .and_then(|a| a.first())
        .and_then(|m| m.as_str())
    {
        return (None, first.to_string());
    }
    (None, summarize_body(body))
}

const MAX_BODY_CHARS: usize = 300;

fn summarize_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    if trimmed.chars().count() <= MAX_BODY_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX_BODY_CHARS).collect();
    format!("{cut}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn auth_statuses_are_fatal() {
        for status in [401, 403] {
            let err = TrackerError::from_status(status, "nope");
            assert_eq!(err.category(), ErrorCategory::Authentication);
            assert!(err.is_fatal());
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn not_found_is_neither_fatal_nor_retryable() {
        let err = TrackerError::from_status(404, "Issue does not exist");
        assert!(err.is_not_found());
        assert!(!err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn validation_extracts_offending_field() {
        let body = r#"{"errorMessages":[],"errors":{"customfield_10042":"Field 'customfield_10042' cannot be set."}}"#;
        match TrackerError::from_status(400, body) {
            TrackerError::Validation { field, message } => {
                assert_eq!(field.as_deref(), Some("customfield_10042"));
                assert!(message.contains("cannot be set"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn validation_falls_back_to_error_messages() {
        let body = r#"{"errorMessages":["The value 'XYZ' does not exist for the field 'project'."],"errors":{}}"#;
        let err = TrackerError::from_status(400, body);
        assert!(err.to_string().contains("does not exist"));
        assert!(err.is_fatal());
    }

    #[test]
    fn validation_with_plain_text_body() {
        let err = TrackerError::from_status(400, "bad request");
        assert_eq!(err.to_string(), "validation failed: bad request");
    }

    #[test]
    fn server_errors_are_transient() {
        let err = TrackerError::from_status(503, "");
        assert!(err.is_retryable());
        assert!(err.to_string().contains("<empty body>"));
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let err = TrackerError::from_status(500, &body);
        assert!(err.to_string().len() < 400);
    }

    #[test]
    fn category_display() {
        assert_eq!(ErrorCategory::Authentication.to_string(), "authentication");
        assert_eq!(ErrorCategory::NotFound.to_string(), "not_found");
    }

    proptest! {
        #[test]
        fn prop_every_5xx_is_retryable(status in 500u16..600) {
            prop_assert!(TrackerError::from_status(status, "boom").is_retryable());
        }

        #[test]
        fn prop_classification_is_exclusive(status in 400u16..600, body in ".{0,50}") {
            let err = TrackerError::from_status(status, &body);
            prop_assert!(!(err.is_fatal() && err.is_retryable()));
        }
    }
}
