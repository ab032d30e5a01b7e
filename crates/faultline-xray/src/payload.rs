//! Request bodies for the Xray cloud and server APIs.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use faultline_ports::TrackerResult;
use faultline_schema::execution::TestResult;
use serde_json::{Map, Value, json};
use std::path::Path;

/// Content type sent with inlined evidence, by file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "log" | "txt" => "text/plain",
        "html" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}

/// Body of cloud `POST /import/execution`: an execution with every test at TODO.
pub fn cloud_execution_payload(
    project_key: &str,
    summary: &str,
    description: &str,
    test_keys: &[String],
) -> Value {
    let tests: Vec<Value> = test_keys
        .iter()
        .map(|k| json!({ "testKey": k, "status": "TODO" }))
        .collect();
    json!({
        "info": {
            "project": project_key,
            "summary": summary,
            "description": description,
        },
        "tests": tests,
    })
}

/// Body of cloud `POST /import/execution/results`. Evidence files are inlined.
pub fn cloud_results_payload(execution_key: &str, results: &[TestResult]) -> TrackerResult<Value> {
    let mut tests = Vec::with_capacity(results.len());
    for result in results {
        let mut test = Map::new();
        test.insert("testKey".into(), json!(result.test_key));
        test.insert("status".into(), json!(result.status.as_str()));
        test.insert(
            "comment".into(),
            json!(result.comment.clone().unwrap_or_default()),
        );
        if let Some(start) = result.started_at {
            test.insert("start".into(), json!(start.to_rfc3339()));
        }
        if let Some(finish) = result.finished_at {
            test.insert("finish".into(), json!(finish.to_rfc3339()));
        }
        if !result.evidence.is_empty() {
            let mut evidences = Vec::with_capacity(result.evidence.len());
            for path in &result.evidence {
                let bytes = std::fs::read(path)?;
                evidences.push(json!({
                    "filename": path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
                    "contentType": content_type_for(path),
                    "data": STANDARD.encode(bytes),
                }));
            }
            test.insert("evidences".into(), Value::Array(evidences));
        }
        tests.push(Value::Object(test));
    }
    Ok(json!({
        "testExecutionKey": execution_key,
        "tests": tests,
    }))
}

/// Body of server `POST /rest/raven/1.0/api/testexec/<key>/results`.
///
/// Evidence is uploaded per test afterwards.
pub fn server_results_payload(results: &[TestResult]) -> Value {
    Value::Array(
        results
            .iter()
            .map(|result| {
                let mut test = Map::new();
                test.insert("testKey".into(), json!(result.test_key));
                test.insert("status".into(), json!(result.status.as_str()));
                if let Some(comment) = &result.comment {
                    test.insert("comment".into(), json!(comment));
                }
                if let Some(ms) = result.duration_ms {
                    test.insert("executedTime".into(), json!(ms));
                }
                if let (Some(start), Some(finish)) = (result.started_at, result.finished_at) {
                    test.insert("started".into(), json!(start.to_rfc3339()));
                    test.insert("finished".into(), json!(finish.to_rfc3339()));
                }
                Value::Object(test)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use faultline_schema::execution::TestStatus;

    #[test]
    fn content_types_by_extension() {
        assert_eq!(content_type_for(Path::new("a/shot.PNG")), "image/png");
        assert_eq!(content_type_for(Path::new("run.log")), "text/plain");
        assert_eq!(content_type_for(Path::new("trace.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("dump")), "application/octet-stream");
        assert_eq!(content_type_for(Path::new("x.zip")), "application/octet-stream");
    }

    #[test]
    fn cloud_execution_payload_snapshot() {
        let payload = cloud_execution_payload(
            "QA",
            "Automated Test Execution",
            "nightly",
            &["QA-17".to_string(), "QA-18".to_string()],
        );
        insta::assert_snapshot!(serde_json::to_string_pretty(&payload).unwrap(), @r#"
        {
          "info": {
            "description": "nightly",
            "project": "QA",
            "summary": "Automated Test Execution"
          },
          "tests": [
            {
              "status": "TODO",
              "testKey": "QA-17"
            },
            {
              "status": "TODO",
              "testKey": "QA-18"
            }
          ]
        }
        "#);
    }

    #[test]
    fn cloud_results_inline_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let shot = dir.path().join("w1__login__1.png");
        std::fs::write(&shot, b"png!").unwrap();

        let mut result = TestResult::new("QA-17", TestStatus::Fail).with_comment("boom");
        result.evidence.push(shot);
        let payload = cloud_results_payload("QA-100", &[result]).unwrap();

        assert_eq!(payload["testExecutionKey"], "QA-100");
        let test = &payload["tests"][0];
        assert_eq!(test["status"], "FAIL");
        assert_eq!(test["evidences"][0]["filename"], "w1__login__1.png");
        assert_eq!(test["evidences"][0]["contentType"], "image/png");
        assert_eq!(test["evidences"][0]["data"], "cG5nIQ==");
    }

    #[test]
    fn cloud_results_missing_evidence_is_io_error() {
        let mut result = TestResult::new("QA-17", TestStatus::Fail);
        result.evidence.push("/definitely/not/here.png".into());
        let err = cloud_results_payload("QA-100", &[result]).unwrap_err();
        assert_eq!(err.category(), faultline_error::ErrorCategory::Io);
    }

    #[test]
    fn server_results_need_both_timestamps() {
        let mut only_start = TestResult::new("QA-1", TestStatus::Pass).with_duration_ms(1532);
        only_start.started_at = Some(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap());
        let mut both = TestResult::new("QA-2", TestStatus::Fail).with_comment("boom");
        both.started_at = Some(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap());
        both.finished_at = Some(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 15).unwrap());

        let payload = server_results_payload(&[only_start, both]);
        assert_eq!(payload[0]["executedTime"], 1532);
        assert!(payload[0].get("started").is_none());
        assert!(payload[0].get("comment").is_none());
        assert_eq!(payload[1]["started"], "2025-01-01T10:00:00+00:00");
        assert_eq!(payload[1]["finished"], "2025-01-01T10:00:15+00:00");
    }
}
