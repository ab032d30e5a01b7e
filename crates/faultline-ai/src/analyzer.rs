use crate::client::{LlmBackend, Prompt};
use crate::parse::{self, TestImprovements};
use anyhow::{Context, Result};
use faultline_ports::FailureAnalyzer;
use faultline_schema::analysis::{AnalysisRequest, FailureAnalysis};
use std::fmt::Write as _;
use tracing::debug;

const ANALYST: &str = "You are a test automation expert that analyzes test failures.";
const REVIEWER: &str = "You are a test automation expert that suggests test improvements.";

/// Root-cause analysis backed by an LLM.
///
/// Backend failures are returned as errors so callers can treat the analysis
/// as optional. Unparseable answers degrade to placeholder text instead.
pub struct LlmFailureAnalyzer {
    backend: Box<dyn LlmBackend>,
}

impl LlmFailureAnalyzer {
    pub fn new(backend: Box<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    pub fn suggest_improvements(&self, test_code: &str) -> Result<TestImprovements> {
        let prompt = Prompt::new(REVIEWER, improvement_prompt(test_code)).temperature(0.3);
        let content = self
            .backend
            .complete(&prompt)
            .context("request test review")?;
        Ok(parse::test_improvements(&content))
    }
}

impl FailureAnalyzer for LlmFailureAnalyzer {
    fn analyze(&self, request: &AnalysisRequest) -> Result<FailureAnalysis> {
        let prompt = Prompt::new(ANALYST, failure_prompt(request))
            .temperature(0.2)
            .json();
        let content = self
            .backend
            .complete(&prompt)
            .with_context(|| format!("analyze failure of {}", request.test_name))?;
        let analysis = parse::failure_analysis(&content);
        debug!(test = %request.test_name, root_cause = %analysis.root_cause, "failure analyzed");
        Ok(analysis)
    }
}

pub(crate) fn failure_prompt(request: &AnalysisRequest) -> String {
    let mut prompt = format!(
        "Analyze this test failure and provide insights.\n\n\
         Test Name: {}\n\n\
         Error Message:\n{}\n\n\
         Test Code:\n```\n{}\n```\n",
        request.test_name,
        request.error_message.trim(),
        request.test_code.trim()
    );
    if let Some(response) = request.response_data.as_deref().filter(|r| !r.trim().is_empty()) {
        let _ = write!(prompt, "\nResponse Data:\n```\n{}\n```\n", response.trim());
    }
    if request.screenshot_path.as_deref().is_some_and(|p| p.exists()) {
        prompt.push_str("\nNote: A screenshot was captured at the time of failure.\n");
    }
    prompt.push_str(
        "\nPlease provide:\n\
         1. Likely root cause of the failure\n\
         2. Suggested fixes\n\
         3. Prevention strategies\n\n\
         Output a JSON object with the fields root_cause (string), \
         suggested_fixes (array of strings) and prevention_strategies (array of strings).",
    );
    prompt
}

fn improvement_prompt(test_code: &str) -> String {
    format!(
        "Review this test code and suggest improvements:\n\n```\n{}\n```\n\n\
         Please suggest improvements for:\n\
         1. Readability\n\
         2. Maintainability\n\
         3. Robustness\n\
         4. Best practices\n\
         5. Performance\n\n\
         Output a JSON object with the fields readability, maintainability, \
         robustness, best_practices and performance.",
        test_code.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{FailingLlmBackend, MockLlmBackend};
    use std::sync::Arc;

    struct Shared(Arc<MockLlmBackend>);

    impl LlmBackend for Shared {
        fn complete(&self, prompt: &Prompt) -> Result<String> {
            self.0.complete(prompt)
        }
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            test_name: "test_login".into(),
            error_message: "AssertionError: expected '/dashboard'".into(),
            test_code: "fn test_login() { assert_eq!(page.url(), \"/dashboard\"); }".into(),
            screenshot_path: None,
            response_data: Some(r#"{"status":302}"#.into()),
        }
    }

    #[test]
    fn analysis_prompt_snapshot() {
        insta::assert_snapshot!(failure_prompt(&request()), @r#"
        Analyze this test failure and provide insights.

        Test Name: test_login

        Error Message:
        AssertionError: expected '/dashboard'

        Test Code:
        ```
        fn test_login() { assert_eq!(page.url(), "/dashboard"); }
        ```

        Response Data:
        ```
        {"status":302}
        ```

        Please provide:
        1. Likely root cause of the failure
        2. Suggested fixes
        3. Prevention strategies

        Output a JSON object with the fields root_cause (string), suggested_fixes (array of strings) and prevention_strategies (array of strings).
        "#);
    }

    #[test]
    fn missing_screenshot_is_not_mentioned() {
        let mut req = request();
        req.screenshot_path = Some("/nonexistent/shot.png".into());
        assert!(!failure_prompt(&req).contains("screenshot"));
    }

    #[test]
    fn analyze_asks_for_json_and_parses() {
        let mock = Arc::new(MockLlmBackend::new(
            r#"{"root_cause":"Redirect target changed","suggested_fixes":["Update URL"],"prevention_strategies":[]}"#,
        ));
        let analyzer = LlmFailureAnalyzer::new(Box::new(Shared(Arc::clone(&mock))));
        let analysis = analyzer.analyze(&request()).unwrap();
        assert_eq!(analysis.root_cause, "Redirect target changed");

        let prompts = mock.prompts();
        assert!(prompts[0].json);
        assert_eq!(prompts[0].temperature, Some(0.2));
        assert_eq!(prompts[0].system, ANALYST);
    }

    #[test]
    fn backend_failure_is_an_error() {
        let analyzer = LlmFailureAnalyzer::new(Box::new(FailingLlmBackend));
        let err = analyzer.analyze(&request()).unwrap_err();
        assert!(format!("{err:#}").contains("test_login"));
    }

    #[test]
    fn improvements_parse_prose() {
        let analyzer = LlmFailureAnalyzer::new(Box::new(MockLlmBackend::new(
            "Readability: extract a helper\n\nPerformance: reuse the client",
        )));
        let review = analyzer.suggest_improvements("fn t() {}").unwrap();
        assert_eq!(review.readability, "extract a helper");
        assert_eq!(review.performance, "reuse the client");
    }
}
