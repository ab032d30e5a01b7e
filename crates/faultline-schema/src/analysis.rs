use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Inputs for a failure analysis.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub test_name: String,
    pub error_message: String,
    pub test_code: String,
    pub screenshot_path: Option<PathBuf>,
    /// Raw API response body for API tests.
    pub response_data: Option<String>,
}

/// Root-cause analysis of a failing test, as produced by an AI provider.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureAnalysis {
    pub root_cause: String,
    #[serde(default)]
    pub suggested_fixes: Vec<String>,
    #[serde(default)]
    pub prevention_strategies: Vec<String>,
}

impl FailureAnalysis {
    /// Placeholder returned when the provider could not produce anything usable.
    pub fn undetermined() -> Self {
        Self {
            root_cause: "Unable to determine the root cause automatically.".to_string(),
            suggested_fixes: vec!["Review the error message and test code manually.".to_string()],
            prevention_strategies: vec!["Increase test logging for more context.".to_string()],
        }
    }
}
