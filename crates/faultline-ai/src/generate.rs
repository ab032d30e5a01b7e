use crate::client::{LlmBackend, Prompt};
use crate::parse;
use anyhow::{Context, Result, bail};
use std::fmt;
use std::str::FromStr;

const CODER: &str = "You are a test automation expert that generates test code.";
const DB_CODER: &str = "You are a test automation expert that generates test code for database testing.";
const TEMPERATURE: f64 = 0.3;

/// Database flavours the DB test generator knows about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbKind {
    Postgres,
    Clickhouse,
}

impl FromStr for DbKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "clickhouse" => Ok(Self::Clickhouse),
            other => bail!("unknown database type: {other} (expected postgres or clickhouse)"),
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => f.write_str("postgres"),
            Self::Clickhouse => f.write_str("clickhouse"),
        }
    }
}

/// Test source generated from a plain-language description.
pub struct TestGenerator<'a> {
    backend: &'a dyn LlmBackend,
    language: String,
}

/// `test_<method>_<endpoint path as snake case>`.
pub fn api_test_name(method: &str, endpoint: &str) -> String {
    let path: String = endpoint
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    let path = path
        .split('_')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    format!("test_{}_{path}", method.to_ascii_lowercase())
}

impl<'a> TestGenerator<'a> {
    /// Generates Rust by default.
    pub fn new(backend: &'a dyn LlmBackend) -> Self {
        Self {
            backend,
            language: "rust".to_string(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    fn generate(&self, system: &str, user: String) -> Result<String> {
        let content = self
            .backend
            .complete(&Prompt::new(system, user).temperature(TEMPERATURE))
            .context("request generated test")?;
        let code = parse::code_block(&content, &self.language);
        if code.is_empty() {
            bail!("model returned no code");
        }
        Ok(code)
    }

    pub fn api_test(&self, endpoint: &str, method: &str, description: &str) -> Result<String> {
        let name = api_test_name(method, endpoint);
        self.generate(
            CODER,
            format!(
                "Create a {lang} test function named `{name}` that sends a {method} request to the endpoint '{endpoint}'.\n\
                 Test description: {description}\n\n\
                 Include assertions for the status code, the response body and the response time.\n\
                 Structure the body as setup, execute, assert.\n\
                 Return only the code in a ```{lang} block.",
                lang = self.language,
                method = method.to_ascii_uppercase(),
            ),
        )
    }

    pub fn ui_test(&self, page_name: &str, description: &str, steps: &[String]) -> Result<String> {
        let steps_text = steps
            .iter()
            .map(|s| format!("- {s}"))
            .collect::<Vec<_>>()
            .join("\n");
        self.generate(
            CODER,
            format!(
                "Create a {lang} UI test function for the '{page_name}' page.\n\
                 Test description: {description}\n\n\
                 The test should implement these steps:\n{steps_text}\n\n\
                 Drive the page through a page object named `{page_name}Page` and assert after each step.\n\
                 Capture a screenshot when an assertion fails.\n\
                 Return only the code in a ```{lang} block.",
                lang = self.language,
            ),
        )
    }

    pub fn db_test(&self, db: DbKind, query: &str, description: &str) -> Result<String> {
        self.generate(
            DB_CODER,
            format!(
                "Create a {lang} test function that tests a database query on {db}.\n\
                 Test description: {description}\n\
                 Query: {query}\n\n\
                 Connect with the standard {db} client, run the query and assert on the returned rows.\n\
                 Return only the code in a ```{lang} block.",
                lang = self.language,
            ),
        )
    }
}
