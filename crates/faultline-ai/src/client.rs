use anyhow::{Context, Result, anyhow, bail};
use faultline_config::AiConfig;
use reqwest::blocking::Client;
use serde_json::json;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// One chat-completion request.
#[derive(Clone, Debug, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    /// Overrides the backend's default temperature.
    pub temperature: Option<f64>,
    /// Ask the provider for a JSON object response.
    pub json: bool,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: None,
            json: false,
        }
    }

    pub fn temperature(mut self, t: f64) -> Self {
        self.temperature = Some(t);
        self
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// Abstraction over LLM APIs. Enables testing with mocks.
pub trait LlmBackend: Send + Sync {
    fn complete(&self, prompt: &Prompt) -> Result<String>;
}

/// Backend that speaks the OpenAI chat completions protocol.
pub struct OpenAiCompatibleBackend {
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
    http: Client,
}

impl fmt::Debug for OpenAiCompatibleBackend {
    #[mutants::skip]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiCompatibleBackend")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiCompatibleBackend {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            bail!("AI API key cannot be empty");
        }
        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            model: model.into(),
            temperature: 0.2,
            http: build_client(Duration::from_secs(60))?,
        })
    }

    pub fn from_config(config: &AiConfig) -> Result<Self> {
        let key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("AI API key is not configured"))?;
        let mut backend = Self::new(config.api_endpoint.clone(), key, config.model.clone())?;
        backend.temperature = config.temperature;
        backend.http = build_client(Duration::from_secs(config.timeout_secs.max(1)))?;
        Ok(backend)
    }

    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl LlmBackend for OpenAiCompatibleBackend {
    fn complete(&self, prompt: &Prompt) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "temperature": prompt.temperature.unwrap_or(self.temperature),
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user }
            ]
        });
        if prompt.json {
            body["response_format"] = json!({ "type": "json_object" });
        }

        debug!(model = %self.model, json = prompt.json, "llm request");
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .context("LLM API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            bail!("LLM API returned {status}: {text}");
        }

        let json: serde_json::Value = resp.json().context("parse LLM response")?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("no content in LLM response"))?
            .to_string();

        Ok(content)
    }
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(concat!("faultline/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .context("build reqwest client")
}

/// Backend returning a fixed response and recording the prompts it saw.
#[derive(Default)]
pub struct MockLlmBackend {
    pub response: String,
    prompts: Mutex<Vec<Prompt>>,
}

impl MockLlmBackend {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl LlmBackend for MockLlmBackend {
    fn complete(&self, prompt: &Prompt) -> Result<String> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.clone());
        Ok(self.response.clone())
    }
}

/// Mock backend that always fails.
pub struct FailingLlmBackend;

impl LlmBackend for FailingLlmBackend {
    fn complete(&self, _prompt: &Prompt) -> Result<String> {
        bail!("LLM backend failed (mock)")
    }
}
