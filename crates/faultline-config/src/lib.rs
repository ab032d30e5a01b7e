//! Configuration loading for faultline.
//!
//! Sources, lowest precedence first: defaults, a YAML or JSON file, then
//! environment variables. The result is a plain value handed to constructors.

use anyhow::{Context, Result, anyhow};
use faultline_logging::{LogFormat, LogLevel, LoggingConfig};
use faultline_schema::options::TicketOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File read when no `--config` is given. Missing is not an error.
pub const DEFAULT_CONFIG_FILE: &str = "faultline.yaml";

/// Configuration format types supported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    Json,
    #[default]
    Yaml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

/// Main faultline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultlineConfig {
    pub jira: JiraConfig,
    pub xray: XrayConfig,
    pub ai: AiConfig,
    pub reports: ReportsConfig,
    pub lock: LockConfig,
    pub logging: LoggingConfig,
}

/// Issue-tracker connection and ticket defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JiraConfig {
    pub enabled: bool,
    pub base_url: String,
    pub username: String,
    pub api_token: String,
    pub project_key: String,
    pub issue_type: String,
    /// File a new ticket even when an open one exists for the test.
    pub create_duplicates: bool,
    pub default_priority: String,
    pub labels: Vec<String>,
    pub components: Vec<String>,
    /// Link type between a failure ticket and its execution.
    pub link_type: String,
    pub timeout_secs: u64,
}

impl Default for JiraConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            username: String::new(),
            api_token: String::new(),
            project_key: String::new(),
            issue_type: "Bug".to_string(),
            create_duplicates: false,
            default_priority: "Medium".to_string(),
            labels: Vec::new(),
            components: Vec::new(),
            link_type: "Relates".to_string(),
            timeout_secs: 30,
        }
    }
}

impl JiraConfig {
    /// Names of required settings that are empty.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        for (name, value) in [
            ("base_url", &self.base_url),
            ("username", &self.username),
            ("api_token", &self.api_token),
            ("project_key", &self.project_key),
        ] {
            if value.trim().is_empty() {
                missing.push(name);
            }
        }
        missing
    }

    /// Enabled and fully configured. Anything else means "silently do nothing".
    pub fn is_usable(&self) -> bool {
        self.enabled && self.missing_fields().is_empty()
    }

    /// Global level of the ticket-option precedence chain.
    pub fn ticket_defaults(&self) -> TicketOptions {
        let mut options = TicketOptions::new().with_priority(self.default_priority.clone());
        if !self.labels.is_empty() {
            options = options.with_labels(self.labels.clone());
        }
        if !self.components.is_empty() {
            options = options.with_components(self.components.clone());
        }
        options
    }
}

/// Test-management (Xray) settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XrayConfig {
    pub enabled: bool,
    /// Cloud API with client credentials; otherwise the server/DC REST API.
    pub cloud: bool,
    pub cloud_base_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Execution results are reported to, when set.
    pub execution_key: Option<String>,
    /// Custom field holding the test-execution type on server/DC.
    pub test_execution_type_field: Option<String>,
}

impl Default for XrayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cloud: false,
            cloud_base_url: "https://xray.cloud.getxray.app/api/v2".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            execution_key: None,
            test_execution_type_field: None,
        }
    }
}

impl XrayConfig {
    pub fn is_usable(&self, jira: &JiraConfig) -> bool {
        if !(jira.is_usable() && self.enabled) {
            return false;
        }
        !self.cloud || !(self.client_id.trim().is_empty() || self.client_secret.trim().is_empty())
    }
}

/// AI provider (OpenAI-compatible chat completions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub enabled: bool,
    pub api_endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f64,
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

impl AiConfig {
    pub fn is_usable(&self) -> bool {
        self.enabled && self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    pub dir: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("reports"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Defaults to `<reports>/.locks`.
    pub dir: Option<PathBuf>,
    pub timeout_secs: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            dir: None,
            timeout_secs: 30,
        }
    }
}

impl FaultlineConfig {
    /// Load from `path` (or [`DEFAULT_CONFIG_FILE`] when present) and overlay
    /// the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// Like [`FaultlineConfig::load`] with an explicit environment lookup.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(p) => load_config(p)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    load_config(default)?
                } else {
                    FaultlineConfig::default()
                }
            }
        };
        config.apply_env_with(lookup)?;
        Ok(config)
    }

    /// Overlay environment variables. Unset and blank variables are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("JIRA_ENABLED") {
            self.jira.enabled = parse_bool("JIRA_ENABLED", &v)?;
        }
        if let Some(v) = get("JIRA_BASE_URL") {
            self.jira.base_url = v;
        }
        if let Some(v) = get("JIRA_USERNAME") {
            self.jira.username = v;
        }
        if let Some(v) = get("JIRA_API_TOKEN") {
            self.jira.api_token = v;
        }
        if let Some(v) = get("JIRA_PROJECT_KEY") {
            self.jira.project_key = v;
        }
        if let Some(v) = get("JIRA_ISSUE_TYPE") {
            self.jira.issue_type = v;
        }
        if let Some(v) = get("JIRA_CREATE_DUPLICATES") {
            self.jira.create_duplicates = parse_bool("JIRA_CREATE_DUPLICATES", &v)?;
        }
        if let Some(v) = get("JIRA_DEFAULT_PRIORITY") {
            self.jira.default_priority = v;
        }
        if let Some(v) = get("JIRA_LABELS") {
            self.jira.labels = parse_list(&v);
        }
        if let Some(v) = get("JIRA_COMPONENTS") {
            self.jira.components = parse_list(&v);
        }
        if let Some(v) = get("JIRA_LINK_TYPE") {
            self.jira.link_type = v;
        }
        if let Some(v) = get("JIRA_TIMEOUT_SECS") {
            self.jira.timeout_secs = parse_u64("JIRA_TIMEOUT_SECS", &v)?;
        }

        if let Some(v) = get("XRAY_ENABLED") {
            self.xray.enabled = parse_bool("XRAY_ENABLED", &v)?;
        }
        if let Some(v) = get("XRAY_CLOUD") {
            self.xray.cloud = parse_bool("XRAY_CLOUD", &v)?;
        }
        if let Some(v) = get("XRAY_CLIENT_ID") {
            self.xray.client_id = v;
        }
        if let Some(v) = get("XRAY_CLIENT_SECRET") {
            self.xray.client_secret = v;
        }
        if let Some(v) = get("XRAY_EXECUTION_KEY") {
            self.xray.execution_key = Some(v);
        }
        if let Some(v) = get("XRAY_TEST_EXECUTION_TYPE_FIELD") {
            self.xray.test_execution_type_field = Some(v);
        }

        if let Some(v) = get("AI_FEATURES_ENABLED") {
            self.ai.enabled = parse_bool("AI_FEATURES_ENABLED", &v)?;
        }
        if let Some(v) = get("OPENAI_API_ENDPOINT") {
            self.ai.api_endpoint = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.ai.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.ai.model = v;
        }

        if let Some(v) = get("FAULTLINE_REPORTS_DIR") {
            self.reports.dir = PathBuf::from(v);
        }
        if let Some(v) = get("FAULTLINE_LOCK_DIR") {
            self.lock.dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("FAULTLINE_LOCK_TIMEOUT_SECS") {
            self.lock.timeout_secs = parse_u64("FAULTLINE_LOCK_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("FAULTLINE_LOG") {
            self.logging.level = v
                .parse::<LogLevel>()
                .with_context(|| "invalid FAULTLINE_LOG".to_string())?;
        }
        if let Some(v) = get("FAULTLINE_LOG_FORMAT") {
            self.logging.format = v
                .parse::<LogFormat>()
                .with_context(|| "invalid FAULTLINE_LOG_FORMAT".to_string())?;
        }
        Ok(())
    }

    /// Directory holding the named lock files.
    pub fn lock_dir(&self) -> PathBuf {
        self.lock
            .dir
            .clone()
            .unwrap_or_else(|| self.reports.dir.join(".locks"))
    }

    pub fn xray_usable(&self) -> bool {
        self.xray.is_usable(&self.jira)
    }
}

/// Parse `true/false/1/0/yes/no`, case-insensitive.
pub fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(anyhow!(
            "{name} must be one of true/false/1/0/yes/no, got {other:?}"
        )),
    }
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u64(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .with_context(|| format!("{name} must be a non-negative integer, got {value:?}"))
}

/// Load configuration from a file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FaultlineConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;

    match ConfigFormat::from_path(path) {
        ConfigFormat::Json => serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse JSON config {}", path.display())),
        ConfigFormat::Yaml => serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config {}", path.display())),
    }
}

/// Save configuration to a file
pub fn save_config<P: AsRef<Path>>(config: &FaultlineConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    let contents = match ConfigFormat::from_path(path) {
        ConfigFormat::Json => {
            serde_json::to_string_pretty(config).context("Failed to serialize JSON config")?
        }
        ConfigFormat::Yaml => {
            serde_yaml::to_string(config).context("Failed to serialize YAML config")?
        }
    };

    std::fs::write(path, contents).with_context(|| format!("write config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn usable_jira() -> JiraConfig {
        JiraConfig {
            enabled: true,
            base_url: "https://acme.atlassian.net".into(),
            username: "qa@acme.test".into(),
            api_token: "secret".into(),
            project_key: "QA".into(),
            ..JiraConfig::default()
        }
    }

    #[test]
    fn config_default_values() {
        let config = FaultlineConfig::default();
        assert!(!config.jira.enabled);
        assert_eq!(config.jira.issue_type, "Bug");
        assert_eq!(config.jira.default_priority, "Medium");
        assert_eq!(config.jira.link_type, "Relates");
        assert_eq!(config.jira.timeout_secs, 30);
        assert!(!config.jira.create_duplicates);
        assert_eq!(config.reports.dir, PathBuf::from("reports"));
        assert_eq!(config.lock_dir(), PathBuf::from("reports").join(".locks"));
        assert_eq!(config.lock.timeout_secs, 30);
    }

    #[test]
    fn jira_usable_requires_every_field() {
        assert!(usable_jira().is_usable());

        let disabled = JiraConfig {
            enabled: false,
            ..usable_jira()
        };
        assert!(!disabled.is_usable());

        let no_token = JiraConfig {
            api_token: "  ".into(),
            ..usable_jira()
        };
        assert!(!no_token.is_usable());
        assert_eq!(no_token.missing_fields(), vec!["api_token"]);
    }

    #[test]
    fn xray_needs_jira_and_cloud_credentials() {
        let mut xray = XrayConfig {
            enabled: true,
            ..XrayConfig::default()
        };
        assert!(xray.is_usable(&usable_jira()));
        assert!(!xray.is_usable(&JiraConfig::default()));

        xray.cloud = true;
        assert!(!xray.is_usable(&usable_jira()));
        xray.client_id = "id".into();
        xray.client_secret = "shh".into();
        assert!(xray.is_usable(&usable_jira()));
    }

    #[test]
    fn ai_usable_needs_key() {
        let mut ai = AiConfig {
            enabled: true,
            ..AiConfig::default()
        };
        assert!(!ai.is_usable());
        ai.api_key = Some("sk-test".into());
        assert!(ai.is_usable());
    }

    #[test]
    fn env_overrides_file_values() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("faultline.yaml");
        std::fs::write(
            &path,
            "jira:\n  enabled: false\n  project_key: FILE\n  labels: [ui]\nreports:\n  dir: out\n",
        )
        .unwrap();

        let config = FaultlineConfig::load_with(
            Some(&path),
            env(&[
                ("JIRA_ENABLED", "YES"),
                ("JIRA_PROJECT_KEY", "ENV"),
                ("JIRA_COMPONENTS", "web, ,api"),
                ("FAULTLINE_LOG", "debug"),
            ]),
        )
        .unwrap();

        assert!(config.jira.enabled);
        assert_eq!(config.jira.project_key, "ENV");
        assert_eq!(config.jira.labels, vec!["ui"]);
        assert_eq!(config.jira.components, vec!["web", "api"]);
        assert_eq!(config.reports.dir, PathBuf::from("out"));
        assert_eq!(config.lock_dir(), PathBuf::from("out").join(".locks"));
        assert_eq!(config.logging.level, LogLevel::Debug);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut config = FaultlineConfig::default();
        config.jira.project_key = "QA".into();
        config
            .apply_env_with(env(&[("JIRA_PROJECT_KEY", "   "), ("JIRA_ENABLED", "")]))
            .unwrap();
        assert_eq!(config.jira.project_key, "QA");
        assert!(!config.jira.enabled);
    }

    #[test]
    fn invalid_bool_is_an_error() {
        let err = FaultlineConfig::default()
            .apply_env_with(env(&[("XRAY_ENABLED", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("XRAY_ENABLED"));
    }

    #[test]
    fn invalid_timeout_is_an_error() {
        let mut config = FaultlineConfig::default();
        assert!(
            config
                .apply_env_with(env(&[("FAULTLINE_LOCK_TIMEOUT_SECS", "-3")]))
                .is_err()
        );
    }

    #[test]
    fn parse_bool_accepts_all_spellings() {
        for v in ["true", "TRUE", "1", "yes", "Yes"] {
            assert!(parse_bool("X", v).unwrap());
        }
        for v in ["false", "0", "no", "NO"] {
            assert!(!parse_bool("X", v).unwrap());
        }
    }

    #[test]
    fn ticket_defaults_carry_global_options() {
        let jira = JiraConfig {
            default_priority: "High".into(),
            labels: vec!["nightly".into()],
            ..JiraConfig::default()
        };
        let defaults = jira.ticket_defaults();
        assert_eq!(defaults.priority.as_deref(), Some("High"));
        assert_eq!(defaults.labels, Some(vec!["nightly".to_string()]));
        assert_eq!(defaults.components, None);
    }

    #[test]
    fn load_save_yaml_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut config = FaultlineConfig::default();
        config.jira = usable_jira();
        config.xray.execution_key = Some("QA-100".into());
        config.lock.dir = Some(PathBuf::from("/tmp/locks"));

        save_config(&config, &config_path).unwrap();
        let loaded = load_config(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn load_save_json_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let config = FaultlineConfig::default();
        save_config(&config, &config_path).unwrap();
        let loaded = load_config(&config_path).unwrap();
        assert_eq!(loaded.reports.dir, config.reports.dir);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope.yaml");
        assert!(FaultlineConfig::load_with(Some(&missing), env(&[])).is_err());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("faultline.json");
        std::fs::write(&path, r#"{"jira":{"project_key":"QA"}}"#).unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.jira.project_key, "QA");
        assert_eq!(loaded.jira.issue_type, "Bug");
        assert_eq!(loaded.ai.model, "gpt-4o-mini");
    }
}
