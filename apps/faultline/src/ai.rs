//! AI helper commands. Each one prints a notice and succeeds when AI is off.

use crate::{DataKind, TestKind};
use anyhow::{Context, Result, bail};
use faultline_ai::{
    AiCapability, DataGenerator, DbKind, LlmBackend, LlmFailureAnalyzer, TestGenerator,
    api_test_name,
};
use faultline_config::FaultlineConfig;
use faultline_ports::FailureAnalyzer;
use faultline_schema::analysis::AnalysisRequest;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub struct DataArgs {
    pub kind: DataKind,
    pub output: Option<PathBuf>,
    pub count: usize,
    pub endpoint: Option<String>,
    pub method: String,
    pub form_name: Option<String>,
    pub fields: Option<String>,
    pub constraints: Option<String>,
}

pub struct TestArgs {
    pub kind: TestKind,
    pub description: String,
    pub output: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub method: String,
    pub page_name: Option<String>,
    pub steps: Option<String>,
    pub db_type: Option<String>,
    pub query: Option<String>,
}

pub struct FailureArgs {
    pub test_name: String,
    pub error: String,
    pub test_file: PathBuf,
    pub screenshot: Option<PathBuf>,
    pub response: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

/// The backend, or `None` after printing why AI is unavailable.
fn backend(config: &FaultlineConfig) -> Option<Box<dyn LlmBackend>> {
    match AiCapability::backend(&config.ai) {
        (_, Some(backend)) => Some(backend),
        (AiCapability::Unavailable(reason), None) => {
            println!("{reason}");
            None
        }
        (AiCapability::Available, None) => None,
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_constraints(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str(raw).with_context(|| format!("invalid JSON in constraints: {raw}"))? {
        Value::Object(map) => Ok(map),
        other => bail!("constraints must be a JSON object, got {other}"),
    }
}

fn write_output(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {parent:?}"))?;
    }
    std::fs::write(path, text).with_context(|| format!("write {path:?}"))
}

/// Pretty JSON to `output`, or stdout.
fn emit_json(value: &impl serde::Serialize, output: Option<&Path>, what: &str) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    match output {
        Some(path) => {
            write_output(path, &text)?;
            println!("{what} saved to {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}

pub fn generate_data(config: &FaultlineConfig, args: &DataArgs) -> Result<()> {
    let Some(backend) = backend(config) else {
        return Ok(());
    };
    let constraints = parse_constraints(args.constraints.as_deref())?;
    let generator = DataGenerator::new(backend.as_ref());

    let results: Vec<Value> = match args.kind {
        DataKind::User => (0..args.count)
            .map(|_| generator.user_profile(&constraints))
            .collect::<Result<_>>()?,
        DataKind::Api => {
            let Some(endpoint) = args.endpoint.as_deref() else {
                bail!("--endpoint is required for API data generation");
            };
            let schema = (!constraints.is_empty()).then(|| Value::Object(constraints.clone()));
            (0..args.count)
                .map(|_| generator.api_payload(endpoint, &args.method, schema.as_ref()))
                .collect::<Result<_>>()?
        }
        DataKind::Form => {
            let (Some(form), Some(fields)) = (args.form_name.as_deref(), args.fields.as_deref())
            else {
                bail!("--form-name and --fields are required for form data generation");
            };
            let fields = split_list(fields);
            (0..args.count)
                .map(|_| generator.form_data(form, &fields))
                .collect::<Result<_>>()?
        }
        DataKind::Dataset => {
            let Some(data_type) = args.fields.as_deref().map(str::trim).filter(|s| !s.is_empty())
            else {
                bail!("--fields is required for dataset generation (names the object kind)");
            };
            generator.dataset(data_type, args.count, &constraints)?
        }
    };
    emit_json(&results, args.output.as_deref(), "Data")
}

pub fn generate_test(config: &FaultlineConfig, args: &TestArgs) -> Result<()> {
    let Some(backend) = backend(config) else {
        return Ok(());
    };
    let generator = TestGenerator::new(backend.as_ref());

    let (code, default_name) = match args.kind {
        TestKind::Api => {
            let Some(endpoint) = args.endpoint.as_deref() else {
                bail!("--endpoint is required for API test generation");
            };
            (
                generator.api_test(endpoint, &args.method, &args.description)?,
                api_test_name(&args.method, endpoint),
            )
        }
        TestKind::Ui => {
            let (Some(page), Some(steps)) = (args.page_name.as_deref(), args.steps.as_deref())
            else {
                bail!("--page-name and --steps are required for UI test generation");
            };
            (
                generator.ui_test(page, &args.description, &split_list(steps))?,
                format!("test_{}", page.to_ascii_lowercase().replace(' ', "_")),
            )
        }
        TestKind::Db => {
            let (Some(db), Some(query)) = (args.db_type.as_deref(), args.query.as_deref()) else {
                bail!("--db-type and --query are required for DB test generation");
            };
            let db: DbKind = db.parse()?;
            (
                generator.db_test(db, query, &args.description)?,
                format!("test_db_{db}"),
            )
        }
    };

    let path = args
        .output
        .clone()
        .unwrap_or_else(|| Path::new("tests").join(format!("{default_name}.rs")));
    write_output(&path, &format!("{code}\n"))?;
    println!("Test saved to {}", path.display());
    Ok(())
}

pub fn analyze_test(config: &FaultlineConfig, file: &Path, output: Option<&Path>) -> Result<()> {
    let Some(backend) = backend(config) else {
        return Ok(());
    };
    let code = std::fs::read_to_string(file).with_context(|| format!("read test file {file:?}"))?;
    let review = LlmFailureAnalyzer::new(backend).suggest_improvements(&code)?;
    emit_json(&review, output, "Analysis")
}

pub fn analyze_failure(config: &FaultlineConfig, args: &FailureArgs) -> Result<()> {
    let Some(backend) = backend(config) else {
        return Ok(());
    };
    let test_code = std::fs::read_to_string(&args.test_file)
        .with_context(|| format!("read test file {:?}", args.test_file))?;
    let response_data = match &args.response {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(path = ?path, error = %e, "could not read response data, continuing without it");
                None
            }
        },
        None => None,
    };

    let analysis = LlmFailureAnalyzer::new(backend).analyze(&AnalysisRequest {
        test_name: args.test_name.clone(),
        error_message: args.error.clone(),
        test_code,
        screenshot_path: args.screenshot.clone(),
        response_data,
    })?;
    emit_json(&analysis, args.output.as_deref(), "Analysis")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_are_trimmed() {
        assert_eq!(split_list(" email, ,password "), vec!["email", "password"]);
    }

    #[test]
    fn constraints_must_be_an_object() {
        assert!(parse_constraints(None).unwrap().is_empty());
        assert_eq!(
            parse_constraints(Some(r#"{"country":"US"}"#)).unwrap()["country"],
            "US"
        );
        assert!(parse_constraints(Some("[1]")).is_err());
        assert!(parse_constraints(Some("{oops")).is_err());
    }

    #[test]
    fn output_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.json");
        write_output(&path, "{}").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{}");
    }
}
