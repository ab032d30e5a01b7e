use crate::client::{LlmBackend, Prompt};
use crate::parse;
use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use tracing::warn;

const GENERATOR: &str = "You are a test data generator that outputs only valid JSON.";
const ARRAY_GENERATOR: &str = "You are a test data generator that outputs only valid JSON arrays.";
const TEMPERATURE: f64 = 0.7;

/// Realistic test data from an LLM.
///
/// Provider errors propagate. An answer that is not JSON is replaced by a
/// fixed fallback value and logged.
pub struct DataGenerator<'a> {
    backend: &'a dyn LlmBackend,
}

fn constraints_text(constraints: &Map<String, Value>) -> String {
    if constraints.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = constraints
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{k}: {s}"),
            other => format!("{k}: {other}"),
        })
        .collect();
    format!(" with these constraints: {}", parts.join(", "))
}

/// Placeholder profile used when the answer is unusable.
pub fn fallback_user() -> Value {
    json!({
        "name": "Test User",
        "email": "test@example.com",
        "age": 30,
        "address": "123 Test St",
        "phone": "555-123-4567"
    })
}

impl<'a> DataGenerator<'a> {
    pub fn new(backend: &'a dyn LlmBackend) -> Self {
        Self { backend }
    }

    fn ask(&self, system: &str, user: String) -> Result<String> {
        self.backend
            .complete(&Prompt::new(system, user).temperature(TEMPERATURE))
            .context("request test data")
    }

    /// A user profile with name, email, age, address and phone.
    pub fn user_profile(&self, constraints: &Map<String, Value>) -> Result<Value> {
        let content = self.ask(
            GENERATOR,
            format!(
                "Generate a JSON object for a user profile{}. Include name, email, age, address, and phone number fields.",
                constraints_text(constraints)
            ),
        )?;
        Ok(parse::json_value(&content).unwrap_or_else(|| {
            warn!("user profile answer was not JSON, using fallback");
            fallback_user()
        }))
    }

    /// Request body for `method endpoint`, optionally following a JSON schema.
    pub fn api_payload(&self, endpoint: &str, method: &str, schema: Option<&Value>) -> Result<Value> {
        let schema_text = schema
            .map(|s| format!(" following this schema: {s}"))
            .unwrap_or_default();
        let content = self.ask(
            GENERATOR,
            format!(
                "Generate a valid JSON payload for a {} request to {endpoint} endpoint{schema_text}.",
                method.to_ascii_uppercase()
            ),
        )?;
        Ok(parse::json_value(&content).unwrap_or_else(|| {
            warn!(endpoint, "API payload answer was not JSON, using empty object");
            json!({})
        }))
    }

    /// `count` objects of kind `data_type`. A single object answer becomes a one-item list.
    pub fn dataset(
        &self,
        data_type: &str,
        count: usize,
        constraints: &Map<String, Value>,
    ) -> Result<Vec<Value>> {
        let content = self.ask(
            ARRAY_GENERATOR,
            format!(
                "Generate a JSON array containing {count} {data_type} objects{}. Each object should have appropriate fields for a {data_type}.",
                constraints_text(constraints)
            ),
        )?;
        Ok(match parse::json_value(&content) {
            Some(Value::Array(items)) => items,
            Some(obj @ Value::Object(_)) => vec![obj],
            Some(other) => {
                warn!(kind = %json_kind(&other), "dataset answer was not an array or object");
                Vec::new()
            }
            None => {
                warn!("dataset answer was not JSON");
                Vec::new()
            }
        })
    }

    /// Values for a form, keyed by field name.
    pub fn form_data(&self, form_name: &str, fields: &[String]) -> Result<Value> {
        let content = self.ask(
            GENERATOR,
            format!(
                "Generate valid form data for a {form_name} form with these fields: {}. Return as JSON with the field names as keys.",
                fields.join(", ")
            ),
        )?;
        Ok(parse::json_value(&content).unwrap_or_else(|| {
            warn!(form = form_name, "form answer was not JSON, using placeholders");
            Value::Object(
                fields
                    .iter()
                    .map(|f| (f.clone(), Value::String(format!("test_{f}"))))
                    .collect(),
            )
        }))
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
