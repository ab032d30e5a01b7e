//! Turning free-form model output into structured values.
//!
//! Models are asked for JSON but do not always comply, so every parser tries
//! a fenced block first, then the whole text, then falls back.

use faultline_schema::analysis::FailureAnalysis;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::LazyLock;

static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```([A-Za-z0-9_+-]*)[ \t]*\r?\n?([\s\S]*?)\s*```")
        .unwrap_or_else(|e| panic!("invalid fence pattern: {e}"))
});

/// Body of the first fenced block tagged `lang`, or of the first untagged one.
pub fn fenced_block<'a>(content: &'a str, lang: &str) -> Option<&'a str> {
    let mut untagged = None;
    for caps in FENCE.captures_iter(content) {
        let tag = caps.get(1).map_or("", |m| m.as_str());
        let body = caps.get(2).map_or("", |m| m.as_str());
        if tag.eq_ignore_ascii_case(lang) {
            return Some(body);
        }
        if tag.is_empty() && untagged.is_none() {
            untagged = Some(body);
        }
    }
    untagged
}

/// JSON from a ```json block, or the whole content.
pub fn json_value(content: &str) -> Option<Value> {
    let candidate = fenced_block(content, "json").unwrap_or(content).trim();
    serde_json::from_str(candidate).ok()
}

/// Code from a fenced block in `lang`, or the whole content trimmed.
pub fn code_block(content: &str, lang: &str) -> String {
    fenced_block(content, lang)
        .unwrap_or(content)
        .trim()
        .to_string()
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(alias = "rootCause", alias = "likely_root_cause", default)]
    root_cause: Option<String>,
    #[serde(
        alias = "suggestedFixes",
        alias = "fixes",
        default,
        deserialize_with = "string_or_list"
    )]
    suggested_fixes: Vec<String>,
    #[serde(
        alias = "preventionStrategies",
        alias = "prevention",
        default,
        deserialize_with = "string_or_list"
    )]
    prevention_strategies: Vec<String>,
}

fn string_or_list<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<Value>),
    }
    Ok(match Option::<OneOrMany>::deserialize(de)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(items)) => items
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
    })
}

/// Text following `heading:` up to a blank line, a numbered item, or the end.
fn section(content: &str, heading: &str) -> Option<String> {
    let pattern = format!(r"(?is){}:\s*(.*?)(?:\n\n|\n\d\.|\z)", regex::escape(heading));
    let re = Regex::new(&pattern).ok()?;
    let text = re.captures(content)?.get(1)?.as_str().trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|l| l.trim().trim_start_matches(['-', '*']).trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Failure analysis from model output. Never fails; unknown parts get placeholders.
pub fn failure_analysis(content: &str) -> FailureAnalysis {
    let fallback = FailureAnalysis::undetermined();
    if let Some(value) = json_value(content)
        && let Ok(raw) = serde_json::from_value::<RawAnalysis>(value)
    {
        return FailureAnalysis {
            root_cause: raw
                .root_cause
                .filter(|r| !r.trim().is_empty())
                .unwrap_or(fallback.root_cause),
            suggested_fixes: raw.suggested_fixes,
            prevention_strategies: raw.prevention_strategies,
        };
    }

    FailureAnalysis {
        root_cause: section(content, "root cause").unwrap_or(fallback.root_cause),
        suggested_fixes: section(content, "suggested fixes")
            .map(|s| lines(&s))
            .unwrap_or(fallback.suggested_fixes),
        prevention_strategies: section(content, "prevention strategies")
            .map(|s| lines(&s))
            .unwrap_or(fallback.prevention_strategies),
    }
}

/// Review of a test's source across five aspects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestImprovements {
    pub readability: String,
    pub maintainability: String,
    pub robustness: String,
    pub best_practices: String,
    pub performance: String,
}

fn aspect_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        other => Some(other.to_string()),
    }
}

/// Improvement suggestions from model output. Missing aspects say so.
pub fn test_improvements(content: &str) -> TestImprovements {
    let json = json_value(content);
    let aspect = |key: &str, heading: &str| {
        let found = match &json {
            Some(v) => v.get(key).or_else(|| v.get(heading)).and_then(aspect_text),
            None => section(content, heading),
        };
        found.unwrap_or_else(|| format!("No suggestions for {}", heading.to_lowercase()))
    };
    TestImprovements {
        readability: aspect("readability", "Readability"),
        maintainability: aspect("maintainability", "Maintainability"),
        robustness: aspect("robustness", "Robustness"),
        best_practices: aspect("best_practices", "Best practices"),
        performance: aspect("performance", "Performance"),
    }
}
