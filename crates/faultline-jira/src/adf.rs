//! Atlassian Document Format helpers.
//!
//! Jira Cloud v3 takes descriptions and comments as ADF documents. Blank-line
//! separated blocks become paragraphs; single newlines become hard breaks.

use serde_json::{Value, json};

/// Wrap plain text in an ADF `doc`.
pub fn document(text: &str) -> Value {
    let content: Vec<Value> = text
        .split("\n\n")
        .map(|block| block.trim_matches('\n'))
        .filter(|block| !block.trim().is_empty())
        .map(paragraph)
        .collect();
    json!({
        "type": "doc",
        "version": 1,
        "content": content,
    })
}

fn paragraph(block: &str) -> Value {
    let mut nodes = Vec::new();
    for (i, line) in block.lines().enumerate() {
        if i > 0 {
            nodes.push(json!({ "type": "hardBreak" }));
        }
        // ADF rejects empty text nodes
        if !line.is_empty() {
            nodes.push(json!({ "type": "text", "text": line }));
        }
    }
    json!({ "type": "paragraph", "content": nodes })
}

/// Flatten an ADF node (or a plain string from older APIs) back to text.
pub fn to_text(node: &Value) -> String {
    match node {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("type").and_then(Value::as_str) {
            Some("text") => map
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Some("hardBreak") => "\n".to_string(),
            Some("doc") => children(node)
                .iter()
                .map(to_text)
                .collect::<Vec<_>>()
                .join("\n\n"),
            _ => children(node).iter().map(to_text).collect(),
        },
        _ => String::new(),
    }
}

fn children(node: &Value) -> &[Value] {
    node.get("content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_is_one_paragraph() {
        let doc = document("boom");
        assert_eq!(
            doc,
            json!({
                "type": "doc",
                "version": 1,
                "content": [{"type": "paragraph", "content": [{"type": "text", "text": "boom"}]}]
            })
        );
    }

    #[test]
    fn blocks_and_line_breaks() {
        let doc = document("Error: boom\nat line 3\n\nStack trace:\n\n\n");
        let content = doc["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert_eq!(content[0]["content"][1]["type"], "hardBreak");
        assert_eq!(to_text(&doc), "Error: boom\nat line 3\n\nStack trace:");
    }

    #[test]
    fn empty_text_is_empty_doc() {
        assert_eq!(document("")["content"], json!([]));
        assert_eq!(to_text(&document("")), "");
    }

    #[test]
    fn blank_lines_inside_block_produce_no_empty_text_nodes() {
        let doc = document("a\n \nb");
        let nodes = doc["content"][0]["content"].as_array().unwrap();
        assert!(nodes.iter().all(|n| n.get("text") != Some(&json!(""))));
    }

    #[test]
    fn plain_string_description_passes_through() {
        assert_eq!(to_text(&json!("server text")), "server text");
        assert_eq!(to_text(&Value::Null), "");
    }
}
