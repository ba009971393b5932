//! `Telemetry.getCode`: source text for the observer's code view

use serde_json::{json, Value};
use std::path::{Path, PathBuf};

pub const GET_CODE: &str = "Telemetry.getCode";

#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Relative names resolve against `root` when given
#[must_use]
pub fn resolve(name: &str, root: Option<&Path>) -> PathBuf {
    let path = Path::new(name);
    match root {
        Some(root) if path.is_relative() => root.join(path),
        _ => path.to_path_buf(),
    }
}

/// Escaped file content, or the read error as text
pub async fn read_code(path: &Path) -> Result<String, String> {
    tokio::fs::read_to_string(path)
        .await
        .map(|content| escape_html(&content))
        .map_err(|e| format!("{}: {e}", path.display()))
}

/// `{method, result: {content}}`, with `error` and null content on failure
#[must_use]
pub fn get_code_response(outcome: Result<String, String>) -> Value {
    match outcome {
        Ok(content) => json!({"method": GET_CODE, "result": {"content": content}}),
        Err(error) => json!({"method": GET_CODE, "result": {"content": null}, "error": error}),
    }
}
