//! JSONL line rendering for the preview pane
//!
//! Lines of `.jsonl` / `.ndjson` objects are parsed individually and
//! rendered as a flat `key: value` summary, which reads better in a
//! one-line-per-record pane than raw JSON. Lines that do not parse (or
//! are still incomplete mid-stream) fall back to their raw text.

use serde_json::Value;

/// Is this key a JSON-lines document (possibly compressed)?
pub fn is_jsonl_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    let base = lower
        .strip_suffix(".gz")
        .or_else(|| lower.strip_suffix(".zst"))
        .or_else(|| lower.strip_suffix(".zstd"))
        .unwrap_or(&lower);
    base.ends_with(".jsonl") || base.ends_with(".ndjson")
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => {
            // Long strings dominate a summary line; keep a prefix.
            if s.chars().count() > 60 {
                let head: String = s.chars().take(57).collect();
                format!("\"{}…\"", head)
            } else {
                format!("{:?}", s)
            }
        }
        Value::Array(items) => format!("[{} items]", items.len()),
        Value::Object(map) => format!("{{{} fields}}", map.len()),
        other => other.to_string(),
    }
}

/// Render one JSONL record as `key: value, key: value, …`.
///
/// Returns `None` when the line is not a JSON object, letting the caller
/// show the raw text instead.
pub fn summarize_line(line: &str) -> Option<String> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;
    let object = value.as_object()?;

    let mut out = String::new();
    for (i, (key, value)) in object.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&render_scalar(value));
    }
    Some(out)
}
