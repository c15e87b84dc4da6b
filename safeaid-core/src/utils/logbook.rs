// src/utils/logbook.rs
use anyhow::Result;
use serde::Serialize;
use serde_json::{Value, json};
use std::{fs, io::Write, path::Path};

/// Append one JSON value as a line to `path`, creating parent dirs.
pub fn append_jsonl<S: Serialize>(path: &Path, val: &S) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string(val)?;
    let mut f = fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(f, "{}", json)?;
    Ok(())
}

pub fn emit_event(path: &Path, event: &str, data: &Value, ts: &str) -> Result<()> {
    let line = json!({
        "timestamp": ts,
        "event": event,
        "data": data
    });
    append_jsonl(path, &line)
}

/// Single-line preview: newlines removed, at most `max_chars` characters
/// followed by an ellipsis when cut.
pub fn redact_preview(s: &str, max_chars: usize) -> String {
    let flat = s.replace(['\n', '\r'], " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut t: String = flat.chars().take(max_chars).collect();
    t.push('…');
    t
}

/// Apply [`redact_preview`] to every top-level string field of an object.
pub fn redact_payload(payload: &Value, max_chars: usize) -> Value {
    match payload {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => Value::String(redact_preview(s, max_chars)),
                        other => other.clone(),
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}
