use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::ExtractionError;
use crate::models::{LabField, LabValues};
use crate::pipeline::normalize::normalize_json;

/// Field mapping recovered from a model reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedReply {
    pub identifier: Option<String>,
    pub values: LabValues,
    /// Keys present in the reply that match no known field.
    pub ignored_keys: Vec<String>,
}

/// Parse a free-form model reply into a field mapping.
///
/// Code fences are stripped, the text between the first `{` and the last
/// `}` is parsed as a JSON object. Recognized keys map to a number or
/// `None`; unknown keys are ignored; absent keys are `None`. Any failure
/// carries the full raw reply.
pub fn parse_extraction_reply(raw: &str) -> Result<ParsedReply, ExtractionError> {
    let json = extract_json_object(raw)?;
    let object: Map<String, Value> = serde_json::from_str(&json)
        .map_err(|e| unparseable(format!("Invalid JSON object: {e}"), raw))?;

    let mut reply = ParsedReply::default();
    let mut aliased = Vec::new();

    for (key, value) in &object {
        if key.trim().eq_ignore_ascii_case("ID") {
            reply.identifier = identifier_from(value);
            continue;
        }
        match LabField::from_key(key) {
            Some(field) if field.key().eq_ignore_ascii_case(key.trim()) => {
                reply.values.set(field, field_value(field, value));
            }
            Some(field) => aliased.push((field, value)),
            None => reply.ignored_keys.push(key.clone()),
        }
    }

    // Canonical keys win; aliases only fill what is still missing.
    for (field, value) in aliased {
        if reply.values.get(field).is_none() {
            reply.values.set(field, field_value(field, value));
        }
    }

    if !reply.ignored_keys.is_empty() {
        debug!(keys = ?reply.ignored_keys, "Ignoring unrecognized reply keys");
    }

    Ok(reply)
}

/// Strip markdown fences and slice from the first `{` to the last `}`.
fn extract_json_object(raw: &str) -> Result<String, ExtractionError> {
    let cleaned = raw
        .replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "");
    let cleaned = cleaned.trim();

    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(cleaned[start..=end].to_string()),
        _ => Err(unparseable("No JSON object found in reply".into(), raw)),
    }
}

fn unparseable(reason: String, raw: &str) -> ExtractionError {
    ExtractionError::Unparseable {
        reason,
        raw: raw.to_string(),
    }
}

fn identifier_from(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if text.is_empty() || text == "..." || text.eq_ignore_ascii_case("null") {
        return None;
    }
    Some(text)
}

fn field_value(field: LabField, value: &Value) -> Option<f64> {
    let normalized = normalize_json(value);
    if normalized.is_none() && !value.is_null() {
        warn!(field = field.key(), value = %value, "Unreadable value treated as missing");
    }
    normalized
}
