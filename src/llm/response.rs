//! Turning raw model text into typed values.
//!
//! Model output is untrusted text. It is reduced to a single JSON object and
//! deserialized into the caller's schema type; anything that does not fit is
//! a `SchemaError`.

use serde::de::DeserializeOwned;

use crate::error::SchemaError;

/// Schema types that carry rules serde alone cannot express.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

/// Strip markdown code fences from output (```json ... ``` or ```...```)
pub fn strip_markdown_fences(content: &str) -> &str {
    let trimmed = content.trim();
    if !(trimmed.starts_with("```") && trimmed.ends_with("```") && trimmed.len() >= 6) {
        return trimmed;
    }
    let inner = &trimmed[3..trimmed.len() - 3];
    // Drop the language tag on the opening fence line
    match inner.find('\n') {
        Some(nl) if !inner[..nl].contains('{') => inner[nl + 1..].trim(),
        _ => inner.trim(),
    }
}

/// The outermost `{ ... }` span, tolerating prose before and after it.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let text = strip_markdown_fences(text);
    if let Some(start) = text.find("```json") {
        let body = &text[start + 7..];
        if let Some(end) = body.find("```") {
            return extract_json_object(&body[..end]);
        }
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse model output into `T`, rejecting anything that does not match.
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, SchemaError> {
    let json = extract_json_object(raw).ok_or(SchemaError::NoJson)?;
    Ok(serde_json::from_str(json)?)
}

/// `parse_json` followed by the type's own validation rules.
pub fn parse_validated<T: DeserializeOwned + Validate>(raw: &str) -> Result<T, SchemaError> {
    let value: T = parse_json(raw)?;
    value.validate().map_err(SchemaError::Rejected)?;
    Ok(value)
}
