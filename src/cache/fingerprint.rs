//! Canonical cache keys.
//!
//! Two inputs that differ only in object key order or in whitespace around
//! string values produce the same key. Array order is meaningful and kept.

use serde_json::Value;

use crate::util::sha256_hex;

/// Serialize with object keys written in sorted order regardless of how the
/// underlying map orders them.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::String(s) => out.push_str(&Value::String(s.trim().to_string()).to_string()),
        other => out.push_str(&other.to_string()),
    }
}

/// Hex SHA-256 of `category` and the canonical form of `input`.
pub fn fingerprint(category: &str, input: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(input, &mut canonical);
    let mut material = Vec::with_capacity(category.len() + 1 + canonical.len());
    material.extend_from_slice(category.as_bytes());
    material.push(0);
    material.extend_from_slice(canonical.as_bytes());
    sha256_hex(&material)
}
