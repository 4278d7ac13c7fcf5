//! Parameter schema sanitization.
//!
//! Tool providers declare JSON Schema with validation-only keys the
//! completion API's function-calling format rejects. Sanitization strips
//! those keys recursively and leaves everything else untouched. It is
//! fail-open: malformed input comes back unchanged, since failing closed
//! would remove an otherwise-usable tool.

use serde_json::Value;

/// Keys the completion API's function-declaration format does not accept.
const UNSUPPORTED_KEYS: &[&str] = &["additionalProperties", "$schema", "const"];

/// Return a structurally identical copy of `schema` with unsupported keys
/// removed at every nesting depth. The input is never mutated.
pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !UNSUPPORTED_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), sanitize_schema(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}
