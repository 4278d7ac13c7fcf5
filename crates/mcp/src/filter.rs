//! Argument filtering for model-produced function calls.
//!
//! Models frequently emit optional parameters with placeholder empty
//! values, and providers often reject calls containing them. The filter
//! drops those placeholders without ever dropping a genuinely required
//! field. It works against the tool's *original* (unsanitized) schema —
//! the `required` list must come from what the provider declared.

use serde_json::{Map, Value};

/// Filter `arguments` against `schema`:
///
/// - every key in the schema's `required` list is retained regardless of
///   value, null and empty string included;
/// - keys present in the schema's `properties` are retained only when the
///   value is neither null nor an empty string;
/// - everything else is dropped.
///
/// An absent or malformed schema returns the arguments unchanged.
pub fn filter_arguments(arguments: &Map<String, Value>, schema: &Value) -> Map<String, Value> {
    let Some(schema_obj) = schema.as_object() else {
        return arguments.clone();
    };

    let required: Vec<&str> = schema_obj
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let properties = schema_obj
        .get("properties")
        .and_then(Value::as_object);

    let mut filtered = Map::new();
    for (key, value) in arguments {
        if required.contains(&key.as_str()) {
            filtered.insert(key.clone(), value.clone());
        } else if properties.is_some_and(|p| p.contains_key(key)) && !is_unset(value) {
            filtered.insert(key.clone(), value.clone());
        }
    }

    filtered
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
