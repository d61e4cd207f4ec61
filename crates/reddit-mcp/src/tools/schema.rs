//! Declared-schema argument validation.
//!
//! Tools and sampling continuations declare their shapes in the JSON Schema
//! subset used throughout this crate: `type`, `properties`, `required`,
//! `enum`, and `items`. Validation collects every offending field path so
//! the caller can report all of them at once.

use serde_json::Value;

/// Validate `value` against a declared schema.
///
/// # Errors
///
/// Returns the list of offending field paths (dot-separated, `$` for the
/// root) when validation fails.
pub fn validate(schema: &Value, value: &Value) -> Result<(), Vec<String>> {
    let mut paths = Vec::new();
    check(schema, value, "$", &mut paths);
    if paths.is_empty() {
        Ok(())
    } else {
        Err(paths)
    }
}

fn check(schema: &Value, value: &Value, path: &str, paths: &mut Vec<String>) {
    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            paths.push(path.to_string());
            return;
        }
    }

    let Some(declared) = schema.get("type").and_then(Value::as_str) else {
        return;
    };

    match declared {
        "object" => check_object(schema, value, path, paths),
        "array" => check_array(schema, value, path, paths),
        "string" => {
            if !value.is_string() {
                paths.push(path.to_string());
            }
        }
        "integer" => {
            if !value.is_i64() && !value.is_u64() {
                paths.push(path.to_string());
            }
        }
        "number" => {
            if !value.is_number() {
                paths.push(path.to_string());
            }
        }
        "boolean" => {
            if !value.is_boolean() {
                paths.push(path.to_string());
            }
        }
        _ => {}
    }
}

fn check_object(schema: &Value, value: &Value, path: &str, paths: &mut Vec<String>) {
    let Some(map) = value.as_object() else {
        paths.push(path.to_string());
        return;
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(name) {
                paths.push(join(path, name));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop_schema) in properties {
            if let Some(prop_value) = map.get(name) {
                check(prop_schema, prop_value, &join(path, name), paths);
            }
        }
    }
}

fn check_array(schema: &Value, value: &Value, path: &str, paths: &mut Vec<String>) {
    let Some(items) = value.as_array() else {
        paths.push(path.to_string());
        return;
    };

    if let Some(item_schema) = schema.get("items") {
        for (index, item) in items.iter().enumerate() {
            check(item_schema, item, &format!("{path}[{index}]"), paths);
        }
    }
}

fn join(path: &str, name: &str) -> String {
    if path == "$" {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}
