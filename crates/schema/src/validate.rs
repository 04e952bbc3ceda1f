//! Declaration grammar checks.
//!
//! Both functions return every problem found instead of stopping at the first,
//! so a user fixing a schema file sees the whole list at once.

use serde_json::{Map, Value};

use crate::types::{BaseType, VectorType, OPTION_KEYS};

/// JSON kind name used in error messages
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn invalid_type(name: &str, raw: &str) -> String {
    format!(
        "Attribute '{name}': invalid type '{raw}'. \
         Valid types: bool, string, uint64, uuid, or vector format [dims]f32/f16"
    )
}

fn dimensions_out_of_range(name: &str, raw: &str) -> String {
    format!(
        "Attribute '{name}': vector type '{raw}' has an out-of-range dimension. \
         Dimensions must be between 1 and {}",
        u32::MAX
    )
}

/// Check one attribute declaration. An empty result means it is valid.
pub fn validate_attribute(name: &str, value: &Value) -> Vec<String> {
    let mut errors = Vec::new();

    if name.is_empty() {
        errors.push("Attribute name cannot be empty".to_string());
    }

    match value {
        Value::String(raw) => {
            if VectorType::has_dimensions_out_of_range(raw) {
                errors.push(dimensions_out_of_range(name, raw));
            } else if BaseType::parse(raw).is_none() {
                errors.push(invalid_type(name, raw));
            }
        }
        Value::Object(map) => match map.get("type") {
            None => errors.push(format!(
                "Attribute '{name}': complex type object must have a 'type' key"
            )),
            Some(Value::String(raw)) => {
                if VectorType::has_dimensions_out_of_range(raw) {
                    errors.push(dimensions_out_of_range(name, raw));
                } else if BaseType::parse(raw).is_none() {
                    errors.push(format!(
                        "Attribute '{name}': invalid base type '{raw}' in complex type"
                    ));
                }
                for (key, option) in map.iter().filter(|(key, _)| key.as_str() != "type") {
                    if !OPTION_KEYS.contains(&key.as_str()) {
                        errors.push(format!(
                            "Attribute '{name}': unknown key '{key}' in complex type. \
                             Allowed keys: type, {}",
                            OPTION_KEYS.join(", ")
                        ));
                    } else if !option.is_boolean() {
                        errors.push(format!("Attribute '{name}': '{key}' must be a boolean"));
                    }
                }
            }
            Some(_) => errors.push(format!("Attribute '{name}': 'type' must be a string")),
        },
        other => errors.push(format!(
            "Attribute '{name}': type must be a string or object, got {}",
            json_kind(other)
        )),
    }

    errors
}

/// Check every attribute of a declaration, in file order
pub fn validate_schema(schema: &Map<String, Value>) -> Vec<String> {
    schema
        .iter()
        .flat_map(|(name, value)| validate_attribute(name, value))
        .collect()
}
