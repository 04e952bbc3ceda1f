//! Canonical and display renderings of a type value.
//!
//! `normalize` is the only form the diff engine compares. `display_form` is
//! for humans and may collapse distinct values to the same text.

use serde_json::Value;
use std::fmt::Write;

/// Canonical string for a type value. Strings are their own canonical form;
/// objects are rendered with keys sorted at every depth.
pub fn normalize(value: &Value) -> String {
    match value {
        Value::String(raw) => raw.clone(),
        other => {
            let mut out = String::new();
            write_json(&mut out, other, true);
            out
        }
    }
}

/// Human-readable rendering. An object whose only key is `type` shows the
/// inner type; any other object is shown in full.
pub fn display_form(value: &Value) -> String {
    match value {
        Value::String(raw) => raw.clone(),
        Value::Object(map) if map.len() == 1 => match map.get("type") {
            Some(Value::String(inner)) => inner.clone(),
            Some(inner) => display_form(inner),
            None => structured(value),
        },
        other => structured(other),
    }
}

fn structured(value: &Value) -> String {
    let mut out = String::new();
    write_json(&mut out, value, false);
    out
}

fn write_json(out: &mut String, value: &Value, sort_keys: bool) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            if sort_keys {
                entries.sort_by(|(a, _), (b, _)| a.cmp(b));
            }
            out.push('{');
            for (idx, (key, inner)) in entries.into_iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_string(out, key);
                out.push_str(": ");
                write_json(out, inner, sort_keys);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (idx, inner) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_json(out, inner, sort_keys);
            }
            out.push(']');
        }
        Value::String(raw) => write_string(out, raw),
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}

fn write_string(out: &mut String, raw: &str) {
    // serde_json's own escaping for a bare string never fails
    match serde_json::to_string(raw) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => {
            let _ = write!(out, "{raw:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn key_order_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"type":"string","filterable":true}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"filterable":true,"type":"string"}"#).unwrap();
        assert_eq!(normalize(&a), normalize(&b));
        assert_eq!(normalize(&a), r#"{"filterable": true, "type": "string"}"#);
    }

    #[test]
    fn nested_objects_are_sorted() {
        let a: Value =
            serde_json::from_str(r#"{"type":"string","full_text_search":{"stemming":true,"language":"en"}}"#)
                .unwrap();
        let b: Value =
            serde_json::from_str(r#"{"full_text_search":{"language":"en","stemming":true},"type":"string"}"#)
                .unwrap();
        assert_eq!(normalize(&a), normalize(&b));
    }

    #[test]
    fn strings_are_their_own_canonical_form() {
        assert_eq!(normalize(&json!("[1536]f32")), "[1536]f32");
    }

    #[test]
    fn different_options_normalize_differently() {
        assert_ne!(
            normalize(&json!({"type": "string", "filterable": true})),
            normalize(&json!({"type": "string", "filterable": false}))
        );
    }

    #[test]
    fn display_collapses_trivial_annotation() {
        assert_eq!(display_form(&json!({"type": "uint64"})), "uint64");
        assert_eq!(display_form(&json!("uuid")), "uuid");
    }

    #[test]
    fn display_keeps_structured_form() {
        let raw: Value =
            serde_json::from_str(r#"{"type":"string","full_text_search":true}"#).unwrap();
        assert_eq!(display_form(&raw), r#"{"type": "string", "full_text_search": true}"#);
    }
}
