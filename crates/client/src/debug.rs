use serde::Serialize;
use serde_json::Value;

/// Arrays longer than this made only of numbers are shown as a summary
const VECTOR_ELISION_LEN: usize = 10;

/// Replace long numeric arrays with `"[vector with N dimensions]"` so request
/// and response dumps stay readable.
pub fn filter_vectors(value: &Value) -> Value {
    match value {
        Value::Array(items) if items.len() > VECTOR_ELISION_LEN && items.iter().all(Value::is_number) => {
            Value::String(format!("[vector with {} dimensions]", items.len()))
        }
        Value::Array(items) => Value::Array(items.iter().map(filter_vectors).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), filter_vectors(value)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Pretty-print `payload` at debug level with vectors elided
pub fn debug_json<T: Serialize + ?Sized>(label: &str, payload: &T) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let rendered = serde_json::to_value(payload)
        .map(|value| filter_vectors(&value))
        .and_then(|value| serde_json::to_string_pretty(&value));
    match rendered {
        Ok(text) => log::debug!("{label}:\n{text}"),
        Err(err) => log::debug!("{label}: <unserializable: {err}>"),
    }
}
