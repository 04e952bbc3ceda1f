use chrono::{DateTime, Local, TimeZone};
use console::style;
use serde_json::{Map, Value};
use tpuff_client::{RecallData, Row};

/// Longest contents preview shown in a results table
pub const MAX_CONTENT_CHARS: usize = 80;

const BYTE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// `1536` -> `1.50 KB`, in steps of 1024
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", BYTE_UNITS[unit])
}

/// `1234567` -> `1,234,567`
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Time of day for today's timestamps, the date otherwise
pub fn format_updated_at(raw: &str) -> String {
    format_updated_at_relative(raw, &Local::now())
}

pub fn format_updated_at_relative<Tz>(raw: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let Ok(parsed) = DateTime::parse_from_rfc3339(raw) else {
        return raw.to_string();
    };
    let local = parsed.with_timezone(&now.timezone());
    if local.date_naive() == now.date_naive() {
        local.format("%-I:%M %p").to_string().to_lowercase()
    } else {
        local.format("%b %-d, %Y").to_string()
    }
}

/// Sort key for `updated_at`; unparseable or missing values sort last
pub fn updated_at_key(raw: Option<&str>) -> Option<DateTime<chrono::FixedOffset>> {
    raw.and_then(|value| DateTime::parse_from_rfc3339(value).ok())
}

pub fn format_recall(recall: Option<&RecallData>) -> String {
    let Some(recall) = recall else {
        return style("N/A").dim().to_string();
    };
    let text = format!("{:.1}%", recall.avg_recall * 100.0);
    if recall.avg_recall > 0.95 {
        style(text).green().to_string()
    } else if recall.avg_recall > 0.8 {
        style(text).yellow().to_string()
    } else {
        style(text).red().to_string()
    }
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Compact JSON of a row's user attributes, without ids, vectors, scores
/// and `_`-prefixed system keys
pub fn row_contents(row: &Row, extra_excluded: &[&str]) -> String {
    const SYSTEM_KEYS: [&str; 5] = ["id", "vector", "$dist", "dist", "attributes"];

    let contents: Map<String, Value> = row
        .iter()
        .filter(|(key, _)| {
            !key.starts_with('_')
                && !SYSTEM_KEYS.contains(&key.as_str())
                && !extra_excluded.contains(&key.as_str())
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(contents).to_string()
}

/// Row id as plain text (`"a"` -> `a`, `7` -> `7`)
pub fn row_id(row: &Row) -> String {
    match row.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => "N/A".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn bytes_use_binary_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512.00 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.00 GB");
        assert_eq!(format_bytes(u64::MAX), "16777216.00 TB");
    }

    #[test]
    fn counts_get_thousands_separators() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1_234_567), "1,234,567");
    }

    #[test]
    fn updated_at_shows_time_today_and_date_otherwise() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 18, 0, 0).unwrap();
        assert_eq!(
            format_updated_at_relative("2024-03-05T14:07:00Z", &now),
            "2:07 pm"
        );
        assert_eq!(
            format_updated_at_relative("2023-12-25T09:00:00+00:00", &now),
            "Dec 25, 2023"
        );
        assert_eq!(format_updated_at_relative("yesterday", &now), "yesterday");
    }

    #[test]
    fn recall_is_a_percentage() {
        let recall = RecallData {
            avg_recall: 0.9234,
            ..RecallData::default()
        };
        assert_eq!(console::strip_ansi_codes(&format_recall(Some(&recall))), "92.3%");
        assert_eq!(console::strip_ansi_codes(&format_recall(None)), "N/A");
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate("short", 80), "short");
        assert_eq!(truncate("ééééé", 3), "ééé...");
    }

    #[test]
    fn contents_skip_system_keys() {
        let row = json!({
            "id": 1,
            "vector": [0.1, 0.2],
            "$dist": 0.5,
            "_internal": true,
            "title": "hello",
            "$score": 3.2
        });
        let row = row.as_object().unwrap();
        assert_eq!(row_contents(row, &[]), r#"{"$score":3.2,"title":"hello"}"#);
        assert_eq!(row_contents(row, &["$score"]), r#"{"title":"hello"}"#);
        assert_eq!(row_id(row), "1");
    }
}
