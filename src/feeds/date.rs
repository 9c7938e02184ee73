//! Publish-time normalization for feed entries.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Naive layouts accepted after RFC 3339 and RFC 2822, read as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Normalized publish time of an entry.
///
/// `published` wins, `updated` is the fallback. A value that is missing,
/// unparseable or of the wrong JSON type counts as absent.
pub fn normalize_published(entry: &Value) -> Option<DateTime<Utc>> {
    entry
        .get("published")
        .and_then(parse_value)
        .or_else(|| entry.get("updated").and_then(parse_value))
}

fn parse_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}

/// Parse one feed timestamp into UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_published_preferred() {
        let entry = json!({
            "published": "2025-01-02T03:04:05Z",
            "updated": "2025-02-01T00:00:00Z"
        });
        assert_eq!(normalize_published(&entry), Some(utc(2025, 1, 2, 3, 4, 5)));
    }

    #[test]
    fn test_updated_fallback() {
        let entry = json!({"updated": "2024-12-31T23:59:59Z"});
        assert_eq!(
            normalize_published(&entry),
            Some(utc(2024, 12, 31, 23, 59, 59))
        );
    }

    #[test]
    fn test_neither_present() {
        assert_eq!(normalize_published(&json!({"title": "x"})), None);
        assert_eq!(normalize_published(&json!(null)), None);
    }

    #[test]
    fn test_malformed_values() {
        assert_eq!(normalize_published(&json!({"published": "yesterday"})), None);
        assert_eq!(normalize_published(&json!({"published": ["2025"]})), None);

        // A broken published value does not hide a usable updated value
        let entry = json!({"published": "not a date", "updated": "2025-03-01T00:00:00Z"});
        assert_eq!(normalize_published(&entry), Some(utc(2025, 3, 1, 0, 0, 0)));
    }

    #[test]
    fn test_offsets_normalized_to_utc() {
        let entry = json!({"published": "2025-06-01T09:00:00+09:00"});
        assert_eq!(normalize_published(&entry), Some(utc(2025, 6, 1, 0, 0, 0)));
    }

    #[test]
    fn test_rfc2822() {
        assert_eq!(
            parse_timestamp("Tue, 10 Jun 2025 04:00:00 GMT"),
            Some(utc(2025, 6, 10, 4, 0, 0))
        );
        assert_eq!(
            parse_timestamp("Tue, 10 Jun 2025 06:00:00 +0200"),
            Some(utc(2025, 6, 10, 4, 0, 0))
        );
    }

    #[test]
    fn test_naive_formats() {
        assert_eq!(
            parse_timestamp("2025-01-15 10:30:00"),
            Some(utc(2025, 1, 15, 10, 30, 0))
        );
        assert_eq!(
            parse_timestamp("2025-01-15T10:30:00"),
            Some(utc(2025, 1, 15, 10, 30, 0))
        );
        assert_eq!(parse_timestamp("2025-01-15"), Some(utc(2025, 1, 15, 0, 0, 0)));
        assert_eq!(parse_timestamp("  "), None);
    }

    #[test]
    fn test_epoch_seconds() {
        let entry = json!({"published": 1_700_000_000});
        assert_eq!(
            normalize_published(&entry),
            Some(utc(2023, 11, 14, 22, 13, 20))
        );
    }
}
