//! Timestamp parsing for selection parameters and stored documents.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value as JsonValue;

use crate::error::{DomainError, DomainResult};

/// Parse a caller-supplied timestamp.
///
/// Accepts RFC 3339 (`2024-03-01T10:00:00Z`), a zone-less date-time
/// (`2024-03-01T10:00:00`, `2024-03-01 10:00:00.250`) read as UTC, and a bare
/// date (`2024-03-01`) meaning UTC midnight.
pub fn parse_timestamp(input: &str) -> DomainResult<DateTime<Utc>> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DomainError::validation("empty date"));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(DomainError::validation(format!("unparseable date: {input:?}")))
}

/// Read a timestamp out of a stored JSON value.
///
/// Documents written by the ingestion process hold either a string or the
/// extended-JSON form `{"$date": "..."}` / `{"$date": <epoch millis>}`.
pub fn timestamp_from_json(value: &JsonValue) -> Option<DateTime<Utc>> {
    match value {
        JsonValue::String(s) => parse_timestamp(s).ok(),
        JsonValue::Object(map) => match map.get("$date")? {
            JsonValue::String(s) => parse_timestamp(s).ok(),
            JsonValue::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
            _ => None,
        },
        _ => None,
    }
}
