//! Date-time detection and conversion for `long` fields.
//!
//! Timestamps travel through the documents as timezone-qualified ISO 8601
//! text while the schema declares a plain `long`. Detection is a substring
//! heuristic: any value containing `T` is treated as a date-time, so a
//! non-date long that happens to contain the letter would misparse. The rule
//! is reproduced as-is for compatibility with existing feeds and kept
//! isolated here so an explicit schema annotation can replace it later.

use chrono::{DateTime, Utc};

/// Whether scalar text destined for a `long` field looks like an ISO 8601
/// date-time.
pub fn looks_like_datetime(text: &str) -> bool {
    text.contains('T')
}

/// Parses `2018-05-09T14:00:28-07:00`-style text into milliseconds since the
/// Unix epoch, normalized to UTC.
pub fn parse_datetime_millis(text: &str) -> Result<i64, chrono::ParseError> {
    let parsed = DateTime::parse_from_rfc3339(text)?;
    Ok(parsed.with_timezone(&Utc).timestamp_millis())
}
