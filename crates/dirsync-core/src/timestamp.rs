//! Generalized time (RFC 4517) conversion.
//!
//! Every timestamp comparison in the engine happens on `DateTime<Utc>`.
//! Remote `modifyTimestamp` values are normalized here; a value without any
//! zone designator is taken to be UTC.

use chrono::{DateTime, NaiveDateTime, Utc};

const NAIVE_FORMAT: &str = "%Y%m%d%H%M%S%.f";
const OFFSET_FORMAT: &str = "%Y%m%d%H%M%S%.f%z";

/// Parse a generalized time value such as `20240131120000Z`,
/// `20240131120000.5Z` or `20240131140000+0200` into a UTC instant.
pub fn parse_generalized_time(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim().replace(',', ".");

    if let Some(body) = value
        .strip_suffix('Z')
        .or_else(|| value.strip_suffix('z'))
    {
        return NaiveDateTime::parse_from_str(body, NAIVE_FORMAT)
            .ok()
            .map(|naive| naive.and_utc());
    }

    let has_offset = value
        .char_indices()
        .skip(14)
        .any(|(_, c)| c == '+' || c == '-');
    if has_offset {
        return DateTime::parse_from_str(&value, OFFSET_FORMAT)
            .ok()
            .map(|dt| dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(&value, NAIVE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Format a UTC instant as generalized time with second precision.
pub fn format_generalized_time(instant: &DateTime<Utc>) -> String {
    instant.format("%Y%m%d%H%M%SZ").to_string()
}
