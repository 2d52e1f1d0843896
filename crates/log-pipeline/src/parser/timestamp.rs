//! Best-effort timestamp parsing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Zoned formats tried after RFC 3339 / RFC 2822.
const ZONED_FORMATS: &[&str] = &[
    "%d/%b/%Y:%H:%M:%S %z", // nginx/apache access: 10/Oct/2000:13:55:36 -0700
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%d %H:%M:%S%.f %z",
];

/// Naive formats, read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S", // nginx error: 2024/01/01 00:00:01
    "%d/%b/%Y %H:%M:%S",
    "%a %b %d %H:%M:%S %Y",    // apache error: Wed Oct 11 14:32:52 2000
    "%a %b %d %H:%M:%S%.f %Y", // apache 2.4 error
];

/// Parses a captured timestamp.
///
/// With an explicit chrono format only that format is tried. Otherwise a
/// fixed list of common formats is attempted. `None` means the raw text is
/// kept without an instant.
pub fn parse_timestamp(raw: &str, explicit_format: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match explicit_format {
        Some(format) => parse_with_format(raw, format),
        None => parse_free_form(raw),
    }
}

fn parse_with_format(raw: &str, format: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(raw, format) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, format)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_free_form(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ZONED_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    // unix epoch seconds
    if raw.len() == 10 && raw.bytes().all(|b| b.is_ascii_digit()) {
        return raw
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn explicit_format_is_used() {
        let ts = parse_timestamp("2024/01/01 00:00:01", Some("%Y/%m/%d %H:%M:%S")).unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap());
    }

    #[test]
    fn explicit_format_with_offset_converts_to_utc() {
        let ts = parse_timestamp(
            "10/Oct/2000:13:55:36 -0700",
            Some("%d/%b/%Y:%H:%M:%S %z"),
        )
        .unwrap();
        assert_eq!(ts.hour(), 20);
    }

    #[test]
    fn explicit_format_mismatch_is_none() {
        assert!(parse_timestamp("2024-01-01T00:00:00Z", Some("%d/%b/%Y")).is_none());
    }

    #[test]
    fn explicit_date_only_format() {
        let ts = parse_timestamp("2024-03-05", Some("%Y-%m-%d")).unwrap();
        assert_eq!(ts.day(), 5);
        assert_eq!(ts.hour(), 0);
    }

    #[test]
    fn free_form_rfc3339() {
        let ts = parse_timestamp("2024-01-15T12:00:00+02:00", None).unwrap();
        assert_eq!(ts.hour(), 10);
    }

    #[test]
    fn free_form_fallbacks() {
        assert!(parse_timestamp("2024/01/01 00:00:01", None).is_some());
        assert!(parse_timestamp("2024-01-01 00:00:01", None).is_some());
        assert!(parse_timestamp("2024-01-01 00:00:01.250", None).is_some());
        assert!(parse_timestamp("10/Oct/2000:13:55:36 -0700", None).is_some());
        assert!(parse_timestamp("Wed Oct 11 14:32:52 2000", None).is_some());
        assert!(parse_timestamp("1700000000", None).is_some());
    }

    #[test]
    fn garbage_is_none() {
        assert!(parse_timestamp("yesterday-ish", None).is_none());
        assert!(parse_timestamp("", None).is_none());
        assert!(parse_timestamp("2024-99-99 99:99:99", None).is_none());
    }
}
