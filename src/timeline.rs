// Thermovolt - Sensor status pipeline
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Timestamp parsing and time-axis alignment.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// Parse a timestamp cell.
///
/// Day-first is tried before month-first, so `03/04/2024` is 3 April.
/// A bare time of day is placed on 1970-01-01; only its clock time survives
/// rebasing anyway.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }

    for format in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(text, format) {
            return NaiveDate::from_ymd_opt(1970, 1, 1).map(|d| d.and_time(time));
        }
    }

    None
}

/// Keep the clock time of `source` and the calendar date of `now`.
///
/// Sub-second precision is dropped so the display axis ticks on whole seconds.
pub fn rebase_onto_day(source: NaiveDateTime, now: NaiveDateTime) -> NaiveDateTime {
    let time = source.time();
    let time = NaiveTime::from_hms_opt(time.hour(), time.minute(), time.second())
        .unwrap_or(NaiveTime::MIN);
    now.date().and_time(time)
}

/// Drop sub-second precision.
pub fn truncate_subsec(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// Timestamps for a forward projection: one per day, starting an hour from now.
pub fn projection_timestamps(now: NaiveDateTime, days: usize) -> Vec<NaiveDateTime> {
    let start = truncate_subsec(now) + Duration::hours(1);
    (0..days)
        .map(|i| start + Duration::days(i as i64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_parse_iso_formats() {
        assert_eq!(
            parse_timestamp("2024-06-01 08:15:30"),
            Some(dt(2024, 6, 1, 8, 15, 30))
        );
        assert_eq!(
            parse_timestamp("2024-06-01T08:15:30"),
            Some(dt(2024, 6, 1, 8, 15, 30))
        );
        assert_eq!(
            parse_timestamp("2024-06-01T08:15:30+07:00"),
            Some(dt(2024, 6, 1, 8, 15, 30))
        );
        let with_fraction = parse_timestamp("2024-06-01 08:15:30.250").unwrap();
        assert_eq!(with_fraction.nanosecond(), 250_000_000);
    }

    #[test]
    fn test_parse_day_first() {
        assert_eq!(
            parse_timestamp("03/04/2024 10:00:00"),
            Some(dt(2024, 4, 3, 10, 0, 0))
        );
        // Only valid month-first
        assert_eq!(
            parse_timestamp("12/25/2024 10:00:00"),
            Some(dt(2024, 12, 25, 10, 0, 0))
        );
    }

    #[test]
    fn test_parse_time_only() {
        let ts = parse_timestamp("14:05:09").unwrap();
        assert_eq!(ts.time(), NaiveTime::from_hms_opt(14, 5, 9).unwrap());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2024-13-45 99:00:00"), None);
    }

    #[test]
    fn test_rebase_keeps_clock_time() {
        let source = parse_timestamp("2023-01-15 06:30:45.900").unwrap();
        let now = dt(2024, 7, 20, 18, 0, 0);

        let rebased = rebase_onto_day(source, now);
        assert_eq!(rebased, dt(2024, 7, 20, 6, 30, 45));
    }

    #[test]
    fn test_projection_timestamps() {
        let now = parse_timestamp("2024-07-20 18:00:00.750").unwrap();
        let stamps = projection_timestamps(now, 30);

        assert_eq!(stamps.len(), 30);
        assert_eq!(stamps[0], dt(2024, 7, 20, 19, 0, 0));
        assert_eq!(stamps[1], dt(2024, 7, 21, 19, 0, 0));
        assert_eq!(stamps[29], dt(2024, 8, 18, 19, 0, 0));
    }
}
