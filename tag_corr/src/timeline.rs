//! Instant normalization, window resolution, and calendar grouping.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{CorrError, PositionFix, TimeWindow};

/// Parse either recognized timestamp format into one comparable instant.
///
/// The two formats are told apart by the structural shape of the first
/// `-`-separated date token: a 4-digit token selects the ISO-like path
/// (`YYYY-MM-DD`, optional `T` or space separator, optional time, optional
/// fractional seconds, optional trailing `Z`), a 1- or 2-digit token selects
/// the day-first path (`DD-MM-YYYY HH:mm:ss`). Anything else is rejected.
/// No timezone is encoded; the result is a naive local instant used only for
/// relative ordering.
pub fn parse_instant(text: &str) -> Result<NaiveDateTime, CorrError> {
    let trimmed = text.trim();
    let lead = trimmed.split('-').next().unwrap_or("");
    if !lead.is_empty() && lead.chars().all(|c| c.is_ascii_digit()) {
        match lead.len() {
            4 => return parse_iso_like(trimmed),
            1 | 2 => return parse_day_first(trimmed),
            _ => {}
        }
    }
    Err(CorrError::MalformedTimestamp(trimmed.to_string()))
}

fn parse_day_first(text: &str) -> Result<NaiveDateTime, CorrError> {
    NaiveDateTime::parse_from_str(text, "%d-%m-%Y %H:%M:%S")
        .map_err(|_| CorrError::MalformedTimestamp(text.to_string()))
}

fn parse_iso_like(text: &str) -> Result<NaiveDateTime, CorrError> {
    let stripped = text.strip_suffix('Z').unwrap_or(text);
    let normalized = stripped.replacen('T', " ", 1);
    let parsed = if normalized.contains(' ') {
        NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M"))
    } else {
        // Date-only samples land on midnight.
        NaiveDate::parse_from_str(&normalized, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN))
    };
    parsed.map_err(|_| CorrError::MalformedTimestamp(text.to_string()))
}

/// Resolve the inclusive symmetric window `reference ± radius_days`.
///
/// Calendar arithmetic is delegated to chrono, so month, year, and leap-day
/// boundaries carry no special cases here. A negative radius is treated as
/// zero; arithmetic past the representable range saturates.
pub fn resolve_window(reference: NaiveDateTime, radius_days: i64) -> TimeWindow {
    let radius = Duration::try_days(radius_days.max(0)).unwrap_or(Duration::MAX);
    let start = reference
        .checked_sub_signed(radius)
        .unwrap_or(NaiveDateTime::MIN);
    let end = reference
        .checked_add_signed(radius)
        .unwrap_or(NaiveDateTime::MAX);
    TimeWindow { start, end }
}

/// Calendar bucket size for the position selector.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum Granularity {
    Day,
    Month,
}

/// Derive the selector bucket key for a fix from its nominal fix time.
pub fn group_key(fix: &PositionFix, granularity: Granularity) -> String {
    match granularity {
        Granularity::Day => fix.fix_time.format("%d-%m-%Y").to_string(),
        Granularity::Month => fix.fix_time.format("%m-%Y").to_string(),
    }
}

/// Bucket keys in first-seen order, deduplicated.
pub fn unique_keys(positions: &[PositionFix], granularity: Granularity) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    for fix in positions {
        let key = group_key(fix, granularity);
        if seen.insert(key.clone()) {
            keys.push(key);
        }
    }
    keys
}

/// Keep the fixes whose bucket key equals `key`, preserving input order.
pub fn filter_by_key(
    positions: &[PositionFix],
    granularity: Granularity,
    key: &str,
) -> Vec<PositionFix> {
    positions
        .iter()
        .filter(|fix| group_key(fix, granularity) == key)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix_at(text: &str) -> PositionFix {
        PositionFix {
            lat: 0.0,
            lon: 0.0,
            fix_time: parse_instant(text).unwrap(),
            obs_time: parse_instant(text).unwrap(),
        }
    }

    #[test]
    fn parses_day_first_format() {
        let instant = parse_instant("01-01-2023 00:05:00").unwrap();
        assert_eq!(instant.format("%Y-%m-%d %H:%M:%S").to_string(), "2023-01-01 00:05:00");
    }

    #[test]
    fn parses_iso_like_variants() {
        let base = parse_instant("2023-01-01T00:05:00").unwrap();
        assert_eq!(parse_instant("2023-01-01 00:05:00").unwrap(), base);
        assert_eq!(parse_instant("2023-01-01T00:05:00Z").unwrap(), base);
        assert_eq!(parse_instant("2023-01-01T00:05:00.000").unwrap(), base);
        let midnight = parse_instant("2023-01-01").unwrap();
        assert_eq!(midnight.format("%H:%M:%S").to_string(), "00:00:00");
    }

    #[test]
    fn both_formats_normalize_to_the_same_instant() {
        let day_first = parse_instant("29-12-2022 12:30:00").unwrap();
        let iso = parse_instant("2022-12-29T12:30:00").unwrap();
        assert_eq!(day_first, iso);
    }

    #[test]
    fn parse_preserves_lexical_chronology() {
        let earlier = parse_instant("31-12-2022 23:59:59").unwrap();
        let later = parse_instant("01-01-2023 00:00:00").unwrap();
        assert!(earlier < later);

        let iso_earlier = parse_instant("2022-12-31T23:59:59").unwrap();
        let iso_later = parse_instant("2023-01-01T00:00:00").unwrap();
        assert!(iso_earlier < iso_later);
    }

    #[test]
    fn rejects_malformed_timestamps() {
        assert!(parse_instant("2023/01/01 00:00:00").is_err());
        assert!(parse_instant("001-01-2023 00:00:00").is_err());
        assert!(parse_instant("32-01-2023 00:00:00").is_err());
        assert!(parse_instant("01-13-2023 00:00:00").is_err());
        assert!(parse_instant("not a timestamp").is_err());
        assert!(parse_instant("").is_err());
        // Day-first requires both date and time parts.
        assert!(parse_instant("01-01-2023").is_err());
    }

    #[test]
    fn window_contains_reference_for_any_radius() {
        let reference = parse_instant("15-06-2023 12:00:00").unwrap();
        for radius in [0, 1, 3, 30, 365] {
            let window = resolve_window(reference, radius);
            assert!(window.start <= reference && reference <= window.end);
        }
    }

    #[test]
    fn zero_radius_collapses_to_the_reference() {
        let reference = parse_instant("15-06-2023 12:00:00").unwrap();
        let window = resolve_window(reference, 0);
        assert_eq!(window.start, reference);
        assert_eq!(window.end, reference);
    }

    #[test]
    fn window_crosses_month_and_year_boundaries() {
        let reference = parse_instant("01-01-2023 00:05:00").unwrap();
        let window = resolve_window(reference, 3);
        assert_eq!(window.start, parse_instant("29-12-2022 00:05:00").unwrap());
        assert_eq!(window.end, parse_instant("04-01-2023 00:05:00").unwrap());
    }

    #[test]
    fn window_crosses_leap_day() {
        let reference = parse_instant("01-03-2024 00:00:00").unwrap();
        let window = resolve_window(reference, 3);
        assert_eq!(window.start, parse_instant("27-02-2024 00:00:00").unwrap());
    }

    #[test]
    fn day_and_month_keys() {
        let fix = fix_at("05-07-2023 09:30:00");
        assert_eq!(group_key(&fix, Granularity::Day), "05-07-2023");
        assert_eq!(group_key(&fix, Granularity::Month), "07-2023");
    }

    #[test]
    fn unique_keys_keep_first_seen_order() {
        let positions = vec![
            fix_at("02-01-2023 08:00:00"),
            fix_at("02-01-2023 12:00:00"),
            fix_at("01-01-2023 08:00:00"),
            fix_at("02-01-2023 18:00:00"),
        ];
        let keys = unique_keys(&positions, Granularity::Day);
        assert_eq!(keys, vec!["02-01-2023".to_string(), "01-01-2023".to_string()]);
    }

    #[test]
    fn filter_by_key_partitions_in_order() {
        let positions = vec![
            fix_at("02-01-2023 08:00:00"),
            fix_at("01-01-2023 08:00:00"),
            fix_at("02-01-2023 18:00:00"),
        ];
        let day = filter_by_key(&positions, Granularity::Day, "02-01-2023");
        assert_eq!(day.len(), 2);
        assert!(day[0].fix_time < day[1].fix_time);
    }
}
