//! Time utilities: elapsed seconds, human-readable durations, and the
//! conversions between absolute instants and the timezone-naive wall-clock
//! strings used by editable form fields.

use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Format used by `datetime-local` style inputs.
pub const LOCAL_NAIVE_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Whole seconds from `start` to `reference`.
///
/// A reference earlier than the start is a data-integrity problem (clock
/// skew, hand-edited rows). It is clamped to zero and logged, never raised.
pub fn elapsed_seconds(start: DateTime<Utc>, reference: DateTime<Utc>) -> i64 {
    let millis = (reference - start).num_milliseconds();
    if millis < 0 {
        tracing::warn!(
            start = %start,
            reference = %reference,
            "reference instant precedes start; clamping elapsed time to zero"
        );
        return 0;
    }
    millis.div_euclid(1000)
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("{count} {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

/// "H hours, M minutes", "M minutes" or "S seconds".
pub fn format_duration(total_seconds: i64) -> String {
    let total = total_seconds.max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours == 0 && minutes == 0 {
        return plural(seconds, "second");
    }
    if hours == 0 {
        return plural(minutes, "minute");
    }
    if minutes == 0 {
        return plural(hours, "hour");
    }
    format!("{}, {}", plural(hours, "hour"), plural(minutes, "minute"))
}

/// Raw timer display, e.g. `00:02:05`.
pub fn format_clock(total_seconds: i64) -> String {
    let total = total_seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Render an instant as wall-clock time in `tz`, without any offset marker.
pub fn to_local_naive_string<Tz: TimeZone>(instant: &DateTime<Utc>, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    instant
        .with_timezone(tz)
        .naive_local()
        .format(LOCAL_NAIVE_FORMAT)
        .to_string()
}

/// Inverse of [`to_local_naive_string`]: interpret a wall-clock string in
/// `tz` and return the absolute instant. Seconds are accepted but optional.
pub fn from_local_naive_string<Tz: TimeZone>(value: &str, tz: &Tz) -> AppResult<DateTime<Utc>> {
    let trimmed = value.trim();
    let naive = NaiveDateTime::parse_from_str(trimmed, LOCAL_NAIVE_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M"))
        .map_err(|_| AppError::InvalidTimestamp(value.to_string()))?;

    // DST folds resolve to the earlier instant; gaps have no valid instant.
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| AppError::InvalidTimestamp(value.to_string()))
}

/// Device-local variant of [`to_local_naive_string`].
pub fn to_device_naive_string(instant: &DateTime<Utc>) -> String {
    to_local_naive_string(instant, &Local)
}

/// Device-local variant of [`from_local_naive_string`].
pub fn from_device_naive_string(value: &str) -> AppResult<DateTime<Utc>> {
    from_local_naive_string(value, &Local)
}

/// Interchange format for timestamps crossing the store boundary.
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_instant(value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| AppError::InvalidTimestamp(value.to_string()))
}

/// Truncate to whole seconds, the resolution the store keeps durations in.
pub fn truncate_to_seconds(instant: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(instant.timestamp(), 0).unwrap_or(instant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset};

    fn at(s: &str) -> DateTime<Utc> {
        parse_instant(s).unwrap()
    }

    #[test]
    fn format_duration_boundaries() {
        assert_eq!(format_duration(0), "0 seconds");
        assert_eq!(format_duration(1), "1 second");
        assert_eq!(format_duration(59), "59 seconds");
        assert_eq!(format_duration(60), "1 minute");
        assert_eq!(format_duration(125), "2 minutes");
        assert_eq!(format_duration(3600), "1 hour");
        assert_eq!(format_duration(3661), "1 hour, 1 minute");
        assert_eq!(format_duration(7380), "2 hours, 3 minutes");
    }

    #[test]
    fn format_clock_pads_every_field() {
        assert_eq!(format_clock(125), "00:02:05");
        assert_eq!(format_clock(36_000 + 61), "10:01:01");
        assert_eq!(format_clock(-5), "00:00:00");
    }

    #[test]
    fn elapsed_floors_partial_seconds() {
        let start = at("2025-03-01T10:00:00.000Z");
        assert_eq!(elapsed_seconds(start, start + Duration::milliseconds(1999)), 1);
        assert_eq!(elapsed_seconds(start, start + Duration::seconds(125)), 125);
    }

    #[test]
    fn elapsed_clamps_reversed_bounds() {
        let start = at("2025-03-01T10:00:00Z");
        assert_eq!(elapsed_seconds(start, start - Duration::seconds(30)), 0);
    }

    #[test]
    fn naive_round_trip_for_fixed_offsets() {
        let instant = at("2025-03-01T22:45:00Z");
        for hours in [-11, -5, 0, 2, 5, 13] {
            let tz = FixedOffset::east_opt(hours * 3600).unwrap();
            let naive = to_local_naive_string(&instant, &tz);
            assert_eq!(from_local_naive_string(&naive, &tz).unwrap(), instant);
        }
    }

    #[test]
    fn naive_string_is_wall_clock_time() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let instant = at("2025-03-01T22:45:00Z");
        assert_eq!(to_local_naive_string(&instant, &tz), "2025-03-02T00:45");
    }

    #[test]
    fn naive_parse_rejects_garbage() {
        let tz = FixedOffset::east_opt(0).unwrap();
        assert!(matches!(
            from_local_naive_string("yesterday", &tz),
            Err(AppError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn instant_strings_carry_utc_marker() {
        let instant = at("2025-03-01T10:00:00+02:00");
        assert_eq!(format_instant(&instant), "2025-03-01T08:00:00.000Z");
        assert_eq!(parse_instant(&format_instant(&instant)).unwrap(), instant);
    }
}
