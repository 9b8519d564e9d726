//! Timestamp utilities
//!
//! Records carry `created_at` as milliseconds since the Unix epoch (UTC).
//! Date filters name a calendar day in the server's local time zone, which is
//! converted here into a half-open UTC range.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a timestamp to the stored millisecond representation
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

/// Convert stored milliseconds back to a timestamp
pub fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| Error::Internal(format!("Timestamp out of range: {}", millis)))
}

/// Render a timestamp as ISO-8601 with millisecond precision and a `Z` suffix
pub fn to_iso_millis(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a `YYYY-MM-DD` calendar day
pub fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| Error::InvalidInput(format!("Invalid date '{}': {}", value, e)))
}

/// Half-open UTC range `[day 00:00, day+1 00:00)` for a calendar day in `tz`
///
/// Returns an error only for days at the edge of chrono's representable range.
pub fn day_bounds<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let next = day
        .succ_opt()
        .ok_or_else(|| Error::InvalidInput(format!("Date out of range: {}", day)))?;

    let start = local_midnight(day, tz)?;
    let end = local_midnight(next, tz)?;
    Ok((start, end))
}

/// UTC instant of local midnight starting `day`
///
/// Ambiguous midnights (clocks rolled back) resolve to the earlier instant.
/// Skipped midnights (clocks rolled forward) resolve to the first instant
/// that exists on that day.
fn local_midnight<Tz: TimeZone>(day: NaiveDate, tz: &Tz) -> Result<DateTime<Utc>> {
    resolve_midnight(day, |local| {
        tz.from_local_datetime(local).map(|dt| dt.with_timezone(&Utc))
    })
}

/// Midnight resolution over any local-to-UTC mapping
fn resolve_midnight<F>(day: NaiveDate, to_utc: F) -> Result<DateTime<Utc>>
where
    F: Fn(&NaiveDateTime) -> LocalResult<DateTime<Utc>>,
{
    let midnight: NaiveDateTime = day
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| Error::Internal(format!("No midnight for {}", day)))?;

    match to_utc(&midnight) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => {
            // Step forward until the wall clock exists; DST gaps are at most a few hours.
            for minutes in (15..=240).step_by(15) {
                let candidate = midnight + Duration::minutes(minutes);
                if let Some(dt) = to_utc(&candidate).earliest() {
                    return Ok(dt);
                }
            }
            Err(Error::Internal(format!("Local midnight does not exist for {}", day)))
        }
    }
}
