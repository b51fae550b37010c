//! Timestamp utilities
//!
//! Conversions between the numeric (Unix seconds, UT) representation used for
//! time series and the calendar representation used by the remote model.

use crate::{Error, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Calendar string layout shared by reports and the header resolver
pub const CALENDAR_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Form-field layout for the remote service's datetime input
pub const FORM_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Convert Unix seconds (fractional allowed) to a UTC timestamp
pub fn unix_to_datetime(seconds: f64) -> Result<DateTime<Utc>> {
    if !seconds.is_finite() {
        return Err(Error::InvalidInput(format!(
            "Unix time must be finite, got {}",
            seconds
        )));
    }

    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;

    DateTime::from_timestamp(whole as i64, nanos)
        .ok_or_else(|| Error::InvalidInput(format!("Unix time out of range: {}", seconds)))
}

/// Convert a UTC timestamp to Unix seconds
pub fn datetime_to_unix(datetime: &DateTime<Utc>) -> f64 {
    datetime.timestamp() as f64 + datetime.timestamp_subsec_nanos() as f64 * 1e-9
}

/// Format a timestamp as `YYYY-mm-dd HH:MM:SS`
pub fn format_calendar(datetime: &DateTime<Utc>) -> String {
    datetime.format(CALENDAR_FORMAT).to_string()
}

/// Parse a `YYYY-mm-dd HH:MM:SS` string as UTC
pub fn parse_calendar(text: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(text.trim(), CALENDAR_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|e| Error::InvalidInput(format!("Bad calendar time '{}': {}", text, e)))
}

/// Resolve year + 1-based day-of-year + fractional UT hour to a timestamp.
///
/// The date is January 1 plus `day_of_year - 1` days. Hours and minutes are
/// truncated from the fractional hour; seconds are rounded, and any carry
/// (60 s, 60 min, 24 h) rolls forward through duration addition.
pub fn from_day_of_year(year: i32, day_of_year: u32, ut_hours: f64) -> Result<DateTime<Utc>> {
    if !ut_hours.is_finite() || ut_hours < 0.0 {
        return Err(Error::InvalidInput(format!("Bad UT hour: {}", ut_hours)));
    }

    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| Error::InvalidInput(format!("Bad year: {}", year)))?;

    let hours = ut_hours.trunc();
    let minutes_float = (ut_hours - hours) * 60.0;
    let minutes = minutes_float.trunc();
    let seconds = ((minutes_float - minutes) * 60.0).round();

    let offset = Duration::try_days(day_of_year as i64 - 1)
        .zip(Duration::try_hours(hours as i64))
        .and_then(|(days, hours)| days.checked_add(&hours))
        .zip(Duration::try_minutes(minutes as i64))
        .and_then(|(sum, minutes)| sum.checked_add(&minutes))
        .zip(Duration::try_seconds(seconds as i64))
        .and_then(|(sum, seconds)| sum.checked_add(&seconds));

    jan1.and_hms_opt(0, 0, 0)
        .zip(offset)
        .and_then(|(midnight, offset)| midnight.checked_add_signed(offset))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "Day-of-year {} / {}UT overflows year {}",
                day_of_year, ut_hours, year
            ))
        })
}
