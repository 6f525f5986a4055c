//! XMLTV datetime handling
//!
//! XMLTV timestamps look like `YYYYMMDDHHMMSS ±HHMM`. Trailing precision may
//! be dropped (`YYYYMMDDHHMM`) and the offset may be missing, in which case the
//! value is taken as UTC.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Format used for timestamps stored in SQLite
const STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse an XMLTV datetime into UTC
pub fn parse_xmltv_datetime(datetime_str: &str) -> Option<DateTime<Utc>> {
    let mut parts = datetime_str.split_whitespace();
    let clean_datetime = parts.next()?;
    let offset = match parts.next() {
        Some(tz) => parse_offset(tz)?,
        None => FixedOffset::east_opt(0)?,
    };

    if clean_datetime.len() < 12 || !clean_datetime.is_ascii() {
        return None;
    }

    let year: i32 = clean_datetime[0..4].parse().ok()?;
    let month: u32 = clean_datetime[4..6].parse().ok()?;
    let day: u32 = clean_datetime[6..8].parse().ok()?;
    let hour: u32 = clean_datetime[8..10].parse().ok()?;
    let minute: u32 = clean_datetime[10..12].parse().ok()?;
    let second: u32 = match clean_datetime.get(12..14) {
        Some(s) => s.parse().ok()?,
        None => 0,
    };

    let naive_dt = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    let local_dt = offset.from_local_datetime(&naive_dt).single()?;
    Some(local_dt.with_timezone(&Utc))
}

/// Format a timestamp for a database column
pub fn format_for_storage(dt: &DateTime<Utc>) -> String {
    dt.format(STORAGE_FORMAT).to_string()
}

/// Parse a database timestamp written by SQLite or by [`format_for_storage`]
pub fn parse_storage_datetime(datetime_str: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(datetime_str) {
        return Ok(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(datetime_str, STORAGE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| sqlx::Error::Decode(format!("Unable to parse datetime {datetime_str:?}: {e}").into()))
}

fn parse_offset(tz: &str) -> Option<FixedOffset> {
    if tz.eq_ignore_ascii_case("utc") || tz.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }
    if tz.len() != 5 || !tz.is_ascii() {
        return None;
    }
    let sign = match &tz[0..1] {
        "+" => 1,
        "-" => -1,
        _ => return None,
    };
    let hours: i32 = tz[1..3].parse().ok()?;
    let minutes: i32 = tz[3..5].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
