//! ISO-8601 conversion helpers
//!
//! Record TTLs travel on the wire as ISO-8601 period strings (`PT2H5M`) and
//! expiry stamps as ISO-8601 date-times. These helpers convert between the
//! wire form and whole seconds / `DateTime<Utc>`.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::LookupError;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 3_600;
const SECS_PER_DAY: u64 = 86_400;
const SECS_PER_WEEK: u64 = 604_800;

/// Format a whole-second duration as an ISO-8601 period string.
///
/// Zero formats as `PT0S`; otherwise hours/minutes/seconds are used, with a
/// day component for durations of a day or more.
pub fn format_iso_period(total_seconds: u64) -> String {
    if total_seconds == 0 {
        return "PT0S".to_string();
    }

    let days = total_seconds / SECS_PER_DAY;
    let hours = (total_seconds % SECS_PER_DAY) / SECS_PER_HOUR;
    let minutes = (total_seconds % SECS_PER_HOUR) / SECS_PER_MINUTE;
    let seconds = total_seconds % SECS_PER_MINUTE;

    let mut out = String::from("P");
    if days > 0 {
        out.push_str(&format!("{}D", days));
    }
    if hours > 0 || minutes > 0 || seconds > 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{}H", hours));
        }
        if minutes > 0 {
            out.push_str(&format!("{}M", minutes));
        }
        if seconds > 0 {
            out.push_str(&format!("{}S", seconds));
        }
    }
    out
}

/// Parse an ISO-8601 period string into whole seconds.
///
/// Week and day designators are accepted; year and month designators are
/// rejected because they have no fixed length in seconds. Fractional
/// components are not supported.
pub fn parse_iso_period(input: &str) -> Result<u64, LookupError> {
    let body = input
        .strip_prefix('P')
        .ok_or_else(|| LookupError::Parser(format!("invalid ISO-8601 period: {}", input)))?;
    if body.is_empty() {
        return Err(LookupError::Parser(format!(
            "invalid ISO-8601 period: {}",
            input
        )));
    }

    let mut total: u64 = 0;
    let mut in_time = false;
    let mut saw_component = false;
    let mut digits = String::new();

    for c in body.chars() {
        match c {
            '0'..='9' => digits.push(c),
            'T' if !in_time && digits.is_empty() => in_time = true,
            'W' | 'D' | 'H' | 'M' | 'S' | 'Y' => {
                if digits.is_empty() {
                    return Err(LookupError::Parser(format!(
                        "invalid ISO-8601 period: {}",
                        input
                    )));
                }
                let value: u64 = digits.parse().map_err(|_| {
                    LookupError::Parser(format!("invalid ISO-8601 period: {}", input))
                })?;
                digits.clear();
                saw_component = true;

                let factor = match (c, in_time) {
                    ('W', false) => SECS_PER_WEEK,
                    ('D', false) => SECS_PER_DAY,
                    ('H', true) => SECS_PER_HOUR,
                    ('M', true) => SECS_PER_MINUTE,
                    ('S', true) => 1,
                    ('Y', _) | ('M', false) => {
                        return Err(LookupError::Parser(format!(
                            "period has no fixed length in seconds: {}",
                            input
                        )));
                    }
                    _ => {
                        return Err(LookupError::Parser(format!(
                            "invalid ISO-8601 period: {}",
                            input
                        )));
                    }
                };
                total = total
                    .checked_add(value.saturating_mul(factor))
                    .ok_or_else(|| {
                        LookupError::Parser(format!("period overflows: {}", input))
                    })?;
            }
            _ => {
                return Err(LookupError::Parser(format!(
                    "invalid ISO-8601 period: {}",
                    input
                )));
            }
        }
    }

    if !digits.is_empty() || !saw_component {
        return Err(LookupError::Parser(format!(
            "invalid ISO-8601 period: {}",
            input
        )));
    }
    Ok(total)
}

/// Format an instant as an ISO-8601 date-time string with millisecond
/// precision, e.g. `2024-05-01T12:30:00.000Z`.
pub fn format_iso_datetime(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 date-time string into a UTC instant.
pub fn parse_iso_datetime(input: &str) -> Result<DateTime<Utc>, LookupError> {
    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LookupError::Parser(format!("invalid ISO-8601 date-time '{}': {}", input, e)))
}
