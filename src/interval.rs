use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::limits::*;
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    InvalidDuration(i64),
    Unparseable { what: &'static str, input: String },
    OutOfRange(&'static str),
}

impl std::fmt::Display for IntervalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntervalError::InvalidDuration(m) => {
                write!(f, "slot duration must be positive, got {m} minutes")
            }
            IntervalError::Unparseable { what, input } => {
                write!(f, "cannot parse {what} from {input:?}")
            }
            IntervalError::OutOfRange(msg) => write!(f, "out of range: {msg}"),
        }
    }
}

impl std::error::Error for IntervalError {}

/// Which calendar day an occupancy query scans for a given reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayBounds {
    /// `[day + 1, day + 2)` at UTC midnight. This is what deployed clients
    /// have always received; it is NOT the naive reading of "the given day"
    /// and stays the default until the owner confirms which day is intended.
    #[default]
    NextDay,
    /// `[day, day + 1)` at UTC midnight.
    SameDay,
}

impl FromStr for DayBounds {
    type Err = IntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "next_day" => Ok(DayBounds::NextDay),
            "same_day" => Ok(DayBounds::SameDay),
            _ => Err(IntervalError::Unparseable {
                what: "day bounds convention",
                input: s.to_string(),
            }),
        }
    }
}

/// End of a slot starting at `start`: `start + slot_duration_minutes` minutes.
pub fn compute_slot_end(start: Ms, slot_duration_minutes: i64) -> Result<Ms, IntervalError> {
    if slot_duration_minutes <= 0 {
        return Err(IntervalError::InvalidDuration(slot_duration_minutes));
    }
    slot_duration_minutes
        .checked_mul(MINUTE_MS)
        .and_then(|d| start.checked_add(d))
        .ok_or(IntervalError::OutOfRange("slot end overflows"))
}

/// Instants scanned for `day` under `convention`, as a half-open span
/// `[start_of_day, start_of_next_day)`.
pub fn day_bounds(day: NaiveDate, convention: DayBounds) -> Result<Span, IntervalError> {
    let offset = match convention {
        DayBounds::NextDay => 1,
        DayBounds::SameDay => 0,
    };
    let first = day
        .checked_add_days(Days::new(offset))
        .ok_or(IntervalError::OutOfRange("date"))?;
    let next = first
        .checked_add_days(Days::new(1))
        .ok_or(IntervalError::OutOfRange("date"))?;
    Ok(Span::new(midnight_utc(first), midnight_utc(next)))
}

fn midnight_utc(day: NaiveDate) -> Ms {
    day.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Parse an RFC 3339 instant (explicit offset required) into Unix ms.
pub fn parse_instant(input: &str) -> Result<Ms, IntervalError> {
    let parsed = DateTime::parse_from_rfc3339(input.trim()).map_err(|_| {
        IntervalError::Unparseable {
            what: "instant",
            input: input.to_string(),
        }
    })?;
    let ms = parsed.timestamp_millis();
    if !(MIN_VALID_TIMESTAMP_MS..MAX_VALID_TIMESTAMP_MS).contains(&ms) {
        return Err(IntervalError::OutOfRange("timestamp out of range"));
    }
    Ok(ms)
}

/// Parse a reference date: `YYYY-MM-DD`, or an RFC 3339 timestamp whose
/// calendar date in its own offset is taken.
pub fn parse_reference_date(input: &str) -> Result<NaiveDate, IntervalError> {
    let trimmed = input.trim();
    let date = match NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => DateTime::parse_from_rfc3339(trimmed)
            .map(|dt| dt.date_naive())
            .map_err(|_| IntervalError::Unparseable {
                what: "date",
                input: input.to_string(),
            })?,
    };
    let ms = midnight_utc(date);
    if !(MIN_VALID_TIMESTAMP_MS..MAX_VALID_TIMESTAMP_MS).contains(&ms) {
        return Err(IntervalError::OutOfRange("date out of range"));
    }
    Ok(date)
}
