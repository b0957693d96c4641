//! Appointment availability math.
//!
//! Everything here is pure: callers fetch busy periods from the calendar and
//! pass them in, which keeps slot generation and booking-window checks
//! testable without a calendar connection.

use crate::business::{BookingRules, DayHours};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

/// Candidate slots start every this many minutes.
pub const SLOT_STEP_MINUTES: i64 = 15;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AvailabilityError {
    #[error("Invalid date format: {0}. Please use YYYY-MM-DD.")]
    InvalidDate(String),
    #[error("Invalid time '{0}'. Please use HH:MM.")]
    InvalidTime(String),
}

/// Why a requested start time cannot be booked.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum BookingWindowError {
    #[error("Appointments must be booked at least {0} hour(s) in advance.")]
    TooSoon(u32),
    #[error("Appointments can only be booked up to {0} days in advance.")]
    TooFarAhead(u32),
}

/// An existing calendar event blocking part of the day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BusyPeriod {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

/// A free appointment slot in business-local wall-clock time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slot {
    pub start: String,
    pub end: String,
}

pub fn parse_date(date: &str) -> Result<NaiveDate, AvailabilityError> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| AvailabilityError::InvalidDate(date.to_string()))
}

pub fn parse_time(time: &str) -> Result<NaiveTime, AvailabilityError> {
    NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .map_err(|_| AvailabilityError::InvalidTime(time.to_string()))
}

/// Combines a local date and wall-clock time in the business's offset.
pub fn local_datetime(
    date: NaiveDate,
    time: NaiveTime,
    offset: FixedOffset,
) -> DateTime<FixedOffset> {
    // A fixed offset has no gaps or folds, so the mapping is always single.
    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .unwrap_or_else(|| offset.from_utc_datetime(&date.and_time(time)))
}

/// The open/close instants of `date` for the given hours.
pub fn business_day_window(
    date: NaiveDate,
    hours: &DayHours,
    offset: FixedOffset,
) -> Result<(DateTime<FixedOffset>, DateTime<FixedOffset>), AvailabilityError> {
    let open = parse_time(&hours.open)?;
    let close = parse_time(&hours.close)?;
    Ok((
        local_datetime(date, open, offset),
        local_datetime(date, close, offset),
    ))
}

/// Lists free slots of `duration_minutes` between opening and closing time.
///
/// Candidates start every [`SLOT_STEP_MINUTES`]; a candidate is free when it
/// does not overlap any busy period widened by `buffer_minutes` on both sides.
pub fn open_slots(
    window: (DateTime<FixedOffset>, DateTime<FixedOffset>),
    duration_minutes: u32,
    buffer_minutes: u32,
    busy: &[BusyPeriod],
) -> Vec<Slot> {
    let (day_start, day_end) = window;
    if duration_minutes == 0 {
        return Vec::new();
    }
    let length = Duration::minutes(i64::from(duration_minutes));
    let buffer = Duration::minutes(i64::from(buffer_minutes));
    let step = Duration::minutes(SLOT_STEP_MINUTES);

    let mut slots = Vec::new();
    let mut slot_start = day_start;
    while slot_start + length <= day_end {
        let slot_end = slot_start + length;
        let overlaps = busy
            .iter()
            .any(|b| slot_start < b.end + buffer && slot_end > b.start - buffer);
        if !overlaps {
            slots.push(Slot {
                start: slot_start.format("%H:%M").to_string(),
                end: slot_end.format("%H:%M").to_string(),
            });
        }
        slot_start += step;
    }
    slots
}

/// Checks a requested start against the minimum-notice and maximum-advance rules.
pub fn check_booking_window(
    start: DateTime<FixedOffset>,
    now: DateTime<Utc>,
    rules: &BookingRules,
) -> Result<(), BookingWindowError> {
    let start = start.with_timezone(&Utc);
    if start < now + Duration::hours(i64::from(rules.min_notice_hours)) {
        return Err(BookingWindowError::TooSoon(rules.min_notice_hours));
    }
    if start > now + Duration::days(i64::from(rules.max_advance_days)) {
        return Err(BookingWindowError::TooFarAhead(rules.max_advance_days));
    }
    Ok(())
}
