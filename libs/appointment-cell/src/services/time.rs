// libs/appointment-cell/src/services/time.rs
//! Wall-clock helpers. All comparisons are done on minutes since midnight.

use chrono::{NaiveTime, Timelike};

use crate::models::AppointmentError;

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Parse `HH:MM` or `HH:MM:SS`. Two digits per field, 24-hour clock.
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime, AppointmentError> {
    let invalid = || AppointmentError::Validation(format!(
        "Invalid time '{}', expected HH:MM or HH:MM:SS", raw
    ));

    let parts: Vec<&str> = raw.trim().split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(invalid());
    }

    let mut fields = [0u32; 3];
    for (slot, part) in fields.iter_mut().zip(parts.iter()) {
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        *slot = part.parse().map_err(|_| invalid())?;
    }

    NaiveTime::from_hms_opt(fields[0], fields[1], fields[2]).ok_or_else(invalid)
}

pub fn minutes_since_midnight(t: NaiveTime) -> i64 {
    (t.num_seconds_from_midnight() / 60) as i64
}

/// `[start_a, end_a)` and `[start_b, end_b)` share at least one minute.
pub fn overlaps(start_a: NaiveTime, end_a: NaiveTime, start_b: NaiveTime, end_b: NaiveTime) -> bool {
    let (sa, ea) = (minutes_since_midnight(start_a), minutes_since_midnight(end_a));
    let (sb, eb) = (minutes_since_midnight(start_b), minutes_since_midnight(end_b));
    sa < eb && sb < ea
}

pub fn duration_minutes(start: NaiveTime, end: NaiveTime) -> i64 {
    minutes_since_midnight(end) - minutes_since_midnight(start)
}

/// Add minutes without wrapping past midnight.
pub fn add_minutes(start: NaiveTime, minutes: i64) -> Result<NaiveTime, AppointmentError> {
    let total = minutes_since_midnight(start) + minutes;
    if minutes <= 0 || total >= MINUTES_PER_DAY {
        return Err(AppointmentError::Validation(format!(
            "A {} minute appointment starting at {} does not fit in the day",
            minutes, format_hhmm(start)
        )));
    }

    NaiveTime::from_hms_opt((total / 60) as u32, (total % 60) as u32, 0).ok_or_else(|| {
        AppointmentError::Validation(format!("Invalid end time after adding {} minutes", minutes))
    })
}

pub fn format_hhmm(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}
