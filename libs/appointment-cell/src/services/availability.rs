// libs/appointment-cell/src/services/availability.rs
use chrono::{Datelike, NaiveDate, NaiveTime};

use crate::models::{Appointment, AvailabilityWindow, TimeRange};
use crate::services::time;

/// `day_of_week` value used by availability rows: 0 = Sunday .. 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

/// The slot fits inside one window and misses all of that window's breaks.
pub fn slot_within_availability(windows: &[AvailabilityWindow], slot: &TimeRange) -> bool {
    windows.iter().any(|window| {
        window.range().contains(slot) && !window.breaks.iter().any(|b| b.overlaps(slot))
    })
}

/// Start-aligned free slots of `duration_minutes`, stepping by `step_minutes`
/// through each window. Skips breaks and any blocking booking.
pub fn free_slots(
    windows: &[AvailabilityWindow],
    bookings: &[Appointment],
    duration_minutes: i64,
    step_minutes: i64,
) -> Vec<TimeRange> {
    let mut slots = Vec::new();
    if duration_minutes <= 0 || step_minutes <= 0 {
        return slots;
    }

    let busy: Vec<TimeRange> = bookings
        .iter()
        .filter(|apt| apt.status.is_blocking())
        .map(|apt| TimeRange { start: apt.start_time, end: apt.end_time })
        .collect();

    for window in windows {
        let window_end = time::minutes_since_midnight(window.end_time);
        let mut cursor = time::minutes_since_midnight(window.start_time);

        while cursor + duration_minutes <= window_end {
            if let Some(slot) = range_from_minutes(cursor, cursor + duration_minutes) {
                let blocked = window.breaks.iter().any(|b| b.overlaps(&slot))
                    || busy.iter().any(|b| b.overlaps(&slot));
                if !blocked {
                    slots.push(slot);
                }
            }
            cursor += step_minutes;
        }
    }

    slots.sort_by_key(|slot| slot.start);
    slots.dedup();
    slots
}

fn range_from_minutes(start: i64, end: i64) -> Option<TimeRange> {
    let to_time = |m: i64| NaiveTime::from_hms_opt((m / 60) as u32, (m % 60) as u32, 0);
    Some(TimeRange { start: to_time(start)?, end: to_time(end)? })
}
