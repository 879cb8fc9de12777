// libs/appointment-cell/src/services/validation.rs
//
// Request bodies are validated once here and turned into typed commands. Nothing
// past this module sees raw strings.
//
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use uuid::Uuid;

use crate::models::{
    AppointmentError, ConflictCheckQuery, MoveCommand, MoveKind, NotificationChannel,
    ProviderRef, RebookAppointmentRequest, RescheduleAppointmentRequest, TargetSlot, TimeRange,
};
use crate::services::time;

const MIN_REASON_LENGTH: usize = 3;

static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is valid"));

pub fn parse_date(raw: &str) -> Result<NaiveDate, AppointmentError> {
    let invalid = || AppointmentError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", raw));

    if !DATE_PATTERN.is_match(raw.trim()) {
        return Err(invalid());
    }

    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| invalid())
}

pub fn validate_reason(reason: Option<&str>) -> Result<String, AppointmentError> {
    let reason = reason.map(str::trim).unwrap_or_default();
    if reason.chars().count() < MIN_REASON_LENGTH {
        return Err(AppointmentError::Validation(format!(
            "A reschedule reason of at least {} characters is required",
            MIN_REASON_LENGTH
        )));
    }
    Ok(reason.to_string())
}

/// Fields shared by reschedule and rebook bodies.
struct RawTarget<'a> {
    new_date: &'a str,
    new_start_time: &'a str,
    new_end_time: Option<&'a str>,
    new_doctor_id: Option<Uuid>,
    new_member_id: Option<Uuid>,
    new_service_id: Option<Uuid>,
    notes: Option<&'a str>,
}

fn parse_target(raw: RawTarget<'_>) -> Result<TargetSlot, AppointmentError> {
    let date = parse_date(raw.new_date)?;
    let start_time = time::parse_time_of_day(raw.new_start_time)?;
    let end_time = raw.new_end_time
        .filter(|value| !value.trim().is_empty())
        .map(time::parse_time_of_day)
        .transpose()?;

    if let Some(end_time) = end_time {
        TimeRange::new(start_time, end_time)?;
    }

    Ok(TargetSlot {
        date,
        start_time,
        end_time,
        doctor_id: raw.new_doctor_id,
        member_id: raw.new_member_id,
        service_id: raw.new_service_id,
        notes: raw.notes.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
    })
}

fn notify_channels(send: Option<bool>, channels: Option<&Vec<NotificationChannel>>) -> Option<Vec<NotificationChannel>> {
    if send == Some(false) {
        return None;
    }
    match channels {
        Some(channels) if !channels.is_empty() => Some(channels.clone()),
        _ => Some(vec![NotificationChannel::Email]),
    }
}

impl RescheduleAppointmentRequest {
    pub fn into_command(self, appointment_id: Uuid, now: NaiveDateTime) -> Result<MoveCommand, AppointmentError> {
        let reason = validate_reason(self.reason.as_deref())?;
        let target = parse_target(RawTarget {
            new_date: &self.new_date,
            new_start_time: &self.new_start_time,
            new_end_time: self.new_end_time.as_deref(),
            new_doctor_id: self.new_doctor_id,
            new_member_id: self.new_member_id,
            new_service_id: self.new_service_id,
            notes: self.notes.as_deref(),
        })?;

        Ok(MoveCommand {
            appointment_id,
            kind: MoveKind::Reschedule { reason },
            target,
            allow_overbooking: self.allow_overbooking.unwrap_or(false),
            notify: notify_channels(self.send_notification, self.notification_channels.as_ref()),
            now,
        })
    }
}

impl RebookAppointmentRequest {
    pub fn into_command(self, appointment_id: Uuid, now: NaiveDateTime) -> Result<MoveCommand, AppointmentError> {
        let target = parse_target(RawTarget {
            new_date: &self.new_date,
            new_start_time: &self.new_start_time,
            new_end_time: self.new_end_time.as_deref(),
            new_doctor_id: self.new_doctor_id,
            new_member_id: self.new_member_id,
            new_service_id: self.new_service_id,
            notes: self.notes.as_deref(),
        })?;

        Ok(MoveCommand {
            appointment_id,
            kind: MoveKind::Rebook,
            target,
            allow_overbooking: self.allow_overbooking.unwrap_or(false),
            notify: notify_channels(self.send_notification, self.notification_channels.as_ref()),
            now,
        })
    }
}

impl ConflictCheckQuery {
    /// Provider, date and range of an ad-hoc conflict check.
    pub fn parse(&self) -> Result<(ProviderRef, NaiveDate, TimeRange), AppointmentError> {
        let provider = ProviderRef::from_ids(self.doctor_id, self.member_id)?;
        let date = parse_date(&self.date)?;
        let range = TimeRange::new(
            time::parse_time_of_day(&self.start_time)?,
            time::parse_time_of_day(&self.end_time)?,
        )?;
        Ok((provider, date, range))
    }
}
