// libs/appointment-cell/src/models.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc, NaiveDate, NaiveDateTime, NaiveTime};
use std::fmt;
use std::str::FromStr;

use crate::services::time;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// Appointment row. Dates and times are facility-local wall-clock values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub appointment_date: NaiveDate,
    #[serde(with = "time_of_day")]
    pub start_time: NaiveTime,
    #[serde(with = "time_of_day")]
    pub end_time: NaiveTime,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub price: Option<f64>,
    pub original_appointment_id: Option<Uuid>,
    pub rescheduled_from_id: Option<Uuid>,
    #[serde(default)]
    pub reschedule_count: i32,
    #[serde(default)]
    pub is_rebook: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.appointment_date.and_time(self.start_time)
    }

    pub fn duration_minutes(&self) -> i64 {
        time::duration_minutes(self.start_time, self.end_time)
    }

    /// Root of the reschedule chain; an appointment without lineage is its own root.
    pub fn chain_root(&self) -> Uuid {
        self.original_appointment_id.unwrap_or(self.id)
    }

    /// Every provider this appointment occupies.
    pub fn providers(&self) -> Vec<ProviderRef> {
        let mut providers = Vec::with_capacity(2);
        if let Some(doctor_id) = self.doctor_id {
            providers.push(ProviderRef::Doctor(doctor_id));
        }
        if let Some(member_id) = self.member_id {
            providers.push(ProviderRef::Member(member_id));
        }
        providers
    }

    pub fn is_assigned_to(&self, provider: &ProviderRef) -> bool {
        match provider {
            ProviderRef::Doctor(id) => self.doctor_id == Some(*id),
            ProviderRef::Member(id) => self.member_id == Some(*id),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    /// Statuses that occupy a provider's time.
    pub const BLOCKING: [AppointmentStatus; 2] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self,
            AppointmentStatus::Completed |
            AppointmentStatus::Cancelled |
            AppointmentStatus::NoShow
        )
    }

    pub fn is_blocking(&self) -> bool {
        Self::BLOCKING.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| AppointmentError::Validation(format!("Unknown appointment status '{}'", s)))
    }
}

/// A bookable provider: a doctor or a schedulable member.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ProviderRef {
    Doctor(Uuid),
    Member(Uuid),
}

impl ProviderRef {
    pub fn id(&self) -> Uuid {
        match self {
            ProviderRef::Doctor(id) | ProviderRef::Member(id) => *id,
        }
    }

    /// Column holding this provider on appointment and availability rows.
    pub fn column(&self) -> &'static str {
        match self {
            ProviderRef::Doctor(_) => "doctor_id",
            ProviderRef::Member(_) => "member_id",
        }
    }

    /// Build from optional doctor/member ids; exactly one must be set.
    pub fn from_ids(doctor_id: Option<Uuid>, member_id: Option<Uuid>) -> Result<Self, AppointmentError> {
        match (doctor_id, member_id) {
            (Some(id), None) => Ok(ProviderRef::Doctor(id)),
            (None, Some(id)) => Ok(ProviderRef::Member(id)),
            (Some(_), Some(_)) => Err(AppointmentError::Validation(
                "Specify either doctor_id or member_id, not both".to_string(),
            )),
            (None, None) => Err(AppointmentError::Validation(
                "doctor_id or member_id is required".to_string(),
            )),
        }
    }
}

impl fmt::Display for ProviderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderRef::Doctor(id) => write!(f, "doctor:{}", id),
            ProviderRef::Member(id) => write!(f, "member:{}", id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub duration_minutes: i32,
    pub price: Option<f64>,
}

// ==============================================================================
// ACTORS AND ROLES
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    AdminTenant,
    Receptionist,
    Staff,
    Doctor,
    Member,
}

impl ActorRole {
    pub const ALL: [ActorRole; 5] = [
        ActorRole::AdminTenant,
        ActorRole::Receptionist,
        ActorRole::Staff,
        ActorRole::Doctor,
        ActorRole::Member,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::AdminTenant => "admin_tenant",
            ActorRole::Receptionist => "receptionist",
            ActorRole::Staff => "staff",
            ActorRole::Doctor => "doctor",
            ActorRole::Member => "member",
        }
    }

    /// Roles that act on any appointment in their tenant, not only their own.
    pub fn is_tenant_wide(&self) -> bool {
        matches!(self, ActorRole::AdminTenant | ActorRole::Receptionist | ActorRole::Staff)
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = AppointmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| AppointmentError::Forbidden(format!("Role '{}' may not manage appointments", s)))
    }
}

/// Authenticated caller, resolved from the verified token.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    pub user_id: String,
    pub tenant_id: Uuid,
    pub role: ActorRole,
    /// Doctor or member id linked to this user, for "own appointment" checks.
    pub provider_id: Option<Uuid>,
}

// ==============================================================================
// POLICY AND AVAILABILITY
// ==============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ReschedulePolicy {
    pub max_reschedules_per_appointment: i32,
    pub min_hours_before_appointment: i64,
    pub allowed_source_statuses: Vec<AppointmentStatus>,
}

impl Default for ReschedulePolicy {
    fn default() -> Self {
        Self {
            max_reschedules_per_appointment: 3,
            min_hours_before_appointment: 24,
            allowed_source_statuses: AppointmentStatus::BLOCKING.to_vec(),
        }
    }
}

impl ReschedulePolicy {
    pub fn from_config(config: &shared_config::AppConfig) -> Self {
        Self {
            max_reschedules_per_appointment: config.max_reschedules_per_appointment,
            min_hours_before_appointment: config.min_hours_before_reschedule,
            ..Self::default()
        }
    }
}

/// Half-open wall-clock range `[start, end)` on one calendar date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeRange {
    #[serde(with = "time_of_day")]
    pub start: NaiveTime,
    #[serde(with = "time_of_day")]
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self, AppointmentError> {
        if start >= end {
            return Err(AppointmentError::Validation(format!(
                "Start time {} must be before end time {}",
                time::format_hhmm(start),
                time::format_hhmm(end)
            )));
        }
        Ok(Self { start, end })
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        time::overlaps(self.start, self.end, other.start, other.end)
    }

    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Weekly working hours for one provider. `day_of_week` runs 0 (Sunday) to 6.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityWindow {
    pub id: Option<Uuid>,
    pub tenant_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub day_of_week: i32,
    #[serde(with = "time_of_day")]
    pub start_time: NaiveTime,
    #[serde(with = "time_of_day")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub breaks: Vec<TimeRange>,
}

impl AvailabilityWindow {
    pub fn range(&self) -> TimeRange {
        TimeRange { start: self.start_time, end: self.end_time }
    }
}

// ==============================================================================
// CONFLICT DETECTION MODELS
// ==============================================================================

/// Slot being proposed for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateSlot {
    pub tenant_id: Uuid,
    pub provider: ProviderRef,
    pub date: NaiveDate,
    pub range: TimeRange,
    pub exclude_appointment_id: Option<Uuid>,
}

/// Filter handed to the persistence collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingQuery {
    pub tenant_id: Uuid,
    pub provider: ProviderRef,
    pub date: NaiveDate,
    pub statuses: Vec<AppointmentStatus>,
    /// Optional pre-filter: rows with `start_time <= window.end` and `end_time >= window.start`.
    pub window: Option<TimeRange>,
}

impl BookingQuery {
    pub fn blocking_for(slot: &CandidateSlot) -> Self {
        Self {
            tenant_id: slot.tenant_id,
            provider: slot.provider,
            date: slot.date,
            statuses: AppointmentStatus::BLOCKING.to_vec(),
            window: Some(slot.range),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckQuery {
    pub doctor_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    pub exclude_appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    pub doctor_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub date: String,
    pub duration_minutes: Option<i64>,
    pub step_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableSlotsResponse {
    pub date: NaiveDate,
    pub provider: ProviderRef,
    pub slots: Vec<TimeRange>,
}

// ==============================================================================
// ELIGIBILITY AND STATUS MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EligibilityReport {
    pub can: bool,
    pub reasons: Vec<String>,
}

impl EligibilityReport {
    pub fn from_reasons(reasons: Vec<String>) -> Self {
        Self { can: reasons.is_empty(), reasons }
    }
}

/// Applied status edge, kept for the status history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusChange {
    pub from: AppointmentStatus,
    pub to: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusHistoryEntry {
    pub appointment_id: Uuid,
    pub tenant_id: Uuid,
    pub from_status: AppointmentStatus,
    pub to_status: AppointmentStatus,
    pub changed_by: String,
    pub notes: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: AppointmentStatus,
    pub notes: Option<String>,
}

// ==============================================================================
// RESCHEDULE / REBOOK REQUESTS
// ==============================================================================

/// Raw body of `POST /appointments/{id}/reschedule`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RescheduleAppointmentRequest {
    pub new_date: String,
    pub new_start_time: String,
    pub new_end_time: Option<String>,
    pub new_doctor_id: Option<Uuid>,
    pub new_member_id: Option<Uuid>,
    pub new_service_id: Option<Uuid>,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub send_notification: Option<bool>,
    pub notification_channels: Option<Vec<NotificationChannel>>,
    pub allow_overbooking: Option<bool>,
}

/// Raw body of `POST /appointments/{id}/rebook`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RebookAppointmentRequest {
    pub new_date: String,
    pub new_start_time: String,
    pub new_end_time: Option<String>,
    pub new_doctor_id: Option<Uuid>,
    pub new_member_id: Option<Uuid>,
    pub new_service_id: Option<Uuid>,
    pub notes: Option<String>,
    pub send_notification: Option<bool>,
    pub notification_channels: Option<Vec<NotificationChannel>>,
    pub allow_overbooking: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MoveKind {
    Reschedule { reason: String },
    Rebook,
}

impl MoveKind {
    pub fn notification_kind(&self) -> NotificationKind {
        match self {
            MoveKind::Reschedule { .. } => NotificationKind::Reschedule,
            MoveKind::Rebook => NotificationKind::Rebook,
        }
    }
}

/// Target of a move after boundary validation. `None` means "carry over".
#[derive(Debug, Clone, PartialEq)]
pub struct TargetSlot {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: Option<NaiveTime>,
    pub doctor_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// Validated reschedule or rebook command consumed by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct MoveCommand {
    pub appointment_id: Uuid,
    pub kind: MoveKind,
    pub target: TargetSlot,
    pub allow_overbooking: bool,
    pub notify: Option<Vec<NotificationChannel>>,
    /// Facility-local "now", supplied by the caller.
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub new_appointment: Appointment,
    pub original_appointment: Appointment,
    pub reschedule_count: i32,
    pub notification_sent: bool,
    pub overridden_conflicts: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleEligibilityResponse {
    pub appointment_id: Uuid,
    pub status: AppointmentStatus,
    pub can_reschedule: bool,
    pub reasons: Vec<String>,
    pub reschedule_count: i32,
    pub max_reschedules: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebookEligibilityResponse {
    pub appointment_id: Uuid,
    pub status: AppointmentStatus,
    pub can_rebook: bool,
    pub reasons: Vec<String>,
    pub allowed_statuses: Vec<AppointmentStatus>,
}

// ==============================================================================
// NOTIFICATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Reschedule,
    Rebook,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
    Whatsapp,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationRequest {
    pub appointment_id: Uuid,
    pub kind: NotificationKind,
    pub channels: Vec<NotificationChannel>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Appointment is not eligible: {}", reasons.join("; "))]
    Eligibility { reasons: Vec<String> },

    #[error("Requested slot conflicts with {} existing booking(s)", conflicting_ids.len())]
    Conflict { conflicting_ids: Vec<Uuid> },

    #[error("Cannot transition appointment from {from} to {to}")]
    InvalidTransition { from: AppointmentStatus, to: AppointmentStatus },

    #[error("Appointment is already {0}")]
    NoOpTransition(AppointmentStatus),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Appointment write failed: {0}")]
    Mutation(String),

    #[error("Appointment write failed ({mutation}) and rollback failed ({compensation})")]
    Compensation { mutation: String, compensation: String },
}

// ==============================================================================
// SERDE HELPERS
// ==============================================================================

/// Accepts `HH:MM` or `HH:MM:SS`; always writes `HH:MM:SS` (PostgreSQL `time`).
pub mod time_of_day {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::services::time::parse_time_of_day;

    pub fn serialize<S>(value: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format("%H:%M:%S").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_time_of_day(&raw).map_err(serde::de::Error::custom)
    }
}
