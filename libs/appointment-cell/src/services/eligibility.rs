// libs/appointment-cell/src/services/eligibility.rs
use chrono::{Duration, NaiveDateTime};
use tracing::debug;

use crate::models::{Appointment, AppointmentStatus, EligibilityReport, ReschedulePolicy};

/// Statuses a rebook may start from.
pub const REBOOKABLE_STATUSES: [AppointmentStatus; 3] = [
    AppointmentStatus::Completed,
    AppointmentStatus::NoShow,
    AppointmentStatus::Cancelled,
];

pub struct EligibilityService {
    policy: ReschedulePolicy,
}

impl EligibilityService {
    pub fn new(policy: ReschedulePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ReschedulePolicy {
        &self.policy
    }

    /// Every reason the appointment cannot be rescheduled at `now`.
    /// Reasons accumulate so the caller can show them all at once.
    pub fn check_eligibility(&self, appointment: &Appointment, now: NaiveDateTime) -> EligibilityReport {
        let policy = &self.policy;
        let mut reasons = Vec::new();

        if !policy.allowed_source_statuses.contains(&appointment.status) {
            let allowed: Vec<&str> = policy.allowed_source_statuses.iter().map(|s| s.as_str()).collect();
            reasons.push(format!(
                "Appointments with status {} cannot be rescheduled (allowed: {})",
                appointment.status,
                allowed.join(", ")
            ));
        }

        if appointment.reschedule_count >= policy.max_reschedules_per_appointment {
            reasons.push(format!(
                "Reschedule limit reached: {} of {} reschedules already used",
                appointment.reschedule_count, policy.max_reschedules_per_appointment
            ));
        }

        let cutoff = appointment.starts_at() - Duration::hours(policy.min_hours_before_appointment);
        if now > cutoff {
            reasons.push(format!(
                "Appointments can only be rescheduled at least {} hours before the start time",
                policy.min_hours_before_appointment
            ));
        }

        debug!("Eligibility for appointment {}: {} reason(s)", appointment.id, reasons.len());
        EligibilityReport::from_reasons(reasons)
    }

    /// Mirror check for rebooking: only terminal appointments start a new booking.
    pub fn check_rebook_eligibility(&self, appointment: &Appointment) -> EligibilityReport {
        let mut reasons = Vec::new();

        if !REBOOKABLE_STATUSES.contains(&appointment.status) {
            reasons.push(format!(
                "Only completed, no_show or cancelled appointments can be rebooked (current status: {})",
                appointment.status
            ));
        }

        EligibilityReport::from_reasons(reasons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use uuid::Uuid;

    fn appointment(status: AppointmentStatus, reschedule_count: i32) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            patient_id: None,
            service_id: None,
            doctor_id: Some(Uuid::new_v4()),
            member_id: None,
            appointment_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap(),
            status,
            notes: None,
            price: None,
            original_appointment_id: None,
            rescheduled_from_id: None,
            reschedule_count,
            is_rebook: false,
            created_at: None,
            updated_at: None,
        }
    }

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day).unwrap().and_hms_opt(hour, 0, 0).unwrap()
    }

    #[test]
    fn test_eligible_well_ahead() {
        let service = EligibilityService::new(ReschedulePolicy::default());
        let report = service.check_eligibility(&appointment(AppointmentStatus::Confirmed, 0), at(5, 9));
        assert!(report.can);
        assert!(report.reasons.is_empty());
    }

    #[test]
    fn test_limit_reached_regardless_of_time() {
        let service = EligibilityService::new(ReschedulePolicy::default());
        let apt = appointment(AppointmentStatus::Pending, 3);

        for now in [at(1, 0), at(9, 9), at(10, 11)] {
            let report = service.check_eligibility(&apt, now);
            assert!(!report.can);
            assert!(report.reasons.iter().any(|r| r.contains("limit")), "{:?}", report.reasons);
        }
    }

    #[test]
    fn test_blackout_window_boundary() {
        let service = EligibilityService::new(ReschedulePolicy::default());
        let apt = appointment(AppointmentStatus::Confirmed, 0);

        // Start is 2025-03-10 10:00; cutoff is exactly 24h earlier.
        assert!(service.check_eligibility(&apt, at(9, 10)).can);
        assert!(!service.check_eligibility(&apt, at(9, 11)).can);
    }

    #[test]
    fn test_reasons_accumulate() {
        let service = EligibilityService::new(ReschedulePolicy::default());
        let report = service.check_eligibility(&appointment(AppointmentStatus::Completed, 5), at(10, 12));

        assert!(!report.can);
        assert_eq!(report.reasons.len(), 3);
    }

    #[test]
    fn test_custom_policy() {
        let policy = ReschedulePolicy {
            max_reschedules_per_appointment: 1,
            min_hours_before_appointment: 0,
            allowed_source_statuses: vec![AppointmentStatus::Confirmed],
        };
        let service = EligibilityService::new(policy);

        let report = service.check_eligibility(&appointment(AppointmentStatus::Pending, 0), at(10, 9));
        assert_eq!(report.reasons.len(), 1);
        assert!(report.reasons[0].contains("pending"));
    }

    #[test]
    fn test_rebook_requires_terminal_status() {
        let service = EligibilityService::new(ReschedulePolicy::default());
        for status in REBOOKABLE_STATUSES {
            assert!(service.check_rebook_eligibility(&appointment(status, 2)).can);
        }
        for status in AppointmentStatus::BLOCKING {
            let report = service.check_rebook_eligibility(&appointment(status, 0));
            assert!(!report.can);
            assert_eq!(report.reasons.len(), 1);
        }
    }
}
