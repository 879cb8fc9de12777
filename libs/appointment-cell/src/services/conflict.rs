use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, BookingQuery, CandidateSlot, ConflictCheckResponse,
};
use crate::services::store::AppointmentStore;

/// Every existing booking that overlaps the candidate slot.
///
/// `existing` is expected to be pre-filtered by the store, but the tenant,
/// date, provider and blocking-status filters are re-applied here so the result
/// never depends on how the query was built. The booking being moved
/// (`exclude_appointment_id`) is never reported.
pub fn find_conflicts(candidate: &CandidateSlot, existing: &[Appointment]) -> Vec<Appointment> {
    existing
        .iter()
        .filter(|apt| Some(apt.id) != candidate.exclude_appointment_id)
        .filter(|apt| apt.tenant_id == candidate.tenant_id)
        .filter(|apt| apt.appointment_date == candidate.date)
        .filter(|apt| apt.is_assigned_to(&candidate.provider))
        .filter(|apt| apt.status.is_blocking())
        .filter(|apt| {
            crate::services::time::overlaps(
                candidate.range.start,
                candidate.range.end,
                apt.start_time,
                apt.end_time,
            )
        })
        .cloned()
        .collect()
}

/// Overbooking decision layered on top of detection.
///
/// Returns the ids that were overridden (empty when there were no conflicts),
/// or `Conflict` with every conflicting id when overbooking is not allowed.
pub fn evaluate_conflicts(conflicts: &[Appointment], allow_overbooking: bool) -> Result<Vec<Uuid>, AppointmentError> {
    let ids: Vec<Uuid> = conflicts.iter().map(|apt| apt.id).collect();
    if ids.is_empty() || allow_overbooking {
        return Ok(ids);
    }
    Err(AppointmentError::Conflict { conflicting_ids: ids })
}

pub struct ConflictDetectionService {
    store: Arc<dyn AppointmentStore>,
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    /// Load bookings for each candidate and collect overlaps, de-duplicated
    /// across candidates (an appointment may hold both a doctor and a member).
    pub async fn check_conflicts(&self, candidates: &[CandidateSlot]) -> Result<ConflictCheckResponse, AppointmentError> {
        let mut seen = HashSet::new();
        let mut conflicting_appointments = Vec::new();

        for candidate in candidates {
            debug!("Checking conflicts for {} on {} from {} to {}",
                   candidate.provider, candidate.date, candidate.range.start, candidate.range.end);

            let existing = self.store.find_bookings(&BookingQuery::blocking_for(candidate)).await?;

            for conflict in find_conflicts(candidate, &existing) {
                if seen.insert(conflict.id) {
                    conflicting_appointments.push(conflict);
                }
            }
        }

        let has_conflict = !conflicting_appointments.is_empty();
        if has_conflict {
            warn!("Conflict detected - {} conflicting appointments", conflicting_appointments.len());
        }

        Ok(ConflictCheckResponse {
            has_conflict,
            conflicting_appointments,
        })
    }
}
