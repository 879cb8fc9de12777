// libs/appointment-cell/src/services/appointments.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    Actor, Appointment, AppointmentError, AppointmentStatus, AvailabilityQuery,
    AvailableSlotsResponse, BookingQuery, CandidateSlot, ConflictCheckQuery,
    ConflictCheckResponse, ProviderRef, StatusHistoryEntry,
};
use crate::services::authorization::{authorize, AuthorizationPolicy, TenantRolePolicy};
use crate::services::availability::{day_of_week, free_slots};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::store::AppointmentStore;
use crate::services::validation::parse_date;

const DEFAULT_SLOT_MINUTES: i64 = 30;

/// Reads, status changes and scheduling lookups for single appointments.
pub struct AppointmentService {
    store: Arc<dyn AppointmentStore>,
    lifecycle: AppointmentLifecycleService,
    authorization: Arc<dyn AuthorizationPolicy>,
}

impl AppointmentService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self {
            store,
            lifecycle: AppointmentLifecycleService::new(),
            authorization: Arc::new(TenantRolePolicy),
        }
    }

    pub async fn get_appointment(&self, actor: &Actor, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.store
            .get_appointment(appointment_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound(format!("Appointment {}", appointment_id)))?;

        authorize(self.authorization.as_ref(), actor, &appointment)?;
        Ok(appointment)
    }

    #[instrument(skip(self, actor, notes), fields(actor = %actor.user_id))]
    pub async fn update_status(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        requested: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(actor, appointment_id).await?;
        let change = self.lifecycle.transition(appointment.status, requested, actor.role)?;

        let notes = notes.or(appointment.notes.clone());
        let updated = self.store
            .update_appointment_status(appointment_id, change.to, notes.clone())
            .await?;

        let entry = StatusHistoryEntry {
            appointment_id,
            tenant_id: appointment.tenant_id,
            from_status: change.from,
            to_status: change.to,
            changed_by: actor.user_id.clone(),
            notes,
            changed_at: Utc::now(),
        };
        if let Err(e) = self.store.record_status_change(&entry).await {
            warn!("Failed to record status history for {}: {}", appointment_id, e);
        }

        info!("Appointment {} moved from {} to {}", appointment_id, change.from, change.to);
        Ok(updated)
    }

    /// Ad-hoc conflict check in the caller's tenant.
    pub async fn check_conflicts(
        &self,
        actor: &Actor,
        query: &ConflictCheckQuery,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        let (provider, date, range) = query.parse()?;
        let candidate = CandidateSlot {
            tenant_id: actor.tenant_id,
            provider,
            date,
            range,
            exclude_appointment_id: query.exclude_appointment_id,
        };

        ConflictDetectionService::new(Arc::clone(&self.store))
            .check_conflicts(&[candidate])
            .await
    }

    pub async fn available_slots(
        &self,
        actor: &Actor,
        query: &AvailabilityQuery,
    ) -> Result<AvailableSlotsResponse, AppointmentError> {
        let provider = ProviderRef::from_ids(query.doctor_id, query.member_id)?;
        let date = parse_date(&query.date)?;
        let duration = query.duration_minutes.unwrap_or(DEFAULT_SLOT_MINUTES);
        let step = query.step_minutes.unwrap_or(duration);

        if duration <= 0 || step <= 0 {
            return Err(AppointmentError::Validation(
                "duration_minutes and step_minutes must be positive".to_string(),
            ));
        }

        let windows = self.store
            .find_availability(actor.tenant_id, provider, day_of_week(date))
            .await?;
        let bookings = self.store
            .find_bookings(&BookingQuery {
                tenant_id: actor.tenant_id,
                provider,
                date,
                statuses: AppointmentStatus::BLOCKING.to_vec(),
                window: None,
            })
            .await?;

        let slots = free_slots(&windows, &bookings, duration, step);
        debug!("{} free slot(s) for {} on {}", slots.len(), provider, date);

        Ok(AvailableSlotsResponse { date, provider, slots })
    }
}
