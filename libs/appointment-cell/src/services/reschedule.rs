// libs/appointment-cell/src/services/reschedule.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    Actor, Appointment, AppointmentError, AppointmentStatus, CandidateSlot, MoveCommand,
    MoveKind, MoveOutcome, NotificationChannel, NotificationKind, NotificationRequest,
    RebookEligibilityResponse, RescheduleEligibilityResponse, ReschedulePolicy, Service,
    StatusHistoryEntry, TimeRange,
};
use crate::services::authorization::{authorize, AuthorizationPolicy, TenantRolePolicy};
use crate::services::availability::{day_of_week, slot_within_availability};
use crate::services::conflict::{evaluate_conflicts, ConflictDetectionService};
use crate::services::eligibility::{EligibilityService, REBOOKABLE_STATUSES};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::locking::{SlotKey, SlotLockGuard, SlotLockRegistry};
use crate::services::notification::NotificationDispatcher;
use crate::services::store::AppointmentStore;
use crate::services::time;

/// Reschedule and rebook orchestration.
///
/// Everything up to the conflict check is read-only. The slot locks for every
/// provider in the target slot are held from the conflict check until the
/// writes (and any compensating delete) have finished.
pub struct RescheduleService {
    store: Arc<dyn AppointmentStore>,
    eligibility: EligibilityService,
    conflicts: ConflictDetectionService,
    lifecycle: AppointmentLifecycleService,
    locks: Arc<SlotLockRegistry>,
    notifier: Arc<dyn NotificationDispatcher>,
    authorization: Arc<dyn AuthorizationPolicy>,
}

impl RescheduleService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        policy: ReschedulePolicy,
        locks: Arc<SlotLockRegistry>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            conflicts: ConflictDetectionService::new(Arc::clone(&store)),
            store,
            eligibility: EligibilityService::new(policy),
            lifecycle: AppointmentLifecycleService::new(),
            locks,
            notifier,
            authorization: Arc::new(TenantRolePolicy),
        }
    }

    pub async fn reschedule_eligibility(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        now: chrono::NaiveDateTime,
    ) -> Result<RescheduleEligibilityResponse, AppointmentError> {
        let appointment = self.load_authorized(actor, appointment_id).await?;
        let report = self.eligibility.check_eligibility(&appointment, now);

        Ok(RescheduleEligibilityResponse {
            appointment_id,
            status: appointment.status,
            can_reschedule: report.can,
            reasons: report.reasons,
            reschedule_count: appointment.reschedule_count,
            max_reschedules: self.eligibility.policy().max_reschedules_per_appointment,
        })
    }

    pub async fn rebook_eligibility(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
    ) -> Result<RebookEligibilityResponse, AppointmentError> {
        let appointment = self.load_authorized(actor, appointment_id).await?;
        let report = self.eligibility.check_rebook_eligibility(&appointment);

        Ok(RebookEligibilityResponse {
            appointment_id,
            status: appointment.status,
            can_rebook: report.can,
            reasons: report.reasons,
            allowed_statuses: REBOOKABLE_STATUSES.to_vec(),
        })
    }

    /// Reschedule or rebook according to `command.kind`.
    #[instrument(skip(self, actor, command), fields(appointment_id = %command.appointment_id, actor = %actor.user_id))]
    pub async fn move_appointment(&self, actor: &Actor, command: MoveCommand) -> Result<MoveOutcome, AppointmentError> {
        let original = self.load_authorized(actor, command.appointment_id).await?;

        let report = match &command.kind {
            MoveKind::Reschedule { .. } => self.eligibility.check_eligibility(&original, command.now),
            MoveKind::Rebook => self.eligibility.check_rebook_eligibility(&original),
        };
        if !report.can {
            warn!("Appointment {} is not eligible: {:?}", original.id, report.reasons);
            return Err(AppointmentError::Eligibility { reasons: report.reasons });
        }

        if matches!(command.kind, MoveKind::Reschedule { .. }) {
            self.lifecycle.transition(original.status, AppointmentStatus::Cancelled, actor.role)?;
        }

        let draft = self.draft_appointment(&original, &command).await?;
        let candidates = candidate_slots(&draft, original.id)?;
        self.ensure_within_availability(&candidates).await?;

        let guard = self.locks
            .acquire(candidates.iter().map(SlotKey::from).collect())
            .await;
        debug!("Holding {} slot lock(s) for {}", guard.keys().len(), original.id);

        let report = self.conflicts.check_conflicts(&candidates).await?;
        let overridden_conflicts = evaluate_conflicts(&report.conflicting_appointments, command.allow_overbooking)
            .inspect_err(|_| warn!("Rejected move of {}: slot is taken", original.id))?;
        if !overridden_conflicts.is_empty() {
            warn!("Overbooking {} conflicting appointment(s) for {}", overridden_conflicts.len(), original.id);
        }

        let (new_appointment, original_appointment) = self
            .mutate(guard, original, draft, &command.kind, actor.user_id.clone())
            .await?;

        let notification_sent = self
            .notify(&new_appointment, command.kind.notification_kind(), command.notify)
            .await;

        info!("{} appointment {} -> {} ({} reschedule(s))",
              match command.kind { MoveKind::Reschedule { .. } => "Rescheduled", MoveKind::Rebook => "Rebooked" },
              original_appointment.id, new_appointment.id, new_appointment.reschedule_count);

        Ok(MoveOutcome {
            reschedule_count: new_appointment.reschedule_count,
            new_appointment,
            original_appointment,
            notification_sent,
            overridden_conflicts,
        })
    }

    async fn load_authorized(&self, actor: &Actor, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.store
            .get_appointment(appointment_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound(format!("Appointment {}", appointment_id)))?;

        authorize(self.authorization.as_ref(), actor, &appointment)?;
        Ok(appointment)
    }

    async fn load_service(&self, service_id: Uuid, tenant_id: Uuid) -> Result<Option<Service>, AppointmentError> {
        Ok(self.store
            .get_service(service_id)
            .await?
            .filter(|service| service.tenant_id == tenant_id))
    }

    /// New row for the target slot. Unset fields carry over from the original.
    async fn draft_appointment(&self, original: &Appointment, command: &MoveCommand) -> Result<Appointment, AppointmentError> {
        let target = &command.target;

        let service = match (target.service_id, original.service_id) {
            (Some(id), _) => Some(
                self.load_service(id, original.tenant_id)
                    .await?
                    .ok_or_else(|| AppointmentError::NotFound(format!("Service {}", id)))?,
            ),
            (None, Some(id)) if target.end_time.is_none() => self.load_service(id, original.tenant_id).await?,
            _ => None,
        };

        let end_time = match target.end_time {
            Some(end_time) => end_time,
            None => {
                let minutes = service
                    .as_ref()
                    .map(|s| s.duration_minutes as i64)
                    .filter(|minutes| *minutes > 0)
                    .unwrap_or_else(|| original.duration_minutes());
                time::add_minutes(target.start_time, minutes)?
            }
        };
        let range = TimeRange::new(target.start_time, end_time)?;

        if target.date.and_time(range.start) <= command.now {
            return Err(AppointmentError::Validation("The new slot must be in the future".to_string()));
        }

        let price = match (target.service_id, &service) {
            (Some(_), Some(service)) => service.price.or(original.price),
            _ => original.price,
        };

        let (reschedule_count, is_rebook) = match command.kind {
            MoveKind::Reschedule { .. } => (original.reschedule_count + 1, false),
            MoveKind::Rebook => (0, true),
        };

        Ok(Appointment {
            id: Uuid::new_v4(),
            tenant_id: original.tenant_id,
            patient_id: original.patient_id,
            service_id: target.service_id.or(original.service_id),
            doctor_id: target.doctor_id.or(original.doctor_id),
            member_id: target.member_id.or(original.member_id),
            appointment_date: target.date,
            start_time: range.start,
            end_time: range.end,
            status: AppointmentStatus::Pending,
            notes: target.notes.clone().or_else(|| original.notes.clone()),
            price,
            original_appointment_id: Some(original.chain_root()),
            rescheduled_from_id: Some(original.id),
            reschedule_count,
            is_rebook,
            created_at: None,
            updated_at: None,
        })
    }

    /// Providers without any window on that weekday are treated as unrestricted.
    async fn ensure_within_availability(&self, candidates: &[CandidateSlot]) -> Result<(), AppointmentError> {
        for candidate in candidates {
            let windows = self.store
                .find_availability(candidate.tenant_id, candidate.provider, day_of_week(candidate.date))
                .await?;

            if windows.is_empty() {
                debug!("No availability windows for {} on {}", candidate.provider, candidate.date);
                continue;
            }

            if !slot_within_availability(&windows, &candidate.range) {
                warn!("Slot {}-{} on {} is outside working hours of {}",
                      candidate.range.start, candidate.range.end, candidate.date, candidate.provider);
                return Err(AppointmentError::Validation(format!(
                    "Requested slot {}-{} on {} is outside the provider's working hours",
                    time::format_hhmm(candidate.range.start),
                    time::format_hhmm(candidate.range.end),
                    candidate.date
                )));
            }
        }
        Ok(())
    }

    /// Writes run on their own task so a dropped request cannot interrupt a
    /// half-applied reschedule before its compensation has run. The slot locks
    /// move into the task and are released when it finishes.
    async fn mutate(
        &self,
        guard: SlotLockGuard,
        original: Appointment,
        draft: Appointment,
        kind: &MoveKind,
        changed_by: String,
    ) -> Result<(Appointment, Appointment), AppointmentError> {
        let store = Arc::clone(&self.store);
        let kind = kind.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            match kind {
                MoveKind::Reschedule { reason } => {
                    apply_reschedule(&*store, original, draft, &reason, &changed_by).await
                }
                MoveKind::Rebook => {
                    let created = store.insert_appointment(&draft).await
                        .inspect_err(|e| error!("Failed to create rebooked appointment: {}", e))?;
                    Ok::<_, AppointmentError>((created, original))
                }
            }
        });

        task.await.map_err(|e| AppointmentError::Mutation(format!("Appointment write task failed: {}", e)))?
    }

    async fn notify(
        &self,
        appointment: &Appointment,
        kind: NotificationKind,
        channels: Option<Vec<NotificationChannel>>,
    ) -> bool {
        let Some(channels) = channels else {
            return false;
        };

        let request = NotificationRequest {
            appointment_id: appointment.id,
            kind,
            channels,
        };

        match self.notifier.dispatch(&request).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Notification for appointment {} failed: {}", appointment.id, e);
                false
            }
        }
    }
}

/// One candidate per provider on the new row. The original is excluded so a
/// move onto an overlapping slot of the same provider does not conflict with itself.
fn candidate_slots(draft: &Appointment, original_id: Uuid) -> Result<Vec<CandidateSlot>, AppointmentError> {
    let providers = draft.providers();
    if providers.is_empty() {
        return Err(AppointmentError::Validation(
            "The appointment needs a doctor or member to be scheduled".to_string(),
        ));
    }

    Ok(providers
        .into_iter()
        .map(|provider| CandidateSlot {
            tenant_id: draft.tenant_id,
            provider,
            date: draft.appointment_date,
            range: TimeRange { start: draft.start_time, end: draft.end_time },
            exclude_appointment_id: Some(original_id),
        })
        .collect())
}

fn cancellation_note(original: &Appointment, replacement: &Appointment, reason: &str) -> String {
    let annotation = format!(
        "Rescheduled to {} {} (appointment {}). Reason: {}",
        replacement.appointment_date,
        time::format_hhmm(replacement.start_time),
        replacement.id,
        reason
    );
    match original.notes.as_deref().map(str::trim) {
        Some(notes) if !notes.is_empty() => format!("{}\n{}", notes, annotation),
        _ => annotation,
    }
}

/// Create the replacement, then cancel the original. A failed cancel deletes
/// the replacement again.
async fn apply_reschedule(
    store: &dyn AppointmentStore,
    original: Appointment,
    draft: Appointment,
    reason: &str,
    changed_by: &str,
) -> Result<(Appointment, Appointment), AppointmentError> {
    let created = store.insert_appointment(&draft).await
        .inspect_err(|e| error!("Failed to create replacement for {}: {}", original.id, e))?;

    let note = cancellation_note(&original, &created, reason);
    let cancelled = match store.update_appointment_status(original.id, AppointmentStatus::Cancelled, Some(note)).await {
        Ok(cancelled) => cancelled,
        Err(cancel_error) => {
            error!("Failed to cancel {} after creating {}: {}", original.id, created.id, cancel_error);
            return match store.delete_appointment(created.id).await {
                Ok(()) => {
                    warn!("Rolled back replacement appointment {}", created.id);
                    Err(AppointmentError::Mutation(format!(
                        "Failed to cancel original appointment: {}", cancel_error
                    )))
                }
                Err(delete_error) => {
                    error!("Rollback of {} failed, manual cleanup required: {}", created.id, delete_error);
                    Err(AppointmentError::Compensation {
                        mutation: cancel_error.to_string(),
                        compensation: delete_error.to_string(),
                    })
                }
            };
        }
    };

    let history = StatusHistoryEntry {
        appointment_id: original.id,
        tenant_id: original.tenant_id,
        from_status: original.status,
        to_status: AppointmentStatus::Cancelled,
        changed_by: changed_by.to_string(),
        notes: Some(format!("Rescheduled: {}", reason)),
        changed_at: Utc::now(),
    };
    if let Err(e) = store.record_status_change(&history).await {
        warn!("Failed to record status history for {}: {}", original.id, e);
    }

    Ok((created, cancelled))
}
