#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

use appointment_cell::models::*;
use appointment_cell::services::locking::SlotLockRegistry;
use appointment_cell::services::notification::NotificationDispatcher;
use appointment_cell::services::reschedule::RescheduleService;
use appointment_cell::services::store::AppointmentStore;

pub fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Facility-local "now" used by most scenarios: two days before `visit_date()`.
pub fn now() -> NaiveDateTime {
    d(2025, 6, 8).and_hms_opt(9, 0, 0).unwrap()
}

pub fn visit_date() -> NaiveDate {
    d(2025, 6, 10)
}

pub fn appointment(
    tenant_id: Uuid,
    doctor_id: Uuid,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    status: AppointmentStatus,
) -> Appointment {
    Appointment {
        id: Uuid::new_v4(),
        tenant_id,
        patient_id: Some(Uuid::new_v4()),
        service_id: None,
        doctor_id: Some(doctor_id),
        member_id: None,
        appointment_date: date,
        start_time: start,
        end_time: end,
        status,
        notes: None,
        price: Some(80.0),
        original_appointment_id: None,
        rescheduled_from_id: None,
        reschedule_count: 0,
        is_rebook: false,
        created_at: None,
        updated_at: None,
    }
}

pub fn staff(tenant_id: Uuid) -> Actor {
    Actor {
        user_id: Uuid::new_v4().to_string(),
        tenant_id,
        role: ActorRole::Staff,
        provider_id: None,
    }
}

/// In-memory store with switchable write failures.
#[derive(Default)]
pub struct InMemoryStore {
    pub appointments: Mutex<Vec<Appointment>>,
    pub services: Mutex<Vec<Service>>,
    pub availability: Mutex<Vec<AvailabilityWindow>>,
    pub history: Mutex<Vec<StatusHistoryEntry>>,
    pub fail_cancel: AtomicBool,
    pub fail_delete: AtomicBool,
    /// Delay on booking reads, to widen the check-then-write window.
    pub read_delay_ms: AtomicUsize,
}

impl InMemoryStore {
    pub fn with(appointments: Vec<Appointment>) -> Arc<Self> {
        let store = Self::default();
        *store.appointments.lock().unwrap() = appointments;
        Arc::new(store)
    }

    pub fn get(&self, id: Uuid) -> Option<Appointment> {
        self.appointments.lock().unwrap().iter().find(|a| a.id == id).cloned()
    }

    pub fn all(&self) -> Vec<Appointment> {
        self.appointments.lock().unwrap().clone()
    }

    pub fn add_service(&self, service: Service) {
        self.services.lock().unwrap().push(service);
    }

    pub fn add_window(&self, window: AvailabilityWindow) {
        self.availability.lock().unwrap().push(window);
    }
}

#[async_trait]
impl AppointmentStore for InMemoryStore {
    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.get(id))
    }

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, AppointmentError> {
        Ok(self.services.lock().unwrap().iter().find(|s| s.id == id).cloned())
    }

    async fn find_bookings(&self, query: &BookingQuery) -> Result<Vec<Appointment>, AppointmentError> {
        let rows: Vec<Appointment> = self.appointments.lock().unwrap()
            .iter()
            .filter(|a| a.tenant_id == query.tenant_id)
            .filter(|a| a.is_assigned_to(&query.provider))
            .filter(|a| a.appointment_date == query.date)
            .filter(|a| query.statuses.is_empty() || query.statuses.contains(&a.status))
            .filter(|a| match &query.window {
                Some(w) => a.start_time <= w.end && a.end_time >= w.start,
                None => true,
            })
            .cloned()
            .collect();

        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        Ok(rows)
    }

    async fn find_availability(
        &self,
        tenant_id: Uuid,
        provider: ProviderRef,
        day_of_week: i32,
    ) -> Result<Vec<AvailabilityWindow>, AppointmentError> {
        Ok(self.availability.lock().unwrap()
            .iter()
            .filter(|w| w.tenant_id == tenant_id && w.day_of_week == day_of_week)
            .filter(|w| match provider {
                ProviderRef::Doctor(id) => w.doctor_id == Some(id),
                ProviderRef::Member(id) => w.member_id == Some(id),
            })
            .cloned()
            .collect())
    }

    async fn insert_appointment(&self, record: &Appointment) -> Result<Appointment, AppointmentError> {
        let mut created = record.clone();
        created.created_at = Some(Utc::now());
        self.appointments.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_appointment_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        if status == AppointmentStatus::Cancelled && self.fail_cancel.load(Ordering::SeqCst) {
            return Err(AppointmentError::Mutation("cancel rejected by store".to_string()));
        }

        let mut rows = self.appointments.lock().unwrap();
        let row = rows.iter_mut().find(|a| a.id == id)
            .ok_or_else(|| AppointmentError::Mutation(format!("Appointment {} missing", id)))?;
        row.status = status;
        row.notes = notes;
        row.updated_at = Some(Utc::now());
        Ok(row.clone())
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<(), AppointmentError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(AppointmentError::Mutation("delete rejected by store".to_string()));
        }
        self.appointments.lock().unwrap().retain(|a| a.id != id);
        Ok(())
    }

    async fn record_status_change(&self, entry: &StatusHistoryEntry) -> Result<(), AppointmentError> {
        self.history.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<NotificationRequest>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn dispatch(&self, request: &NotificationRequest) -> Result<(), AppointmentError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppointmentError::Database("mailer unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(request.clone());
        Ok(())
    }
}

pub fn service_for(store: &Arc<InMemoryStore>, notifier: &Arc<RecordingNotifier>) -> RescheduleService {
    service_with_locks(store, notifier, Arc::new(SlotLockRegistry::new()))
}

pub fn service_with_locks(
    store: &Arc<InMemoryStore>,
    notifier: &Arc<RecordingNotifier>,
    locks: Arc<SlotLockRegistry>,
) -> RescheduleService {
    RescheduleService::new(
        store.clone(),
        ReschedulePolicy::default(),
        locks,
        notifier.clone(),
    )
}

pub fn reschedule_to(date: &str, start: &str, reason: &str) -> RescheduleAppointmentRequest {
    RescheduleAppointmentRequest {
        new_date: date.to_string(),
        new_start_time: start.to_string(),
        reason: Some(reason.to_string()),
        ..Default::default()
    }
}
