// libs/appointment-cell/src/state.rs
use std::sync::Arc;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::ReschedulePolicy;
use crate::services::appointments::AppointmentService;
use crate::services::locking::SlotLockRegistry;
use crate::services::notification::{
    LogNotificationDispatcher, NotificationDispatcher, SupabaseNotificationOutbox,
};
use crate::services::reschedule::RescheduleService;
use crate::services::store::{AppointmentStore, SupabaseAppointmentStore};

/// Router state. Created once; the lock registry spans all requests.
#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub supabase: Arc<SupabaseClient>,
    pub locks: Arc<SlotLockRegistry>,
}

impl AppointmentState {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(&config)),
            config,
            locks: Arc::new(SlotLockRegistry::new()),
        }
    }

    fn store(&self, auth_token: &str) -> Arc<dyn AppointmentStore> {
        Arc::new(SupabaseAppointmentStore::new(Arc::clone(&self.supabase), auth_token))
    }

    fn notifier(&self, auth_token: &str) -> Arc<dyn NotificationDispatcher> {
        if self.config.is_configured() {
            Arc::new(SupabaseNotificationOutbox::new(Arc::clone(&self.supabase), auth_token))
        } else {
            Arc::new(LogNotificationDispatcher)
        }
    }

    /// Services are per request so the caller's token reaches row-level security.
    pub fn reschedule_service(&self, auth_token: &str) -> RescheduleService {
        RescheduleService::new(
            self.store(auth_token),
            ReschedulePolicy::from_config(&self.config),
            Arc::clone(&self.locks),
            self.notifier(auth_token),
        )
    }

    pub fn appointment_service(&self, auth_token: &str) -> AppointmentService {
        AppointmentService::new(self.store(auth_token))
    }
}
