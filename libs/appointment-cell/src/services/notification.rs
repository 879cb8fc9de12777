// libs/appointment-cell/src/services/notification.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use tracing::info;

use shared_database::supabase::SupabaseClient;

use crate::models::{AppointmentError, NotificationRequest};

/// Fire-and-forget notification hand-off. Failures are reported to the caller
/// but never undo the appointment change that triggered them.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, request: &NotificationRequest) -> Result<(), AppointmentError>;
}

/// Queues notifications in the `notification_outbox` table for the mailer worker.
pub struct SupabaseNotificationOutbox {
    supabase: Arc<SupabaseClient>,
    auth_token: String,
}

impl SupabaseNotificationOutbox {
    pub fn new(supabase: Arc<SupabaseClient>, auth_token: &str) -> Self {
        Self {
            supabase,
            auth_token: auth_token.to_string(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for SupabaseNotificationOutbox {
    async fn dispatch(&self, request: &NotificationRequest) -> Result<(), AppointmentError> {
        let body = json!({
            "appointment_id": request.appointment_id,
            "kind": request.kind,
            "channels": request.channels,
            "status": "queued",
            "created_at": Utc::now().to_rfc3339(),
        });

        self.supabase.execute(
            Method::POST,
            "/rest/v1/notification_outbox",
            Some(&self.auth_token),
            Some(body),
        ).await.map_err(|e| AppointmentError::Database(format!("Notification queueing failed: {}", e)))?;

        info!("Queued {:?} notification for appointment {}", request.kind, request.appointment_id);
        Ok(())
    }
}

/// Logs the notification intent only. Used when no outbox is configured.
pub struct LogNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for LogNotificationDispatcher {
    async fn dispatch(&self, request: &NotificationRequest) -> Result<(), AppointmentError> {
        info!("Notification intent: {:?} for appointment {} via {:?}",
              request.kind, request.appointment_id, request.channels);
        Ok(())
    }
}
