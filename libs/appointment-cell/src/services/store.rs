// libs/appointment-cell/src/services/store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, AvailabilityWindow, BookingQuery,
    ProviderRef, Service, StatusHistoryEntry,
};

/// Persistence collaborator for the appointment rules.
///
/// Reads fail with `Database`; writes fail with `Mutation` so the orchestrator
/// can tell which step needs compensation.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, AppointmentError>;

    async fn find_bookings(&self, query: &BookingQuery) -> Result<Vec<Appointment>, AppointmentError>;

    async fn find_availability(
        &self,
        tenant_id: Uuid,
        provider: ProviderRef,
        day_of_week: i32,
    ) -> Result<Vec<AvailabilityWindow>, AppointmentError>;

    async fn insert_appointment(&self, record: &Appointment) -> Result<Appointment, AppointmentError>;

    async fn update_appointment_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError>;

    /// Only used to compensate a partially applied reschedule.
    async fn delete_appointment(&self, id: Uuid) -> Result<(), AppointmentError>;

    async fn record_status_change(&self, entry: &StatusHistoryEntry) -> Result<(), AppointmentError>;
}

/// PostgREST-backed store. Built per request so row-level security sees the caller's token.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
    auth_token: String,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>, auth_token: &str) -> Self {
        Self {
            supabase,
            auth_token: auth_token.to_string(),
        }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, AppointmentError> {
        let rows: Vec<Value> = self.supabase.request(
            Method::GET,
            path,
            Some(&self.auth_token),
            None,
        ).await.map_err(|e| AppointmentError::Database(e.to_string()))?;

        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| AppointmentError::Database(format!("Failed to parse rows from {}: {}", path, e)))
    }

    async fn write(&self, method: Method, path: &str, body: Option<Value>) -> Result<Vec<Value>, AppointmentError> {
        self.supabase.request_with_headers(
            method,
            path,
            Some(&self.auth_token),
            body,
            Some(SupabaseClient::return_representation()),
        ).await.map_err(|e| AppointmentError::Mutation(e.to_string()))
    }

    fn parse_written_appointment(rows: Vec<Value>, context: &str) -> Result<Appointment, AppointmentError> {
        let row = rows.into_iter().next().ok_or_else(|| {
            AppointmentError::Mutation(format!("{}: no row returned", context))
        })?;
        serde_json::from_value(row)
            .map_err(|e| AppointmentError::Mutation(format!("{}: unreadable row: {}", context, e)))
    }

    pub(crate) fn bookings_path(query: &BookingQuery) -> String {
        let statuses: Vec<&str> = query.statuses.iter().map(|s| s.as_str()).collect();
        let mut query_parts = vec![
            format!("tenant_id=eq.{}", query.tenant_id),
            format!("{}=eq.{}", query.provider.column(), query.provider.id()),
            format!("appointment_date=eq.{}", query.date.format("%Y-%m-%d")),
        ];

        if !statuses.is_empty() {
            query_parts.push(format!("status=in.({})", statuses.join(",")));
        }

        if let Some(window) = &query.window {
            query_parts.push(format!("start_time=lte.{}", window.end.format("%H:%M:%S")));
            query_parts.push(format!("end_time=gte.{}", window.start.format("%H:%M:%S")));
        }

        format!("/rest/v1/appointments?{}&order=start_time.asc", query_parts.join("&"))
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&limit=1", id);
        Ok(self.fetch::<Appointment>(&path).await?.into_iter().next())
    }

    async fn get_service(&self, id: Uuid) -> Result<Option<Service>, AppointmentError> {
        let path = format!("/rest/v1/services?id=eq.{}&limit=1", id);
        Ok(self.fetch::<Service>(&path).await?.into_iter().next())
    }

    async fn find_bookings(&self, query: &BookingQuery) -> Result<Vec<Appointment>, AppointmentError> {
        let path = Self::bookings_path(query);
        let bookings = self.fetch::<Appointment>(&path).await?;
        debug!("Found {} bookings for {} on {}", bookings.len(), query.provider, query.date);
        Ok(bookings)
    }

    async fn find_availability(
        &self,
        tenant_id: Uuid,
        provider: ProviderRef,
        day_of_week: i32,
    ) -> Result<Vec<AvailabilityWindow>, AppointmentError> {
        let path = format!(
            "/rest/v1/provider_availabilities?tenant_id=eq.{}&{}=eq.{}&day_of_week=eq.{}&order=start_time.asc",
            tenant_id, provider.column(), provider.id(), day_of_week
        );
        self.fetch::<AvailabilityWindow>(&path).await
    }

    async fn insert_appointment(&self, record: &Appointment) -> Result<Appointment, AppointmentError> {
        let body = serde_json::to_value(record)
            .map_err(|e| AppointmentError::Mutation(format!("Failed to encode appointment: {}", e)))?;

        let rows = self.write(Method::POST, "/rest/v1/appointments", Some(body)).await?;
        Self::parse_written_appointment(rows, "insert appointment")
    }

    async fn update_appointment_status(
        &self,
        id: Uuid,
        status: AppointmentStatus,
        notes: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let body = json!({
            "status": status,
            "notes": notes,
            "updated_at": Utc::now().to_rfc3339(),
        });

        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let rows = self.write(Method::PATCH, &path, Some(body)).await?;
        Self::parse_written_appointment(rows, &format!("update appointment {}", id))
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let rows = self.write(Method::DELETE, &path, None).await?;

        // Row-level security turns a denied delete into an empty 200.
        if rows.is_empty() {
            warn!("Delete of appointment {} affected no rows", id);
            return Err(AppointmentError::Mutation(format!("Appointment {} was not deleted", id)));
        }
        Ok(())
    }

    async fn record_status_change(&self, entry: &StatusHistoryEntry) -> Result<(), AppointmentError> {
        let body = serde_json::to_value(entry)
            .map_err(|e| AppointmentError::Mutation(format!("Failed to encode status history: {}", e)))?;

        self.write(Method::POST, "/rest/v1/appointment_status_history", Some(body)).await?;
        Ok(())
    }
}
