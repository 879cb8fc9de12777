use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub max_reschedules_per_appointment: i32,
    pub min_hours_before_reschedule: i64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            max_reschedules_per_appointment: 3,
            min_hours_before_reschedule: 24,
        }
    }
}

impl TestConfig {
    /// Point the config at a mock server (usually `wiremock::MockServer::uri()`).
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            max_reschedules_per_appointment: self.max_reschedules_per_appointment,
            min_hours_before_reschedule: self.min_hours_before_reschedule,
            facility_utc_offset_minutes: 0,
            server_port: 3000,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
    pub tenant_id: String,
    pub provider_id: Option<String>,
}

impl Default for TestUser {
    fn default() -> Self {
        Self::new("staff@clinic.test", "staff")
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
            tenant_id: Uuid::new_v4().to_string(),
            provider_id: None,
        }
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin_tenant")
    }

    pub fn receptionist(email: &str) -> Self {
        Self::new(email, "receptionist")
    }

    pub fn doctor(email: &str, doctor_id: &str) -> Self {
        Self {
            provider_id: Some(doctor_id.to_string()),
            ..Self::new(email, "doctor")
        }
    }

    pub fn member(email: &str, member_id: &str) -> Self {
        Self {
            provider_id: Some(member_id.to_string()),
            ..Self::new(email, "member")
        }
    }

    pub fn in_tenant(mut self, tenant_id: &str) -> Self {
        self.tenant_id = tenant_id.to_string();
        self
    }

    pub fn app_metadata(&self) -> Value {
        let mut meta = json!({
            "role": self.role,
            "tenant_id": self.tenant_id,
        });
        if let Some(provider_id) = &self.provider_id {
            meta["provider_id"] = json!(provider_id);
        }
        meta
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some("authenticated".to_string()),
            metadata: None,
            app_metadata: Some(self.app_metadata()),
            created_at: Some(Utc::now()),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "app_metadata": user.app_metadata(),
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    /// Appointment row as PostgREST returns it (times with seconds).
    pub fn appointment_response(
        id: &str,
        tenant_id: &str,
        doctor_id: &str,
        date: &str,
        start_time: &str,
        end_time: &str,
        status: &str,
    ) -> Value {
        json!({
            "id": id,
            "tenant_id": tenant_id,
            "patient_id": Uuid::new_v4(),
            "service_id": null,
            "doctor_id": doctor_id,
            "member_id": null,
            "appointment_date": date,
            "start_time": start_time,
            "end_time": end_time,
            "status": status,
            "notes": null,
            "price": 80.0,
            "original_appointment_id": null,
            "rescheduled_from_id": null,
            "reschedule_count": 0,
            "is_rebook": false,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn service_response(id: &str, tenant_id: &str, duration_minutes: i32) -> Value {
        json!({
            "id": id,
            "tenant_id": tenant_id,
            "name": "Deep tissue massage",
            "duration_minutes": duration_minutes,
            "price": 95.0
        })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "message": message,
            "code": code
        })
    }
}
