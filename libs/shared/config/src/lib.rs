use std::env;
use std::str::FromStr;

use chrono::{FixedOffset, NaiveDateTime, Offset, Utc};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    pub max_reschedules_per_appointment: i32,
    pub min_hours_before_reschedule: i64,
    pub facility_utc_offset_minutes: i32,
    pub server_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            max_reschedules_per_appointment: parse_or_default("MAX_RESCHEDULES_PER_APPOINTMENT", 3),
            min_hours_before_reschedule: parse_or_default("MIN_HOURS_BEFORE_RESCHEDULE", 24),
            facility_utc_offset_minutes: parse_or_default("FACILITY_UTC_OFFSET_MINUTES", 0),
            server_port: parse_or_default("SERVER_PORT", 3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// Wall-clock time at the facility. Appointment times carry no timezone,
    /// so every "now" comparison goes through this offset.
    pub fn facility_now(&self) -> NaiveDateTime {
        let offset = FixedOffset::east_opt(self.facility_utc_offset_minutes * 60)
            .unwrap_or_else(|| {
                warn!(
                    "FACILITY_UTC_OFFSET_MINUTES={} out of range, using UTC",
                    self.facility_utc_offset_minutes
                );
                Utc.fix()
            });

        Utc::now().with_timezone(&offset).naive_local()
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
