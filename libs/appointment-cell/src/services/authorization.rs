// libs/appointment-cell/src/services/authorization.rs
use tracing::warn;
use uuid::Uuid;

use shared_models::auth::User;

use crate::models::{Actor, ActorRole, Appointment, AppointmentError};

/// Decides whether an actor may act on an appointment.
pub trait AuthorizationPolicy: Send + Sync {
    fn may_act(&self, actor: &Actor, appointment: &Appointment) -> bool;
}

/// Tenant-scoped roles: admins, receptionists and staff act on any appointment
/// of their tenant; doctors and members only on appointments assigned to them.
pub struct TenantRolePolicy;

impl AuthorizationPolicy for TenantRolePolicy {
    fn may_act(&self, actor: &Actor, appointment: &Appointment) -> bool {
        if actor.tenant_id != appointment.tenant_id {
            return false;
        }

        match actor.role {
            role if role.is_tenant_wide() => true,
            ActorRole::Doctor => actor.provider_id.is_some() && appointment.doctor_id == actor.provider_id,
            ActorRole::Member => actor.provider_id.is_some() && appointment.member_id == actor.provider_id,
            _ => false,
        }
    }
}

pub fn authorize(
    policy: &dyn AuthorizationPolicy,
    actor: &Actor,
    appointment: &Appointment,
) -> Result<(), AppointmentError> {
    if policy.may_act(actor, appointment) {
        return Ok(());
    }

    warn!("User {} ({}) denied access to appointment {}", actor.user_id, actor.role, appointment.id);
    Err(AppointmentError::Forbidden("Not authorized to manage this appointment".to_string()))
}

/// Resolve the caller from verified token claims.
pub fn actor_from_user(user: &User) -> Result<Actor, AppointmentError> {
    let role: ActorRole = user
        .app_role()
        .ok_or_else(|| AppointmentError::Forbidden("Token carries no application role".to_string()))?
        .parse()?;

    let tenant_id = user
        .app_claim("tenant_id")
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or_else(|| AppointmentError::Forbidden("Token carries no tenant membership".to_string()))?;

    let provider_id = user
        .app_claim("provider_id")
        .and_then(|raw| Uuid::parse_str(raw).ok());

    Ok(Actor {
        user_id: user.id.clone(),
        tenant_id,
        role,
        provider_id,
    })
}
