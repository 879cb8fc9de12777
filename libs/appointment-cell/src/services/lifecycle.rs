// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, info, warn};

use crate::models::{ActorRole, AppointmentError, AppointmentStatus, StatusChange};

const ALL_ROLES: &[ActorRole] = &[
    ActorRole::AdminTenant,
    ActorRole::Receptionist,
    ActorRole::Staff,
    ActorRole::Doctor,
    ActorRole::Member,
];

/// Roles allowed to mark a visit completed (no front desk).
const CLINICAL_ROLES: &[ActorRole] = &[
    ActorRole::AdminTenant,
    ActorRole::Staff,
    ActorRole::Doctor,
    ActorRole::Member,
];

pub struct AppointmentLifecycleService;

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// All valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: &AppointmentStatus) -> &'static [AppointmentStatus] {
        match current_status {
            AppointmentStatus::Pending => &[
                AppointmentStatus::Confirmed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => &[
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => &[],
        }
    }

    /// Roles allowed to move an appointment along an edge. Empty for unknown edges.
    pub fn required_roles(&self, from: &AppointmentStatus, to: &AppointmentStatus) -> &'static [ActorRole] {
        if !self.get_valid_transitions(from).contains(to) {
            return &[];
        }
        match (from, to) {
            (AppointmentStatus::Confirmed, AppointmentStatus::Completed) => CLINICAL_ROLES,
            _ => ALL_ROLES,
        }
    }

    /// Decide whether `actor_role` may move an appointment from `current` to `requested`.
    pub fn transition(
        &self,
        current: AppointmentStatus,
        requested: AppointmentStatus,
        actor_role: ActorRole,
    ) -> Result<StatusChange, AppointmentError> {
        debug!("Validating status transition from {} to {} by {}", current, requested, actor_role);

        if current == requested {
            return Err(AppointmentError::NoOpTransition(current));
        }

        if !self.get_valid_transitions(&current).contains(&requested) {
            warn!("Invalid status transition attempted: {} -> {}", current, requested);
            return Err(AppointmentError::InvalidTransition { from: current, to: requested });
        }

        if !self.required_roles(&current, &requested).contains(&actor_role) {
            warn!("Role {} may not transition {} -> {}", actor_role, current, requested);
            return Err(AppointmentError::Forbidden(format!(
                "Role {} cannot change an appointment from {} to {}",
                actor_role, current, requested
            )));
        }

        info!("Status transition validated: {} -> {}", current, requested);
        Ok(StatusChange { from: current, to: requested })
    }
}
