// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::state::AppointmentState;

pub fn appointment_routes(config: Arc<AppConfig>) -> Router {
    appointment_routes_with_state(AppointmentState::new(config))
}

pub fn appointment_routes_with_state(state: AppointmentState) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        .route("/conflicts/check", get(handlers::check_appointment_conflicts))
        .route("/availability", get(handlers::get_available_slots))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/status", patch(handlers::update_appointment_status))
        .route(
            "/{appointment_id}/reschedule",
            get(handlers::get_reschedule_eligibility).post(handlers::reschedule_appointment),
        )
        .route(
            "/{appointment_id}/rebook",
            get(handlers::get_rebook_eligibility).post(handlers::rebook_appointment),
        )
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
