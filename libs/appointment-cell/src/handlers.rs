// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State, Extension},
    http::StatusCode,
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AvailabilityQuery, ConflictCheckQuery, RebookAppointmentRequest,
    RescheduleAppointmentRequest, StatusUpdateRequest,
};
use crate::services::authorization::actor_from_user;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::state::AppointmentState;

// ==============================================================================
// ERROR MAPPING
// ==============================================================================

impl From<AppointmentError> for AppError {
    fn from(error: AppointmentError) -> Self {
        let message = error.to_string();
        match error {
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::NotFound(_) => AppError::NotFound(message),
            AppointmentError::Forbidden(msg) => AppError::Forbidden(msg),
            AppointmentError::Eligibility { reasons } => AppError::Detailed {
                status: StatusCode::BAD_REQUEST,
                message,
                details: json!({ "reasons": reasons }),
            },
            AppointmentError::Conflict { conflicting_ids } => AppError::Detailed {
                status: StatusCode::CONFLICT,
                message,
                details: json!({ "conflicting_appointment_ids": conflicting_ids }),
            },
            AppointmentError::InvalidTransition { from, to } => AppError::Detailed {
                status: StatusCode::BAD_REQUEST,
                message,
                details: json!({
                    "from": from,
                    "to": to,
                    "allowed": AppointmentLifecycleService::new().get_valid_transitions(&from),
                }),
            },
            AppointmentError::NoOpTransition(_) => AppError::BadRequest(message),
            AppointmentError::Database(msg) => AppError::Database(msg),
            AppointmentError::Mutation(_) => AppError::Internal(message),
            AppointmentError::Compensation { mutation, compensation } => AppError::Detailed {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message,
                details: json!({
                    "mutation_error": mutation,
                    "compensation_error": compensation,
                }),
            },
        }
    }
}

/// Malformed or incomplete bodies are validation errors, not axum's plain-text 422.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(request)| request)
        .map_err(|rejection| AppError::ValidationError(rejection.body_text()))
}

// ==============================================================================
// RESCHEDULE / REBOOK HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    body: Result<Json<RescheduleAppointmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let request = json_body(body)?;
    let actor = actor_from_user(&user)?;
    let command = request.into_command(appointment_id, state.config.facility_now())?;

    let outcome = state
        .reschedule_service(auth.token())
        .move_appointment(&actor, command)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "new_appointment": outcome.new_appointment,
        "original_appointment": outcome.original_appointment,
        "reschedule_count": outcome.reschedule_count,
        "notification_sent": outcome.notification_sent,
        "overridden_conflicts": outcome.overridden_conflicts,
        "message": "Appointment rescheduled successfully"
    }))))
}

#[axum::debug_handler]
pub async fn get_reschedule_eligibility(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;

    let eligibility = state
        .reschedule_service(auth.token())
        .reschedule_eligibility(&actor, appointment_id, state.config.facility_now())
        .await?;

    Ok(Json(json!(eligibility)))
}

#[axum::debug_handler]
pub async fn rebook_appointment(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    body: Result<Json<RebookAppointmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let request = json_body(body)?;
    let actor = actor_from_user(&user)?;
    let command = request.into_command(appointment_id, state.config.facility_now())?;

    let outcome = state
        .reschedule_service(auth.token())
        .move_appointment(&actor, command)
        .await?;

    Ok((StatusCode::CREATED, Json(json!({
        "success": true,
        "new_appointment": outcome.new_appointment,
        "original_appointment": outcome.original_appointment,
        "reschedule_count": outcome.reschedule_count,
        "notification_sent": outcome.notification_sent,
        "overridden_conflicts": outcome.overridden_conflicts,
        "message": "Appointment rebooked successfully"
    }))))
}

#[axum::debug_handler]
pub async fn get_rebook_eligibility(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;

    let eligibility = state
        .reschedule_service(auth.token())
        .rebook_eligibility(&actor, appointment_id)
        .await?;

    Ok(Json(json!(eligibility)))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;

    let appointment = state
        .appointment_service(auth.token())
        .get_appointment(&actor, appointment_id)
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    body: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let request = json_body(body)?;
    let actor = actor_from_user(&user)?;

    let appointment = state
        .appointment_service(auth.token())
        .update_status(&actor, appointment_id, request.status, request.notes)
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": format!("Appointment status updated to {}", appointment.status)
    })))
}

/// Check whether a slot is free for a provider
#[axum::debug_handler]
pub async fn check_appointment_conflicts(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;

    let report = state
        .appointment_service(auth.token())
        .check_conflicts(&actor, &query)
        .await?;

    Ok(Json(json!(report)))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let actor = actor_from_user(&user)?;

    let slots = state
        .appointment_service(auth.token())
        .available_slots(&actor, &query)
        .await?;

    Ok(Json(json!(slots)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    use crate::models::AppointmentStatus;

    #[test]
    fn test_error_status_mapping() {
        let cases = vec![
            (AppointmentError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (AppointmentError::NotFound("Appointment x".into()), StatusCode::NOT_FOUND),
            (AppointmentError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (AppointmentError::Eligibility { reasons: vec!["late".into()] }, StatusCode::BAD_REQUEST),
            (AppointmentError::Conflict { conflicting_ids: vec![Uuid::new_v4()] }, StatusCode::CONFLICT),
            (
                AppointmentError::InvalidTransition {
                    from: AppointmentStatus::Cancelled,
                    to: AppointmentStatus::Confirmed,
                },
                StatusCode::BAD_REQUEST,
            ),
            (AppointmentError::NoOpTransition(AppointmentStatus::Pending), StatusCode::BAD_REQUEST),
            (AppointmentError::Database("down".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppointmentError::Mutation("cancel failed".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                AppointmentError::Compensation { mutation: "a".into(), compensation: "b".into() },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            let response = AppError::from(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_conflict_details_list_every_id() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let error = AppError::from(AppointmentError::Conflict { conflicting_ids: ids.clone() });

        match error {
            AppError::Detailed { details, .. } => {
                assert_eq!(details["conflicting_appointment_ids"], json!(ids));
            }
            other => panic!("expected detailed error, got {:?}", other),
        }
    }
}
