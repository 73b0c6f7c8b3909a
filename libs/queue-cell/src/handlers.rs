use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use shared_models::auth::{Role, User};
use shared_models::error::AppError;

use crate::models::{
    DailyQueue, JoinQueueRequest, OpenQueueRequest, PatientInfo, QueueLookupQuery, QueueReportRequest,
    SetEmergencyRequest, Token, UpdateQueueStatusRequest,
};
use crate::router::QueueState;
use crate::services::build_queue_report;

// ==============================================================================
// AUTHORIZATION HELPERS
// ==============================================================================

fn assistant_clinic(user: &User) -> Option<Uuid> {
    user.metadata
        .as_ref()
        .and_then(|m| m.get("clinic_id"))
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

/// Admins, assistants of the queue's clinic and the doctor who owns the queue.
async fn is_staff(state: &QueueState, user: &User, doctor_id: Uuid, clinic_id: Uuid) -> Result<bool, AppError> {
    match user.role() {
        Some(Role::Admin) => Ok(true),
        Some(Role::Assistant) => Ok(assistant_clinic(user).map_or(true, |id| id == clinic_id)),
        Some(Role::Doctor) => {
            let doctor = state.directory.get_doctor(doctor_id).await?;
            Ok(doctor.uid == user.id)
        }
        _ => Ok(false),
    }
}

async fn require_staff(state: &QueueState, user: &User, queue: &DailyQueue) -> Result<(), AppError> {
    if is_staff(state, user, queue.doctor_id, queue.clinic_id).await? {
        Ok(())
    } else {
        warn!("User {} denied staff access to queue {}", user.id, queue.id);
        Err(AppError::Forbidden("Only clinic staff can manage this queue".to_string()))
    }
}

fn owns_token(user: &User, token: &Token) -> bool {
    token.booked_by.as_deref() == Some(user.id.as_str())
        || user.phone.as_deref() == Some(token.patient.phone.as_str())
}

// ==============================================================================
// PUBLIC HANDLERS
// ==============================================================================

/// Public board for a queue
pub async fn get_board(
    State(state): State<QueueState>,
    Path(queue_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let board = state.queues.board(queue_id).await?;
    Ok(Json(json!(board)))
}

/// Get queue statistics
pub async fn get_stats(
    State(state): State<QueueState>,
    Path(queue_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let stats = state.queues.stats(queue_id).await?;
    Ok(Json(json!(stats)))
}

/// Track a token's position and estimated wait
pub async fn get_position(
    State(state): State<QueueState>,
    Path((queue_id, token_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    let position = state.queues.position(queue_id, token_id).await?;
    Ok(Json(json!(position)))
}

// ==============================================================================
// QUEUE MANAGEMENT
// ==============================================================================

/// Open a doctor's queue for the day, or return the existing one
pub async fn open_queue(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
    Json(request): Json<OpenQueueRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let doctor = state.directory.get_doctor(request.doctor_id).await?;

    if !is_staff(&state, &user, doctor.id, doctor.clinic_id).await? {
        return Err(AppError::Forbidden("Only clinic staff can open a queue".to_string()));
    }

    let (queue, created) = state.queues.get_or_create_queue(&doctor, request.date).await?;
    info!("Queue {} for doctor {} requested by {}", queue.id, doctor.id, user.id);

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(json!(queue))))
}

/// Find a doctor's queue for a day
pub async fn find_queue(
    State(state): State<QueueState>,
    Query(query): Query<QueueLookupQuery>,
) -> Result<Json<Value>, AppError> {
    let queue = state
        .queues
        .find_queue(query.doctor_id, query.date)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No queue for doctor {}", query.doctor_id)))?;

    Ok(Json(json!({
        "queue_id": queue.id,
        "board": queue.board()
    })))
}

/// Get the full queue with patient details (staff only)
pub async fn get_queue(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
    Path(queue_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let queue = state.queues.get_queue(queue_id).await?;
    require_staff(&state, &user, &queue).await?;
    Ok(Json(json!(queue)))
}

/// Open, pause or close a queue
pub async fn update_queue_status(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
    Path(queue_id): Path<Uuid>,
    Json(request): Json<UpdateQueueStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let queue = state.queues.get_queue(queue_id).await?;
    require_staff(&state, &user, &queue).await?;

    let queue = state.queues.set_status(queue_id, request.status).await?;
    Ok(Json(json!(queue)))
}

// ==============================================================================
// TOKENS
// ==============================================================================

/// Join a queue as a patient or register a walk-in
pub async fn join_queue(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
    Path(queue_id): Path<Uuid>,
    Json(request): Json<JoinQueueRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let queue = state.queues.get_queue(queue_id).await?;
    let staff = is_staff(&state, &user, queue.doctor_id, queue.clinic_id).await?;

    let (phone, is_emergency) = if staff {
        let phone = request
            .phone
            .ok_or_else(|| AppError::ValidationError("Phone number is required for walk-ins".to_string()))?;
        (phone, request.is_emergency)
    } else if user.has_role(Role::Patient) {
        let phone = request
            .phone
            .or_else(|| user.phone.clone())
            .ok_or_else(|| AppError::ValidationError("Please enter your phone number".to_string()))?;
        // Patients cannot flag themselves as emergencies
        (phone, false)
    } else {
        return Err(AppError::Forbidden("Only patients or clinic staff can join a queue".to_string()));
    };

    let patient = PatientInfo {
        name: request.patient_name,
        phone,
    };
    let token = state
        .queues
        .join(queue_id, patient, is_emergency, Some(user.id.clone()))
        .await?;
    let position = state.queues.position(queue_id, token.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "token": token,
            "position": position
        })),
    ))
}

/// Call the next waiting token
pub async fn call_next(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
    Path(queue_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let queue = state.queues.get_queue(queue_id).await?;
    require_staff(&state, &user, &queue).await?;

    let token = state.queues.call_next(queue_id).await?;
    info!("Token {} called in queue {} by {}", token.token_number, queue_id, user.id);
    Ok(Json(json!(token)))
}

/// Which staff action a token route applies.
#[derive(Debug, Clone, Copy)]
pub enum TokenAction {
    Call,
    Complete,
    Skip,
    NoShow,
    Requeue,
}

async fn apply_token_action(
    state: &QueueState,
    user: &User,
    queue_id: Uuid,
    token_id: Uuid,
    action: TokenAction,
) -> Result<Json<Value>, AppError> {
    let queue = state.queues.get_queue(queue_id).await?;
    require_staff(state, user, &queue).await?;

    let token = match action {
        TokenAction::Call => state.queues.call_token(queue_id, token_id).await?,
        TokenAction::Complete => state.queues.complete(queue_id, token_id).await?,
        TokenAction::Skip => state.queues.skip(queue_id, token_id).await?,
        TokenAction::NoShow => state.queues.mark_no_show(queue_id, token_id).await?,
        TokenAction::Requeue => state.queues.requeue(queue_id, token_id).await?,
    };
    info!("{:?} applied to token {} in queue {} by {}", action, token.token_number, queue_id, user.id);

    Ok(Json(json!(token)))
}

/// Call a specific token out of order
pub async fn call_token(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
    Path((queue_id, token_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    apply_token_action(&state, &user, queue_id, token_id, TokenAction::Call).await
}

/// Finish the current consultation
pub async fn complete_token(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
    Path((queue_id, token_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    apply_token_action(&state, &user, queue_id, token_id, TokenAction::Complete).await
}

/// Skip a token
pub async fn skip_token(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
    Path((queue_id, token_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    apply_token_action(&state, &user, queue_id, token_id, TokenAction::Skip).await
}

/// Mark a token as no-show
pub async fn mark_no_show(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
    Path((queue_id, token_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    apply_token_action(&state, &user, queue_id, token_id, TokenAction::NoShow).await
}

/// Send a skipped token to the back of the queue
pub async fn requeue_token(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
    Path((queue_id, token_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    apply_token_action(&state, &user, queue_id, token_id, TokenAction::Requeue).await
}

/// Set or clear the emergency flag
pub async fn set_emergency(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
    Path((queue_id, token_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<SetEmergencyRequest>,
) -> Result<Json<Value>, AppError> {
    let queue = state.queues.get_queue(queue_id).await?;
    require_staff(&state, &user, &queue).await?;

    let token = state
        .queues
        .set_emergency(queue_id, token_id, request.is_emergency)
        .await?;
    Ok(Json(json!(token)))
}

/// Cancel a token (owner or staff)
pub async fn cancel_token(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
    Path((queue_id, token_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    let token = state.queues.get_token(queue_id, token_id).await?;

    if !owns_token(&user, &token) {
        let queue = state.queues.get_queue(queue_id).await?;
        require_staff(&state, &user, &queue).await?;
    }

    let token = state.queues.cancel(queue_id, token_id).await?;
    info!("Token {} in queue {} cancelled by {}", token.token_number, queue_id, user.id);
    Ok(Json(json!(token)))
}

// ==============================================================================
// REPORTING
// ==============================================================================

/// Email the day's queue report
pub async fn send_report(
    State(state): State<QueueState>,
    Extension(user): Extension<User>,
    Path(queue_id): Path<Uuid>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    // The body is optional; an empty one mails the doctor
    let request: QueueReportRequest = if body.is_empty() {
        QueueReportRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(format!("Invalid report request: {}", e)))?
    };

    let queue = state.queues.get_queue(queue_id).await?;
    require_staff(&state, &user, &queue).await?;

    let doctor = state.directory.get_doctor(queue.doctor_id).await?;
    let recipient = request.to.unwrap_or_else(|| doctor.email.clone());

    let email = build_queue_report(&queue, &doctor, &recipient);
    let result = state.email.send_email(email).await;

    let status = if result.success {
        StatusCode::OK
    } else {
        warn!("Queue report for {} not delivered: {}", queue_id, result.message);
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(json!(result))))
}
