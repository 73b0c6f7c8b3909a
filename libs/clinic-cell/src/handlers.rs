use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::require_any_role;

use crate::models::{CreateClinicRequest, CreateDoctorRequest, DoctorListQuery, UpdateDoctorRequest};
use crate::router::ClinicState;

/// Register a clinic (admin only)
pub async fn create_clinic(
    State(state): State<ClinicState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateClinicRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_any_role(&user, &[Role::Admin])?;
    info!("Clinic creation requested by {}", user.id);

    let clinic = state.directory.create_clinic(request).await?;
    Ok((StatusCode::CREATED, Json(json!(clinic))))
}

/// List all clinics
pub async fn list_clinics(State(state): State<ClinicState>) -> Result<Json<Value>, AppError> {
    let clinics = state.directory.list_clinics().await?;
    Ok(Json(json!({
        "clinics": clinics,
        "total": clinics.len()
    })))
}

/// Get a clinic by id
pub async fn get_clinic(
    State(state): State<ClinicState>,
    Path(clinic_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let clinic = state.directory.get_clinic(clinic_id).await?;
    Ok(Json(json!(clinic)))
}

/// Add a doctor to a clinic (admin only)
pub async fn create_doctor(
    State(state): State<ClinicState>,
    Extension(user): Extension<User>,
    Path(clinic_id): Path<Uuid>,
    Json(request): Json<CreateDoctorRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_any_role(&user, &[Role::Admin])?;
    info!("Doctor registration for clinic {} requested by {}", clinic_id, user.id);

    let doctor = state.directory.create_doctor(clinic_id, request).await?;
    Ok((StatusCode::CREATED, Json(json!(doctor))))
}

/// List doctors of a clinic
pub async fn list_doctors(
    State(state): State<ClinicState>,
    Path(clinic_id): Path<Uuid>,
    Query(query): Query<DoctorListQuery>,
) -> Result<Json<Value>, AppError> {
    let doctors = state
        .directory
        .list_doctors(clinic_id, query.active_only.unwrap_or(false))
        .await?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

/// Get a doctor by id
pub async fn get_doctor(
    State(state): State<ClinicState>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor = state.directory.get_doctor(doctor_id).await?;
    Ok(Json(json!(doctor)))
}

/// Update a doctor profile (admin or the doctor)
pub async fn update_doctor(
    State(state): State<ClinicState>,
    Extension(user): Extension<User>,
    Path(doctor_id): Path<Uuid>,
    Json(request): Json<UpdateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        let doctor = state.directory.get_doctor(doctor_id).await?;
        if doctor.uid != user.id {
            return Err(AppError::Forbidden("Only an admin or the doctor may edit this profile".to_string()));
        }
        if request.touches_admin_fields() {
            return Err(AppError::Forbidden("Only an admin may change a doctor's active status".to_string()));
        }
    }

    info!("Updating doctor {} on behalf of {}", doctor_id, user.id);
    let doctor = state.directory.update_doctor(doctor_id, request).await?;
    Ok(Json(json!(doctor)))
}
