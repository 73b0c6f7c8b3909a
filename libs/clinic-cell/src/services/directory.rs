use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::DirectoryError;
use crate::models::{Clinic, CreateClinicRequest, CreateDoctorRequest, Doctor, UpdateDoctorRequest};

#[async_trait]
pub trait ClinicDirectory: Send + Sync {
    async fn create_clinic(&self, request: CreateClinicRequest) -> Result<Clinic, DirectoryError>;

    async fn get_clinic(&self, clinic_id: Uuid) -> Result<Clinic, DirectoryError>;

    async fn list_clinics(&self) -> Result<Vec<Clinic>, DirectoryError>;

    async fn create_doctor(
        &self,
        clinic_id: Uuid,
        request: CreateDoctorRequest,
    ) -> Result<Doctor, DirectoryError>;

    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DirectoryError>;

    async fn find_doctor_by_uid(&self, uid: &str) -> Result<Option<Doctor>, DirectoryError>;

    async fn update_doctor(
        &self,
        doctor_id: Uuid,
        request: UpdateDoctorRequest,
    ) -> Result<Doctor, DirectoryError>;

    async fn list_doctors(&self, clinic_id: Uuid, active_only: bool) -> Result<Vec<Doctor>, DirectoryError>;
}

#[derive(Default)]
struct DirectoryData {
    clinics: HashMap<Uuid, Clinic>,
    doctors: HashMap<Uuid, Doctor>,
}

#[derive(Default)]
pub struct InMemoryDirectory {
    data: RwLock<DirectoryData>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClinicDirectory for InMemoryDirectory {
    async fn create_clinic(&self, request: CreateClinicRequest) -> Result<Clinic, DirectoryError> {
        request.validate()?;

        let clinic = Clinic {
            id: Uuid::new_v4(),
            name: request.name.trim().to_string(),
            address: request.address,
            phone: request.phone,
            created_at: Utc::now(),
        };

        let mut data = self.data.write().await;
        data.clinics.insert(clinic.id, clinic.clone());
        debug!("Created clinic {} ({})", clinic.name, clinic.id);

        Ok(clinic)
    }

    async fn get_clinic(&self, clinic_id: Uuid) -> Result<Clinic, DirectoryError> {
        let data = self.data.read().await;
        data.clinics
            .get(&clinic_id)
            .cloned()
            .ok_or_else(|| DirectoryError::ClinicNotFound(clinic_id.to_string()))
    }

    async fn list_clinics(&self) -> Result<Vec<Clinic>, DirectoryError> {
        let data = self.data.read().await;
        let mut clinics: Vec<Clinic> = data.clinics.values().cloned().collect();
        clinics.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clinics)
    }

    async fn create_doctor(
        &self,
        clinic_id: Uuid,
        request: CreateDoctorRequest,
    ) -> Result<Doctor, DirectoryError> {
        request.validate()?;

        let mut data = self.data.write().await;

        if !data.clinics.contains_key(&clinic_id) {
            return Err(DirectoryError::ClinicNotFound(clinic_id.to_string()));
        }
        if data.doctors.values().any(|d| d.email.eq_ignore_ascii_case(&request.email)) {
            return Err(DirectoryError::DuplicateEmail(request.email));
        }
        if data.doctors.values().any(|d| d.uid == request.uid) {
            return Err(DirectoryError::DuplicateUid(request.uid));
        }

        let now = Utc::now();
        let doctor = Doctor {
            id: Uuid::new_v4(),
            clinic_id,
            uid: request.uid,
            email: request.email,
            phone: request.phone,
            name: request.name.trim().to_string(),
            specialization: request.specialization,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        data.doctors.insert(doctor.id, doctor.clone());
        debug!("Created doctor {} in clinic {}", doctor.id, clinic_id);

        Ok(doctor)
    }

    async fn get_doctor(&self, doctor_id: Uuid) -> Result<Doctor, DirectoryError> {
        let data = self.data.read().await;
        data.doctors
            .get(&doctor_id)
            .cloned()
            .ok_or_else(|| DirectoryError::DoctorNotFound(doctor_id.to_string()))
    }

    async fn find_doctor_by_uid(&self, uid: &str) -> Result<Option<Doctor>, DirectoryError> {
        let data = self.data.read().await;
        Ok(data.doctors.values().find(|d| d.uid == uid).cloned())
    }

    async fn update_doctor(
        &self,
        doctor_id: Uuid,
        request: UpdateDoctorRequest,
    ) -> Result<Doctor, DirectoryError> {
        request.validate()?;

        let mut data = self.data.write().await;

        if let Some(email) = &request.email {
            let taken = data
                .doctors
                .values()
                .any(|d| d.id != doctor_id && d.email.eq_ignore_ascii_case(email));
            if taken {
                return Err(DirectoryError::DuplicateEmail(email.clone()));
            }
        }

        let doctor = data
            .doctors
            .get_mut(&doctor_id)
            .ok_or_else(|| DirectoryError::DoctorNotFound(doctor_id.to_string()))?;

        request.apply(doctor);
        Ok(doctor.clone())
    }

    async fn list_doctors(&self, clinic_id: Uuid, active_only: bool) -> Result<Vec<Doctor>, DirectoryError> {
        let data = self.data.read().await;

        if !data.clinics.contains_key(&clinic_id) {
            return Err(DirectoryError::ClinicNotFound(clinic_id.to_string()));
        }

        let mut doctors: Vec<Doctor> = data
            .doctors
            .values()
            .filter(|d| d.clinic_id == clinic_id && (!active_only || d.is_active))
            .cloned()
            .collect();
        doctors.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(doctors)
    }
}
