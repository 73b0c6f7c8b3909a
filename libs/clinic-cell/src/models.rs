use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_utils::validation::{is_valid_email, validate_phone};

use crate::error::DirectoryError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clinic {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub clinic_id: Uuid,
    /// External identity of the doctor's login (JWT `sub`).
    pub uid: String,
    pub email: String,
    pub phone: String,
    pub name: String,
    pub specialization: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Doctor {
    pub fn display_name(&self) -> String {
        if self.name.starts_with("Dr.") || self.name.starts_with("Dr ") {
            self.name.clone()
        } else {
            format!("Dr. {}", self.name)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateClinicRequest {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

impl CreateClinicRequest {
    pub fn validate(&self) -> Result<(), DirectoryError> {
        if self.name.trim().is_empty() {
            return Err(DirectoryError::ValidationError("Clinic name is required".to_string()));
        }
        if let Some(phone) = &self.phone {
            validate_phone(phone)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDoctorRequest {
    pub uid: String,
    pub email: String,
    pub phone: String,
    pub name: String,
    pub specialization: Option<String>,
}

impl CreateDoctorRequest {
    pub fn validate(&self) -> Result<(), DirectoryError> {
        if self.name.trim().is_empty() {
            return Err(DirectoryError::ValidationError("Doctor name is required".to_string()));
        }
        if self.uid.trim().is_empty() {
            return Err(DirectoryError::ValidationError("Doctor uid is required".to_string()));
        }
        if !is_valid_email(&self.email) {
            return Err(DirectoryError::ValidationError(format!("Invalid email address: {}", self.email)));
        }
        validate_phone(&self.phone)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDoctorRequest {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub specialization: Option<String>,
    pub is_active: Option<bool>,
}

impl UpdateDoctorRequest {
    pub fn validate(&self) -> Result<(), DirectoryError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(DirectoryError::ValidationError("Doctor name cannot be empty".to_string()));
            }
        }
        if let Some(email) = &self.email {
            if !is_valid_email(email) {
                return Err(DirectoryError::ValidationError(format!("Invalid email address: {}", email)));
            }
        }
        if let Some(phone) = &self.phone {
            validate_phone(phone)?;
        }
        Ok(())
    }

    /// Only an admin may toggle `is_active`; doctors edit their own contact details.
    pub fn touches_admin_fields(&self) -> bool {
        self.is_active.is_some()
    }

    pub fn apply(self, doctor: &mut Doctor) {
        if let Some(email) = self.email {
            doctor.email = email;
        }
        if let Some(phone) = self.phone {
            doctor.phone = phone;
        }
        if let Some(name) = self.name {
            doctor.name = name;
        }
        if let Some(specialization) = self.specialization {
            doctor.specialization = Some(specialization);
        }
        if let Some(is_active) = self.is_active {
            doctor.is_active = is_active;
        }
        doctor.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DoctorListQuery {
    pub active_only: Option<bool>,
}
