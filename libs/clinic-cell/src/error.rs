use thiserror::Error;

use shared_models::error::AppError;
use shared_utils::validation::PhoneValidationError;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Clinic not found: {0}")]
    ClinicNotFound(String),

    #[error("Doctor not found: {0}")]
    DoctorNotFound(String),

    #[error("Doctor with email {0} already exists")]
    DuplicateEmail(String),

    #[error("Doctor with uid {0} already exists")]
    DuplicateUid(String),

    #[error(transparent)]
    InvalidPhone(#[from] PhoneValidationError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::ClinicNotFound(_) | DirectoryError::DoctorNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            DirectoryError::DuplicateEmail(_) | DirectoryError::DuplicateUid(_) => {
                AppError::Conflict(err.to_string())
            }
            DirectoryError::InvalidPhone(_) | DirectoryError::ValidationError(_) => {
                AppError::ValidationError(err.to_string())
            }
            DirectoryError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
