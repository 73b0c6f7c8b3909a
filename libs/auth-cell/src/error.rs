use thiserror::Error;

use shared_models::error::AppError;
use shared_utils::jwt::JwtError;
use shared_utils::validation::PhoneValidationError;

#[derive(Error, Debug, PartialEq)]
pub enum OtpError {
    #[error(transparent)]
    InvalidPhone(#[from] PhoneValidationError),

    #[error("Please wait {retry_after_seconds} seconds before requesting a new code")]
    CooldownActive { retry_after_seconds: u64 },

    #[error("No verification code was requested for this number")]
    NotRequested,

    #[error("Verification code has expired")]
    Expired,

    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Too many incorrect attempts, please request a new code")]
    TooManyAttempts,

    #[error("Failed to deliver verification code: {0}")]
    Delivery(String),

    #[error("Failed to issue session: {0}")]
    Session(#[from] JwtError),
}

impl From<OtpError> for AppError {
    fn from(err: OtpError) -> Self {
        match err {
            OtpError::InvalidPhone(_) => AppError::ValidationError(err.to_string()),
            OtpError::CooldownActive { .. } | OtpError::TooManyAttempts => AppError::RateLimited(err.to_string()),
            OtpError::NotRequested | OtpError::Expired | OtpError::InvalidCode => AppError::Auth(err.to_string()),
            OtpError::Delivery(_) => AppError::ExternalService(err.to_string()),
            OtpError::Session(_) => AppError::Internal(err.to_string()),
        }
    }
}
