use thiserror::Error;

use shared_models::error::AppError;
use shared_utils::validation::PhoneValidationError;

use crate::models::{QueueStatus, TokenStatus};

#[derive(Error, Debug, PartialEq)]
pub enum QueueError {
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Token not found: {0}")]
    TokenNotFound(String),

    #[error("Invalid token status transition from {} to {}", .from.as_str(), .to.as_str())]
    InvalidTransition { from: TokenStatus, to: TokenStatus },

    #[error("Invalid queue status transition from {} to {}", .from.as_str(), .to.as_str())]
    InvalidQueueTransition { from: QueueStatus, to: QueueStatus },

    #[error("Queue is closed")]
    QueueClosed,

    #[error("Queue is {}; patients can only be called while it is open", .0.as_str())]
    QueueNotOpen(QueueStatus),

    #[error("Token {token_number} is still being served")]
    AlreadyServing { token_number: u32 },

    #[error("No patients are waiting")]
    QueueEmpty,

    #[error("Patient already holds token {token_number} in this queue")]
    DuplicateToken { token_number: u32 },

    #[error("Only waiting or skipped tokens can change priority")]
    PriorityLocked,

    #[error(transparent)]
    InvalidPhone(#[from] PhoneValidationError),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::QueueNotFound(_) | QueueError::TokenNotFound(_) => AppError::NotFound(err.to_string()),
            QueueError::InvalidPhone(_) | QueueError::ValidationError(_) => {
                AppError::ValidationError(err.to_string())
            }
            QueueError::InvalidTransition { .. }
            | QueueError::InvalidQueueTransition { .. }
            | QueueError::QueueClosed
            | QueueError::QueueNotOpen(_)
            | QueueError::AlreadyServing { .. }
            | QueueError::QueueEmpty
            | QueueError::DuplicateToken { .. }
            | QueueError::PriorityLocked => AppError::Conflict(err.to_string()),
        }
    }
}
