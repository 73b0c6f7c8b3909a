use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use shared_models::error::AppError;

pub const INDIA_COUNTRY_CODE: &str = "+91";
pub const PHONE_NUMBER_LENGTH: usize = 13;

static INDIAN_MOBILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+91[6-9][0-9]{9}$").expect("valid phone regex"));

static EMAIL_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
        .expect("valid email regex")
});

/// Messages are shown to the patient as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneValidationError {
    #[error("Please enter your phone number")]
    Empty,

    #[error("Phone number must start with +91")]
    MissingCountryCode,

    #[error("Phone number must be 10 digits after +91")]
    WrongLength,

    #[error("Please enter a valid Indian mobile number")]
    InvalidDigits,
}

impl From<PhoneValidationError> for AppError {
    fn from(err: PhoneValidationError) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

/// Accepts `+91` followed by a ten digit mobile number starting with 6-9.
pub fn validate_phone(phone: &str) -> Result<(), PhoneValidationError> {
    if phone.trim().is_empty() {
        return Err(PhoneValidationError::Empty);
    }
    if !phone.starts_with(INDIA_COUNTRY_CODE) {
        return Err(PhoneValidationError::MissingCountryCode);
    }
    if phone.chars().count() != PHONE_NUMBER_LENGTH {
        return Err(PhoneValidationError::WrongLength);
    }
    if !INDIAN_MOBILE.is_match(phone) {
        return Err(PhoneValidationError::InvalidDigits);
    }
    Ok(())
}

pub fn is_valid_email(address: &str) -> bool {
    address.len() <= 254 && EMAIL_ADDRESS.is_match(address)
}

/// Masks all but the last four digits, for logs.
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}
