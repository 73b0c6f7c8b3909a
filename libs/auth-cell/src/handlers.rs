use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};
use tracing::debug;

use shared_models::auth::TokenResponse;
use shared_models::error::AppError;
use shared_utils::extractor::authenticate;

use crate::models::{SendOtpRequest, SendOtpResponse, SessionResponse, VerifyOtpRequest};
use crate::router::AuthState;

/// Validate a bearer token and return its details
pub async fn validate_token(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Json<TokenResponse>, AppError> {
    debug!("Validating token");

    let claims = authenticate(&headers, &state.config)?;

    Ok(Json(TokenResponse {
        valid: true,
        user_id: claims.sub,
        email: claims.email,
        phone: claims.phone,
        role: claims.role,
    }))
}

/// Check whether a bearer token is valid
pub async fn verify_token(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Json<Value> {
    debug!("Verifying token");

    let valid = authenticate(&headers, &state.config).is_ok();
    Json(json!({ "valid": valid }))
}

/// Send a login code to a phone number
pub async fn send_otp(
    State(state): State<AuthState>,
    Json(request): Json<SendOtpRequest>,
) -> Result<Json<SendOtpResponse>, AppError> {
    let response = state.otp.send_otp(&request.phone).await?;
    Ok(Json(response))
}

/// Verify a login code and issue a session
pub async fn verify_otp(
    State(state): State<AuthState>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.otp.verify_otp(&request.phone, &request.code).await?;
    Ok(Json(session))
}
